//! `package.json` synthesis

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::validate::ToolchainVersion;
use crate::error::Result;

/// Reserved file name of the synthesized manifest
pub const MANIFEST_FILENAME: &str = "package.json";

/// npm package providing the compiler CLI
pub const SDK_PACKAGE: &str = "near-sdk-js";

/// npm reference for the unreleased SDK (GitHub shorthand)
pub const SDK_DEVELOP_REF: &str = "near/near-sdk-js";

const TYPESCRIPT: (&str, &str) = ("typescript", "^4.8.4");

// Released SDKs fail to build without ts-morph installed alongside
// (near/near-sdk-js#284).
const TS_MORPH: (&str, &str) = ("ts-morph", "^16.0.0");

/// Minimal npm package descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(rename = "type")]
    pub module_type: String,
    pub dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Build the manifest for a toolchain version.
///
/// Caller dependencies are merged last, so they override the fixed entries,
/// the SDK itself included.
pub fn synthesize(
    version: &ToolchainVersion,
    extra: &BTreeMap<String, String>,
) -> PackageManifest {
    let mut dependencies = BTreeMap::new();

    match version {
        ToolchainVersion::Develop => {
            dependencies.insert(SDK_PACKAGE.to_string(), SDK_DEVELOP_REF.to_string());
        }
        ToolchainVersion::Release(v) => {
            dependencies.insert(SDK_PACKAGE.to_string(), v.clone());
            dependencies.insert(TS_MORPH.0.to_string(), TS_MORPH.1.to_string());
        }
    }
    dependencies.insert(TYPESCRIPT.0.to_string(), TYPESCRIPT.1.to_string());

    dependencies.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    PackageManifest {
        module_type: "module".to_string(),
        dependencies,
    }
}
