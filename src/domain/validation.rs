//! Shape checks applied to parsed manifests.
//!
//! Deserialization already enforces the tagged variants; this layer covers
//! the constraints serde cannot express: name and version formats, the
//! description length bound, and named arguments carrying a name.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    domain::{ArgumentKind, ServerManifest},
    error::{RegistryError, RegistryResult},
};

/// Reverse-DNS namespace, slash, local id.
pub static SERVER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.-]+/[a-zA-Z0-9._-]+$").unwrap());

/// Semantic version 2.0, with optional pre-release and build metadata.
pub static SEMVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .unwrap()
});

const MAX_DESCRIPTION_LEN: usize = 100;

pub fn validate_manifest(manifest: &ServerManifest) -> RegistryResult<()> {
    if !SERVER_NAME_RE.is_match(&manifest.name) {
        return Err(RegistryError::Validation(format!(
            "invalid server name: {}",
            manifest.name
        )));
    }
    if !SEMVER_RE.is_match(&manifest.version) {
        return Err(RegistryError::Validation(format!(
            "invalid semantic version: {}",
            manifest.version
        )));
    }
    if manifest.description.is_empty() || manifest.description.len() > MAX_DESCRIPTION_LEN {
        return Err(RegistryError::Validation(format!(
            "description length must be 1..={MAX_DESCRIPTION_LEN} characters"
        )));
    }

    for package in &manifest.packages {
        for argument in package
            .package_arguments
            .iter()
            .chain(package.runtime_arguments.iter())
        {
            if argument.kind == ArgumentKind::Named
                && argument.name.as_deref().unwrap_or("").is_empty()
            {
                return Err(RegistryError::Validation(format!(
                    "named argument without a name in package {}",
                    package.identifier
                )));
            }
        }
    }

    Ok(())
}
