//! Server manifest types.
//!
//! A manifest describes one MCP server: identity, version, and how to obtain
//! it — as an installable package or a hosted remote. Delivery transports and
//! argument kinds are tagged variants; an unknown `type` tag fails
//! deserialization rather than being inspected structurally.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerManifest {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Fully qualified name: reverse-DNS namespace, slash, local id.
    pub name: String,
    pub description: String,
    /// Semantic version of the server definition.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<RemoteBinding>,
}

/// Source repository reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    pub source: RepositorySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositorySource {
    Github,
    Gitlab,
    Bitbucket,
}

/// An installable package distribution of a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageBinding {
    pub registry_type: RegistryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_base_url: Option<String>,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_hint: Option<RuntimeHint>,
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment_variables: Vec<KeyValueInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_arguments: Vec<Argument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime_arguments: Vec<Argument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    Npm,
    Pypi,
    Nuget,
    Oci,
    Mcpb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeHint {
    Npx,
    Uvx,
    Docker,
    Dnx,
}

/// A hosted endpoint serving the server directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RemoteBinding {
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<KeyValueInput>,
    },
    StreamableHttp {
        url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<KeyValueInput>,
    },
}

impl RemoteBinding {
    pub fn url(&self) -> &str {
        match self {
            RemoteBinding::Sse { url, .. } => url,
            RemoteBinding::StreamableHttp { url, .. } => url,
        }
    }
}

/// How a launched package is spoken to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Transport {
    Stdio,
    Sse {
        url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<KeyValueInput>,
    },
    StreamableHttp {
        url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<KeyValueInput>,
    },
}

/// A configurable named input: environment variable or header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_secret: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

/// A command-line argument passed to the package or its runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    #[serde(rename = "type")]
    pub kind: ArgumentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    Positional,
    Named,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_manifest() {
        let yaml = r#"
$schema: https://example.com/server.schema.json
name: io.example/files
description: Filesystem access server
version: 2.1.0
title: Files
repository:
  url: https://github.com/example/files
  source: github
packages:
  - registryType: npm
    identifier: "@example/files"
    version: 2.1.0
    runtimeHint: npx
    transport:
      type: stdio
    environmentVariables:
      - name: FILES_ROOT
        description: Root directory to expose
        isRequired: true
    packageArguments:
      - type: positional
        description: Path to serve
        default: .
      - type: named
        name: --read-only
"#;
        let manifest: ServerManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.name, "io.example/files");
        assert_eq!(manifest.packages.len(), 1);

        let pkg = &manifest.packages[0];
        assert_eq!(pkg.registry_type, RegistryType::Npm);
        assert_eq!(pkg.runtime_hint, Some(RuntimeHint::Npx));
        assert_eq!(pkg.transport, Transport::Stdio);
        assert!(pkg.environment_variables[0].is_required);
        assert_eq!(pkg.package_arguments[0].kind, ArgumentKind::Positional);
        assert_eq!(pkg.package_arguments[1].name.as_deref(), Some("--read-only"));
    }

    #[test]
    fn test_parse_remote_manifest() {
        let yaml = r#"
name: io.example/hosted
description: Hosted server
version: 0.3.0
remotes:
  - type: streamable-http
    url: https://mcp.example.com/v1
    headers:
      - name: X-Api-Key
        isSecret: true
        isRequired: true
  - type: sse
    url: https://mcp.example.com/sse
"#;
        let manifest: ServerManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.remotes.len(), 2);
        match &manifest.remotes[0] {
            RemoteBinding::StreamableHttp { url, headers } => {
                assert_eq!(url, "https://mcp.example.com/v1");
                assert!(headers[0].is_secret);
            }
            other => panic!("expected streamable-http remote, got {other:?}"),
        }
        assert_eq!(manifest.remotes[1].url(), "https://mcp.example.com/sse");
    }

    #[test]
    fn test_unknown_transport_tag_rejected() {
        let yaml = r#"
name: io.example/bad
description: Bad transport
version: 1.0.0
packages:
  - registryType: npm
    identifier: bad
    transport:
      type: carrier-pigeon
"#;
        assert!(serde_yaml::from_str::<ServerManifest>(yaml).is_err());
    }

    #[test]
    fn test_unknown_registry_type_rejected() {
        let yaml = r#"
name: io.example/bad
description: Bad registry
version: 1.0.0
packages:
  - registryType: homebrew
    identifier: bad
    transport:
      type: stdio
"#;
        assert!(serde_yaml::from_str::<ServerManifest>(yaml).is_err());
    }

    #[test]
    fn test_json_round_trip_preserves_tags() {
        let manifest = ServerManifest {
            schema: None,
            name: "io.example/rt".to_string(),
            description: "Round trip".to_string(),
            version: "1.0.0".to_string(),
            title: None,
            website_url: None,
            repository: None,
            packages: vec![],
            remotes: vec![RemoteBinding::Sse {
                url: "https://example.com/sse".to_string(),
                headers: vec![],
            }],
        };
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["remotes"][0]["type"], "sse");
        let back: ServerManifest = serde_json::from_value(json).unwrap();
        assert_eq!(back, manifest);
    }
}
