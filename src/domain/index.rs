//! The `index.yaml` structure: the catalog of manifests at a commit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub version: String,
    /// Commit SHA the index was generated from.
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub servers: Vec<IndexEntry>,
}

/// One row of the index: name plus the repo-relative path of the manifest
/// file and denormalized display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_yaml() {
        let yaml = r#"
version: "1"
commit: 0123456789abcdef0123456789abcdef01234567
updated_at: "2025-06-01T12:00:00Z"
servers:
  - name: io.example/demo
    path: servers/demo.yaml
    description: Demo server
    version: 1.0.0
    labels:
      tier: official
  - name: io.example/other
    path: servers/other.yaml
"#;
        let index: Index = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(index.version, "1");
        assert_eq!(index.servers.len(), 2);
        assert_eq!(index.servers[0].name, "io.example/demo");
        assert_eq!(index.servers[0].labels.get("tier").unwrap(), "official");
        // Optional denormalized fields default to empty.
        assert_eq!(index.servers[1].description, "");
        assert_eq!(index.servers[1].version, "");
    }

    #[test]
    fn test_parse_empty_server_list() {
        let index: Index = serde_yaml::from_str("version: \"1\"\nservers: []\n").unwrap();
        assert!(index.servers.is_empty());
    }
}
