//! Registry snapshot definitions and loaders.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use apikey_core_types::{ApiKey, ApiKeyBinding, ApiProxy};
use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;

/// Complete view of the externally owned entities at one point in time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub keys: Vec<ApiKey>,
    #[serde(default)]
    pub bindings: Vec<ApiKeyBinding>,
    #[serde(default)]
    pub proxies: Vec<ApiProxy>,
}

impl RegistrySnapshot {
    /// Validates every entity and rejects duplicate identities.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut secrets = HashSet::new();
        for key in &self.keys {
            key.validate()?;
            if !secrets.insert(key.secret.as_str()) {
                return Err(RegistryError::Duplicate {
                    kind: "api key secret",
                    id: key.name.clone(),
                });
            }
        }

        let mut bindings = HashSet::new();
        for binding in &self.bindings {
            binding.validate()?;
            if !bindings.insert((binding.namespace.as_str(), binding.name.as_str())) {
                return Err(RegistryError::Duplicate {
                    kind: "binding",
                    id: format!("{}/{}", binding.namespace, binding.name),
                });
            }
        }

        let mut proxies = HashSet::new();
        for proxy in &self.proxies {
            proxy.validate()?;
            if !proxies.insert((proxy.namespace.as_str(), proxy.name.as_str())) {
                return Err(RegistryError::Duplicate {
                    kind: "proxy",
                    id: format!("{}/{}", proxy.namespace, proxy.name),
                });
            }
        }
        Ok(())
    }
}

pub fn load_snapshot_from_reader<R: Read>(mut reader: R) -> Result<RegistrySnapshot, RegistryError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_snapshot_str(&buf)
}

pub fn load_snapshot_from_path(path: impl AsRef<Path>) -> Result<RegistrySnapshot, RegistryError> {
    let file = File::open(path.as_ref())?;
    load_snapshot_from_reader(file)
}

/// Parses JSON first, falling back to YAML, then validates.
pub fn parse_snapshot_str(raw: &str) -> Result<RegistrySnapshot, RegistryError> {
    let snapshot: RegistrySnapshot = match serde_json::from_str(raw) {
        Ok(snapshot) => snapshot,
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            RegistryError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        })?,
    };
    snapshot.validate()?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT_YAML: &str = r#"
keys:
  - name: frontend
    namespace: shop
    secret: abc123
bindings:
  - name: widgets
    namespace: shop
    keys:
      - name: frontend
        quota: 100
        defaultRule:
          granular:
            verbs: [GET]
proxies:
  - name: widgets
    namespace: shop
    sourcePath: /v1
    targetPath: /internal
    pluginConfig:
      apiKeyBindingName: widgets
"#;

    #[test]
    fn parses_yaml_snapshot() {
        let snapshot = parse_snapshot_str(SNAPSHOT_YAML).unwrap();
        assert_eq!(snapshot.keys.len(), 1);
        assert_eq!(snapshot.bindings[0].keys[0].quota, Some(100));
        assert_eq!(snapshot.proxies[0].binding_name(), Some("widgets"));
    }

    #[test]
    fn parses_json_snapshot() {
        let raw = r#"{"keys":[{"name":"k","namespace":"ns","secret":"s"}]}"#;
        let snapshot = parse_snapshot_str(raw).unwrap();
        assert_eq!(snapshot.keys[0].secret, "s");
        assert!(snapshot.bindings.is_empty());
    }

    #[test]
    fn rejects_duplicate_secrets() {
        let raw = r#"
keys:
  - {name: a, namespace: ns, secret: same}
  - {name: b, namespace: ns, secret: same}
"#;
        assert!(matches!(
            parse_snapshot_str(raw),
            Err(RegistryError::Duplicate { .. })
        ));
    }

    #[test]
    fn rejects_unparseable_input() {
        assert!(matches!(
            parse_snapshot_str("keys: [unterminated"),
            Err(RegistryError::Deserialize(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(&path, SNAPSHOT_YAML).unwrap();
        let snapshot = load_snapshot_from_path(&path).unwrap();
        assert_eq!(snapshot.proxies[0].source_path, "/v1");
    }
}
