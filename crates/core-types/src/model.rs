use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::is_path_prefix;

/// Plugin configuration key naming the binding a proxy route is associated with.
pub const API_KEY_BINDING_NAME: &str = "apiKeyBindingName";

/// Validation failures for externally supplied entities.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("{kind} is missing a name")]
    MissingName { kind: &'static str },
    #[error("{kind} '{name}' is missing a namespace")]
    MissingNamespace { kind: &'static str, name: String },
    #[error("api key '{0}' has an empty secret")]
    EmptySecret(String),
    #[error("binding key '{0}' declares a rate limit of zero")]
    ZeroRate(String),
    #[error("binding key '{key}' has a subpath without a leading slash: {path}")]
    RelativeSubpath { key: String, path: String },
}

/// A credential presented by callers through the configured request header.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub name: String,
    pub namespace: String,
    pub secret: String,
}

impl ApiKey {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::MissingName { kind: "api key" });
        }
        if self.namespace.trim().is_empty() {
            return Err(ModelError::MissingNamespace {
                kind: "api key",
                name: self.name.clone(),
            });
        }
        if self.secret.is_empty() {
            return Err(ModelError::EmptySecret(self.name.clone()));
        }
        Ok(())
    }
}

// The secret never reaches logs.
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A routable entity mapping an inbound path prefix onto an upstream prefix.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiProxy {
    pub name: String,
    pub namespace: String,
    pub source_path: String,
    pub target_path: String,
    #[serde(default)]
    pub plugin_config: HashMap<String, String>,
}

impl ApiProxy {
    /// Binding name configured for this route, if any.
    pub fn binding_name(&self) -> Option<&str> {
        self.plugin_config
            .get(API_KEY_BINDING_NAME)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::MissingName { kind: "proxy" });
        }
        if self.namespace.trim().is_empty() {
            return Err(ModelError::MissingNamespace {
                kind: "proxy",
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Grants a set of keys rules and policies within one namespace.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyBinding {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub keys: Vec<BindingKey>,
}

impl ApiKeyBinding {
    pub fn key(&self, key_name: &str) -> Option<&BindingKey> {
        self.keys.iter().find(|entry| entry.name == key_name)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::MissingName { kind: "binding" });
        }
        if self.namespace.trim().is_empty() {
            return Err(ModelError::MissingNamespace {
                kind: "binding",
                name: self.name.clone(),
            });
        }
        for key in &self.keys {
            key.validate()?;
        }
        Ok(())
    }
}

/// Per-key entry inside a binding: the rules and the rate/quota policy.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BindingKey {
    pub name: String,
    #[serde(default)]
    pub quota: Option<u64>,
    #[serde(default)]
    pub rate: Option<RateLimit>,
    #[serde(default)]
    pub default_rule: Option<Rule>,
    #[serde(default)]
    pub subpaths: Vec<SubpathRule>,
}

impl BindingKey {
    pub fn policy(&self) -> Policy {
        Policy {
            quota: self.quota,
            rate: self.rate,
        }
    }

    /// Rule governing `target_path`.
    ///
    /// The longest subpath that is a segment-aligned prefix of the target wins;
    /// otherwise the default rule applies. `None` denies everything.
    pub fn rule_for(&self, target_path: &str) -> Option<&Rule> {
        self.subpaths
            .iter()
            .filter(|sub| is_path_prefix(&sub.path, target_path))
            .max_by_key(|sub| sub.path.trim_end_matches('/').len())
            .map(|sub| &sub.rule)
            .or(self.default_rule.as_ref())
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::MissingName {
                kind: "binding key",
            });
        }
        if let Some(rate) = &self.rate {
            if rate.amount == 0 {
                return Err(ModelError::ZeroRate(self.name.clone()));
            }
        }
        if let Some(sub) = self.subpaths.iter().find(|sub| !sub.path.starts_with('/')) {
            return Err(ModelError::RelativeSubpath {
                key: self.name.clone(),
                path: sub.path.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubpathRule {
    pub path: String,
    pub rule: Rule,
}

/// Global-or-granular permission statement.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub granular: Option<GranularRule>,
}

impl Rule {
    pub fn global() -> Self {
        Self {
            global: true,
            granular: None,
        }
    }

    pub fn granular<I, S>(verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            global: false,
            granular: Some(GranularRule {
                verbs: verbs.into_iter().map(Into::into).collect(),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GranularRule {
    #[serde(default)]
    pub verbs: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
}

impl RateUnit {
    pub fn window(self) -> Duration {
        match self {
            RateUnit::Second => Duration::from_secs(1),
            RateUnit::Minute => Duration::from_secs(60),
            RateUnit::Hour => Duration::from_secs(60 * 60),
        }
    }
}

/// Ceiling of `amount` requests per `unit` window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimit {
    pub amount: u64,
    pub unit: RateUnit,
}

/// Rate and quota ceilings for one key within one binding.
///
/// An absent ceiling is not enforced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    pub quota: Option<u64>,
    pub rate: Option<RateLimit>,
}

/// Identifies the counters an event contributes to.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficScope {
    pub namespace: String,
    pub binding: String,
    pub key_name: String,
}

impl TrafficScope {
    pub fn new(
        namespace: impl Into<String>,
        binding: impl Into<String>,
        key_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            binding: binding.into(),
            key_name: key_name.into(),
        }
    }

    pub fn for_binding(binding: &ApiKeyBinding, key_name: &str) -> Self {
        Self::new(&binding.namespace, &binding.name, key_name)
    }
}

impl fmt::Display for TrafficScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.binding, self.key_name)
    }
}

/// One allowed request, recorded for future rate and quota decisions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficEvent {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub scope: TrafficScope,
}

impl TrafficEvent {
    pub fn new(scope: TrafficScope, time: DateTime<Utc>) -> Self {
        Self { time, scope }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with_subpaths() -> BindingKey {
        BindingKey {
            name: "reader".into(),
            quota: None,
            rate: None,
            default_rule: Some(Rule::granular(["GET"])),
            subpaths: vec![
                SubpathRule {
                    path: "/internal/admin".into(),
                    rule: Rule::global(),
                },
                SubpathRule {
                    path: "/internal/admin/audit".into(),
                    rule: Rule::granular(Vec::<String>::new()),
                },
            ],
        }
    }

    #[test]
    fn longest_subpath_wins() {
        let key = key_with_subpaths();
        assert_eq!(
            key.rule_for("/internal/admin/audit/2024"),
            Some(&Rule::granular(Vec::<String>::new()))
        );
        assert_eq!(key.rule_for("/internal/admin/users"), Some(&Rule::global()));
    }

    #[test]
    fn subpath_match_is_segment_aligned() {
        let key = key_with_subpaths();
        assert_eq!(
            key.rule_for("/internal/administrator"),
            Some(&Rule::granular(["GET"]))
        );
    }

    #[test]
    fn missing_default_rule_yields_none() {
        let key = BindingKey {
            name: "bare".into(),
            ..Default::default()
        };
        assert!(key.rule_for("/anything").is_none());
    }

    #[test]
    fn binding_parses_camel_case_yaml() {
        let raw = r#"
name: widgets
namespace: shop
keys:
  - name: frontend
    quota: 100
    rate:
      amount: 10
      unit: minute
    defaultRule:
      granular:
        verbs: ["GET", "post"]
    subpaths:
      - path: /internal/orders
        rule:
          global: true
"#;
        let binding: ApiKeyBinding = serde_yaml::from_str(raw).unwrap();
        binding.validate().unwrap();
        let key = binding.key("frontend").unwrap();
        assert_eq!(key.quota, Some(100));
        assert_eq!(key.rate.unwrap().unit.window(), Duration::from_secs(60));
        assert!(key.rule_for("/internal/orders/7").unwrap().global);
        assert!(binding.key("backend").is_none());
    }

    #[test]
    fn zero_rate_is_rejected() {
        let binding = ApiKeyBinding {
            name: "b".into(),
            namespace: "ns".into(),
            keys: vec![BindingKey {
                name: "k".into(),
                rate: Some(RateLimit {
                    amount: 0,
                    unit: RateUnit::Second,
                }),
                ..Default::default()
            }],
        };
        assert_eq!(binding.validate(), Err(ModelError::ZeroRate("k".into())));
    }

    #[test]
    fn api_key_debug_redacts_secret() {
        let key = ApiKey {
            name: "frontend".into(),
            namespace: "shop".into(),
            secret: "abc123".into(),
        };
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("abc123"));
    }

    #[test]
    fn traffic_event_serializes_flat() {
        let event = TrafficEvent::new(
            TrafficScope::new("shop", "widgets", "frontend"),
            DateTime::<Utc>::UNIX_EPOCH,
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["keyName"], "frontend");
        assert_eq!(value["binding"], "widgets");
    }
}
