//! Concurrent read-through views over externally owned entities.
//!
//! Readers never block each other. A single updater replaces contents through
//! [`crate::Registry::apply_snapshot`]; readers may observe a mix of old and new
//! entries while a refresh is in flight.

use std::collections::HashSet;
use std::sync::Arc;

use apikey_core_types::{ApiKey, ApiKeyBinding, ApiProxy, Policy, Rule};
use dashmap::DashMap;

type EntityId = (String, String);

fn entity_id(namespace: &str, name: &str) -> EntityId {
    (namespace.to_string(), name.to_string())
}

/// Credentials indexed by their presented secret.
#[derive(Default)]
pub struct KeyStore {
    keys: DashMap<String, Arc<ApiKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact, case-sensitive lookup of a presented key value.
    pub fn get(&self, secret: &str) -> Option<Arc<ApiKey>> {
        self.keys.get(secret).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, key: ApiKey) {
        self.keys.insert(key.secret.clone(), Arc::new(key));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn replace_all(&self, keys: Vec<ApiKey>) {
        let live: HashSet<String> = keys.iter().map(|key| key.secret.clone()).collect();
        for key in keys {
            self.insert(key);
        }
        self.keys.retain(|secret, _| live.contains(secret));
    }
}

/// Outcome of resolving a key's rule within a binding.
#[derive(Clone, Debug)]
pub enum RuleLookup {
    Resolved(ResolvedRule),
    /// No binding exists for the namespace and name.
    BindingNotFound,
    /// The binding exists but does not mention the key.
    KeyNotGranted { binding: Arc<ApiKeyBinding> },
}

#[derive(Clone, Debug)]
pub struct ResolvedRule {
    pub binding: Arc<ApiKeyBinding>,
    /// `None` denies every request.
    pub rule: Option<Rule>,
    pub policy: Policy,
}

/// Bindings indexed by namespace and binding name.
#[derive(Default)]
pub struct BindingStore {
    bindings: DashMap<EntityId, Arc<ApiKeyBinding>>,
}

impl BindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<ApiKeyBinding>> {
        self.bindings
            .get(&entity_id(namespace, name))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, binding: ApiKeyBinding) {
        let id = entity_id(&binding.namespace, &binding.name);
        self.bindings.insert(id, Arc::new(binding));
    }

    /// Looks up the rule and policy governing `key_name` on `target_path`.
    pub fn resolve_rule(
        &self,
        namespace: &str,
        binding_name: &str,
        key_name: &str,
        target_path: &str,
    ) -> RuleLookup {
        let Some(binding) = self.get(namespace, binding_name) else {
            return RuleLookup::BindingNotFound;
        };
        let Some(key) = binding.key(key_name) else {
            return RuleLookup::KeyNotGranted { binding };
        };
        let rule = key.rule_for(target_path).cloned();
        let policy = key.policy();
        RuleLookup::Resolved(ResolvedRule {
            binding,
            rule,
            policy,
        })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn replace_all(&self, bindings: Vec<ApiKeyBinding>) {
        let live: HashSet<EntityId> = bindings
            .iter()
            .map(|binding| entity_id(&binding.namespace, &binding.name))
            .collect();
        for binding in bindings {
            self.insert(binding);
        }
        self.bindings.retain(|id, _| live.contains(id));
    }
}

/// Proxies indexed by namespace and name, matchable by source path.
#[derive(Default)]
pub struct ProxyStore {
    proxies: DashMap<EntityId, Arc<ApiProxy>>,
}

impl ProxyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<ApiProxy>> {
        self.proxies
            .get(&entity_id(namespace, name))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, proxy: ApiProxy) {
        let id = entity_id(&proxy.namespace, &proxy.name);
        self.proxies.insert(id, Arc::new(proxy));
    }

    /// Proxy with the longest source path covering `request_path`. Equal
    /// lengths go to the smallest `(namespace, name)`.
    pub fn match_path(&self, request_path: &str) -> Option<Arc<ApiProxy>> {
        let mut best: Option<(usize, Arc<ApiProxy>)> = None;
        for entry in self.proxies.iter() {
            let proxy = entry.value();
            if !apikey_core_types::is_path_prefix(&proxy.source_path, request_path) {
                continue;
            }
            let match_len = proxy.source_path.trim_end_matches('/').len();
            let better = match &best {
                None => true,
                Some((len, current)) => {
                    match_len > *len
                        || (match_len == *len
                            && (proxy.namespace.as_str(), proxy.name.as_str())
                                < (current.namespace.as_str(), current.name.as_str()))
                }
            };
            if better {
                best = Some((match_len, Arc::clone(proxy)));
            }
        }
        best.map(|(_, proxy)| proxy)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub(crate) fn replace_all(&self, proxies: Vec<ApiProxy>) {
        let live: HashSet<EntityId> = proxies
            .iter()
            .map(|proxy| entity_id(&proxy.namespace, &proxy.name))
            .collect();
        for proxy in proxies {
            self.insert(proxy);
        }
        self.proxies.retain(|id, _| live.contains(id));
    }
}
