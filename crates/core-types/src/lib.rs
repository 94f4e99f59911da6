//! Shared primitives for the API key gateway plugin.
//!
//! Every entity here except [`TrafficEvent`] is owned by an external
//! administrative process and is read-only to the authorization core.

pub mod model;
pub mod path;

pub use model::{
    ApiKey, ApiKeyBinding, ApiProxy, BindingKey, GranularRule, ModelError, Policy, RateLimit,
    RateUnit, Rule, SubpathRule, TrafficEvent, TrafficScope, API_KEY_BINDING_NAME,
};
pub use path::{compute_target_path, is_path_prefix, normalize_path, PathError};
