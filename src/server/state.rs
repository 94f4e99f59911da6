use std::sync::Arc;
use std::time::Duration;

use apikey_registry::Registry;

use crate::plugin::{ApiKeyPlugin, Plugin};

/// Handles shared by every forward-auth request.
#[derive(Clone)]
pub struct ServeState {
    pub(crate) registry: Registry,
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) request_timeout: Option<Duration>,
}

impl ServeState {
    pub fn new(registry: Registry, plugin: Arc<ApiKeyPlugin>, request_timeout: Duration) -> Self {
        Self {
            registry,
            plugin,
            request_timeout: (!request_timeout.is_zero()).then_some(request_timeout),
        }
    }
}
