//! API key gateway plugin.
//!
//! Exposes modules for integration testing and for hosts embedding the plugin.

pub mod config;
pub mod context;
pub mod errors;
pub mod metrics;
pub mod plugin;
pub mod server;

pub use config::{load_settings, GatewaySettings, SettingsError};
pub use context::{InboundRequest, RequestContext};
pub use errors::PluginError;
pub use plugin::{ApiKeyPlugin, Plugin};
pub use server::{build_router, serve, Gateway, ServeState};
