pub mod api;
pub mod errors;
pub mod metrics;
pub mod snapshot;
pub mod stores;

pub use api::Registry;
pub use errors::RegistryError;
pub use snapshot::{load_snapshot_from_path, parse_snapshot_str, RegistrySnapshot};
pub use stores::{BindingStore, KeyStore, ProxyStore, ResolvedRule, RuleLookup};
