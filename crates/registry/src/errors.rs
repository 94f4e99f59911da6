use apikey_core_types::ModelError;
use thiserror::Error;

/// Errors surfaced while loading or applying registry snapshots.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize snapshot: {0}")]
    Deserialize(String),
    #[error("invalid entity: {0}")]
    Invalid(#[from] ModelError),
    #[error("duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },
}
