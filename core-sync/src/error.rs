use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync pass is already in progress")]
    InProgress,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Sync pass was cancelled")]
    Cancelled,

    #[error("Mapping error: {0}")]
    Mapping(#[from] core_mapping::MappingError),

    #[error("Index error: {0}")]
    Index(#[from] core_index::IndexError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
