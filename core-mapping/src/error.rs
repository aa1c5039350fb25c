use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Failed to parse mapping table: {0}")]
    Parse(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, MappingError>;
