use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
