use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error means the target path does not exist.
    ///
    /// The sync engine branches on this distinction: an absent remote file
    /// during deletion is treated as already-deleted, and a missing parent
    /// directory during upload triggers directory creation plus one retry.
    pub fn is_not_found(&self) -> bool {
        match self {
            BridgeError::NotFound(_) => true,
            BridgeError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(BridgeError::NotFound("/a/b".to_string()).is_not_found());
        assert!(BridgeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing"
        ))
        .is_not_found());
        assert!(!BridgeError::OperationFailed("boom".to_string()).is_not_found());
    }
}
