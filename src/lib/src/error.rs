/// The modsync error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Parse error")]
    Parse,

    #[error("EOF")]
    Eof,

    #[error("Malformed armor: {0}")]
    Armor(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0} from {1}")]
    HttpStatus(u16, String),

    #[error("Key ring error: {0}")]
    KeyRing(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: [{0}]")]
    Internal(String),
}
