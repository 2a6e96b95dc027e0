use canvas::sync::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("gave up connecting to {url} after {attempts} attempts")]
    Unreachable { url: String, attempts: u32 },
    #[error("frame decode failed: {0}")]
    Decode(#[from] frames::CodecError),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("server returned error for {syscall}: {message}")]
    ServerError { syscall: String, message: String },
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("script line {line}: {message}")]
    Script { line: usize, message: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for CliError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WsConnect(Box::new(error))
    }
}
