use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket failed: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("not logged in")]
    NotLoggedIn,
}
