use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors raised by a browser session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("{0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Unexpected script result: {0}")]
    Decode(String),
}

/// Result type for browser session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// One browser page owned by one worker
///
/// Probing methods take `&self` so polling closures can borrow the session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Loads `url` in the page
    async fn navigate(&self, url: &str) -> SessionResult<()>;

    /// Returns the current DOM serialized as HTML
    async fn rendered_html(&self) -> SessionResult<String>;

    /// Clicks the first element matching `selector`
    ///
    /// Returns `false` when nothing matches.
    async fn click_first(&self, selector: &str) -> SessionResult<bool>;

    /// Scrolls to the bottom of the document and returns its new height
    async fn scroll_to_end(&self) -> SessionResult<u64>;

    /// Shuts the session down; further calls are unspecified
    async fn close(&mut self) -> SessionResult<()>;
}

/// Opens browser sessions for workers
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a session, saving downloads into `download_dir` when given
    async fn open(&self, download_dir: Option<&Path>) -> SessionResult<Box<dyn BrowserSession>>;
}
