//! Store trait and error type.

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`RemoteStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Errors reported by a remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The request never got a usable answer (connect, TLS, timeout, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered but refused the operation.
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl RemoteError {
    /// Transport failures and rejections may clear up on their own;
    /// a bad configuration will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Rejected { .. })
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Abstract put/get blob store.
///
/// Implementations do not retry; the pipelines own the retry policy.
pub trait RemoteStore: Send + Sync {
    /// Stores `payload` and returns its locator. `label` is the slice index.
    fn put<'a>(&'a self, payload: &'a [u8], label: u64) -> StoreFuture<'a, String>;

    /// Fetches the payload previously stored under `locator`.
    fn get<'a>(&'a self, locator: &'a str) -> StoreFuture<'a, Vec<u8>>;
}
