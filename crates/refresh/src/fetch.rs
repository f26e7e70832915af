use bytes::Bytes;
use decision_core::Policy;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Which remote blob a polling loop is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Settings,
    Model,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Settings => "settings",
            BlobKind::Model => "model",
        }
    }

    /// File name used when persisting the blob to the output directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            BlobKind::Settings => "settings.json",
            BlobKind::Model => "model.bin",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote blob transport. Invoked once per polling tick; failures are
/// retried only by the next tick.
pub trait BlobFetcher: Send + Sync + 'static {
    fn fetch(&self, kind: BlobKind) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Errors that can occur while fetching a blob.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Nothing has been published for this blob yet.
    NotFound(String),
    /// The store could not be reached or timed out.
    Unavailable(String),
    /// The caller is not allowed to read the blob.
    Unauthorized(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NotFound(msg) => write!(f, "blob not found: {msg}"),
            FetchError::Unavailable(msg) => write!(f, "blob store unavailable: {msg}"),
            FetchError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Turns model bytes into a live policy. The model format is the loader's
/// business.
pub trait PolicyLoader<C>: Send + Sync + 'static {
    fn load(&self, bytes: &[u8]) -> anyhow::Result<Arc<dyn Policy<C>>>;
}

impl<C, F> PolicyLoader<C> for F
where
    F: Fn(&[u8]) -> anyhow::Result<Arc<dyn Policy<C>>> + Send + Sync + 'static,
{
    fn load(&self, bytes: &[u8]) -> anyhow::Result<Arc<dyn Policy<C>>> {
        self(bytes)
    }
}
