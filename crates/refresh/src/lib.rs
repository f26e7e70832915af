//! Background refresh of application settings and the scoring model.
//!
//! Two independent polling loops fetch blobs through a [`BlobFetcher`],
//! validate them, and publish the result into a shared [`RefreshState`]
//! that decision calls read without ever waiting on a fetch.

pub mod fetch;
pub mod refresher;
pub mod settings;
pub mod state;

pub use fetch::{BlobFetcher, BlobKind, FetchError, PolicyLoader};
pub use refresher::{
    spawn_refresher, RefreshCallbacks, RefreshFailure, RefreshFailureCallback, RefreshHandle,
    RefresherConfig,
};
pub use settings::ApplicationSettings;
pub use state::{BlobStatus, RefreshState};
