//! Sync engine: coordinator, upload pipeline, download stage and apply layer.

mod apply;
mod download;
mod engine;
mod http;
#[cfg(test)]
mod testing;
mod transport;
mod upload;

pub use apply::{ApplyLayer, ApplyReport, DEFAULT_EVENT_CAPACITY};
pub use download::{DownloadResult, DownloadStage};
pub use engine::{SyncEngine, SyncOutcome};
pub use http::HttpTransport;
pub use transport::{
    DownloadRequest, DownloadResponse, RemoteConflict, ResolveConflictRequest, StateRequest,
    StateResponse, StoreStateRequest, SyncTransport, UploadRequest, UploadResponse,
};
pub use upload::{UploadPipeline, UploadReport};
