//! Core types shared by every rusty-swap crate: the request/response protocol,
//! the asset and face data model, and the error taxonomy.

pub mod error;
pub mod manifest;
pub mod protocol;

pub use error::{DownloadError, ResourceError, WorkerError};
