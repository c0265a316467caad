//! vizrec Core
//!
//! Types, errors, and the service adapter shared across vizrec components.
//!
//! This crate provides:
//! - The [`VisualRecognition`] trait every route handler talks to
//! - An HTTP adapter for the Visual Recognition v3 REST API
//! - Request-scoped spooling of uploaded files
//! - Error types and result handling

pub mod adapters;
pub mod error;
pub mod service;
pub mod types;
pub mod upload;

pub use adapters::{ClientConfig, HttpVisualRecognition};
pub use error::{Error, Result};
pub use service::VisualRecognition;
pub use types::{example_field_name, ApiKey, ClassifyParams, ServiceReply, TrainingExamples};
pub use upload::{SpooledUpload, UploadSpool};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::service::VisualRecognition;
    pub use crate::types::{ApiKey, ClassifyParams, ServiceReply, TrainingExamples};
    pub use crate::upload::SpooledUpload;
}
