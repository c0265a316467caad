//! Service adapters
//!
//! Implementations of [`VisualRecognition`](crate::VisualRecognition) for
//! concrete transports.

mod http;

pub use http::{ClientConfig, HttpVisualRecognition, DEFAULT_API_VERSION, DEFAULT_SERVICE_URL};
