//! vizrec Proxy
//!
//! REST façade over a visual recognition service. Requests are forwarded
//! through a [`VisualRecognition`](vizrec_core::VisualRecognition) adapter and
//! every response passes through the [`cors`] stage.

pub mod assets;
pub mod cli;
pub mod config;
pub mod cors;
pub mod form;
pub mod logging;
pub mod routes;
pub mod security;
pub mod state;

pub use cli::Cli;
pub use config::{ProxyConfig, ServiceConfig};
pub use cors::{AllowedOrigin, CorsConfig, CorsLayer};
pub use routes::{create_router, AppError};
pub use state::AppState;
