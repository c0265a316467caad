//! Shared application state

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;
use vizrec_core::{HttpVisualRecognition, VisualRecognition};

use crate::assets::Assets;
use crate::config::ProxyConfig;
use crate::cors::CorsLayer;

/// Application state shared across all requests.
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ProxyConfig>,

    /// Recognition service adapter
    pub service: Arc<dyn VisualRecognition>,

    /// Static pages
    pub assets: Arc<Assets>,

    /// Validated CORS policy
    pub cors: CorsLayer,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Initialize application state, connecting to the configured service
    pub fn new(config: ProxyConfig, metrics_handle: Option<PrometheusHandle>) -> Result<Self> {
        let client_config = config.service.client_config()?;
        info!(
            "Recognition service: {} (version {})",
            client_config.base_url, client_config.version
        );

        let service = HttpVisualRecognition::new(client_config)?;
        let mut state = Self::with_service(config, Arc::new(service))?;
        state.metrics_handle = metrics_handle;
        Ok(state)
    }

    /// Initialize application state around an existing adapter
    pub fn with_service(config: ProxyConfig, service: Arc<dyn VisualRecognition>) -> Result<Self> {
        let cors = CorsLayer::new(&config.cors)?;
        let assets = Assets::new(config.assets_dir.clone());
        info!("Serving static assets from {}", assets.root().display());

        Ok(Self {
            config: Arc::new(config),
            service,
            assets: Arc::new(assets),
            cors,
            metrics_handle: None,
        })
    }
}
