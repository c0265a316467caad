//! HTTP adapter for the Visual Recognition v3 REST API

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::service::VisualRecognition;
use crate::types::{ApiKey, ClassifyParams, ServiceReply, TrainingExamples};

/// Default service endpoint
pub const DEFAULT_SERVICE_URL: &str = "https://gateway-a.watsonplatform.net/visual-recognition/api";

/// API version date sent with every call
pub const DEFAULT_API_VERSION: &str = "2016-05-20";

/// Connection settings for [`HttpVisualRecognition`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service base URL, without the `/v3` segment
    pub base_url: Url,

    /// Value of the `version` query parameter
    pub version: String,

    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_SERVICE_URL).expect("default service url is valid"),
            version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Talks to the recognition service over its REST API
#[derive(Debug, Clone)]
pub struct HttpVisualRecognition {
    client: Client,
    base_url: Url,
    version: String,
}

impl HttpVisualRecognition {
    /// Build an adapter from connection settings
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "service url cannot be used as a base: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vizrec/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url,
            version: config.version,
        })
    }

    /// `{base}/v3/<segments...>`, with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::internal("service url cannot be a base"))?
            .pop_if_empty()
            .push("v3")
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        api_key: Option<&ApiKey>,
    ) -> Result<RequestBuilder> {
        let mut query = vec![("version", self.version.as_str())];
        if let Some(key) = api_key {
            query.push(("api_key", key.expose()));
        }

        Ok(self
            .client
            .request(method, self.endpoint(segments)?)
            .query(&query))
    }

    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<ServiceReply> {
        let start = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                // The URL carries the api key in its query string
                let e = e.without_url();
                metrics::counter!("vizrec_upstream_errors_total", "operation" => operation)
                    .increment(1);
                warn!("{} failed to reach the recognition service: {}", operation, e);
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = response.bytes().await.map_err(reqwest::Error::without_url)?;
        let latency = start.elapsed();

        metrics::histogram!("vizrec_upstream_latency_us", "operation" => operation)
            .record(latency.as_micros() as f64);
        debug!(
            "{} -> {} ({} bytes, {:?})",
            operation,
            status,
            body.len(),
            latency
        );

        Ok(ServiceReply::from_upstream(status, &body))
    }
}

#[async_trait]
impl VisualRecognition for HttpVisualRecognition {
    async fn list_classifiers(&self, api_key: Option<&ApiKey>) -> Result<ServiceReply> {
        let request = self.request(Method::GET, &["classifiers"], api_key)?;
        self.send("list_classifiers", request).await
    }

    async fn get_classifier(&self, id: &str, api_key: Option<&ApiKey>) -> Result<ServiceReply> {
        let request = self.request(Method::GET, &["classifiers", id], api_key)?;
        self.send("get_classifier", request).await
    }

    async fn create_classifier(
        &self,
        name: &str,
        examples: TrainingExamples,
        api_key: Option<&ApiKey>,
    ) -> Result<ServiceReply> {
        let mut form = Form::new().text("name", name.to_string());
        for (field, upload) in examples.into_fields() {
            let default_name = format!("{}.zip", field);
            form = form.part(field, upload.into_part(&default_name)?);
        }

        let request = self
            .request(Method::POST, &["classifiers"], api_key)?
            .multipart(form);
        self.send("create_classifier", request).await
    }

    async fn classify_image(
        &self,
        params: ClassifyParams,
        api_key: Option<&ApiKey>,
    ) -> Result<ServiceReply> {
        let parameters = serde_json::to_string(&params.parameters_json())?;
        let mut form = Form::new().text("parameters", parameters);
        if let Some(upload) = params.image_file {
            form = form.part("images_file", upload.into_part("image")?);
        }

        let request = self
            .request(Method::POST, &["classify"], api_key)?
            .multipart(form);
        self.send("classify_image", request).await
    }

    async fn delete_classifier(&self, id: &str, api_key: Option<&ApiKey>) -> Result<ServiceReply> {
        let request = self.request(Method::DELETE, &["classifiers", id], api_key)?;
        self.send("delete_classifier", request).await
    }

    fn name(&self) -> &str {
        "http"
    }
}
