//! Visual recognition service trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ApiKey, ClassifyParams, ServiceReply, TrainingExamples};

/// Pass-through access to a visual recognition service.
///
/// Every operation returns the service's own status and body. Only failures
/// to reach the service at all surface as `Err`.
#[async_trait]
pub trait VisualRecognition: Send + Sync {
    /// List the custom classifiers owned by the key
    async fn list_classifiers(&self, api_key: Option<&ApiKey>) -> Result<ServiceReply>;

    /// Fetch one classifier's details
    async fn get_classifier(&self, id: &str, api_key: Option<&ApiKey>) -> Result<ServiceReply>;

    /// Train a new classifier from example archives
    async fn create_classifier(
        &self,
        name: &str,
        examples: TrainingExamples,
        api_key: Option<&ApiKey>,
    ) -> Result<ServiceReply>;

    /// Classify an uploaded image or a remote image URL
    async fn classify_image(
        &self,
        params: ClassifyParams,
        api_key: Option<&ApiKey>,
    ) -> Result<ServiceReply>;

    /// Delete a classifier
    async fn delete_classifier(&self, id: &str, api_key: Option<&ApiKey>) -> Result<ServiceReply>;

    /// Name used in logs and metrics
    fn name(&self) -> &str;
}
