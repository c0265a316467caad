//! Core types for vizrec

use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::upload::SpooledUpload;

/// Class name whose examples are uploaded as negative examples
pub const NEGATIVE_CLASS: &str = "negative";

/// Caller-supplied credential for the recognition service.
///
/// Passed through unmodified; the value never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for placing on the outbound request
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// A reply from the recognition service: the status it reported and its JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReply {
    /// Status code reported by the service
    pub status: StatusCode,

    /// Body as returned by the service
    pub body: Value,
}

impl ServiceReply {
    /// Create a new reply
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// Build a reply from a raw upstream body.
    ///
    /// JSON bodies are kept as-is, an empty body becomes `{}`, anything else
    /// is wrapped as `{"error": "<text>"}`. The status is never altered.
    pub fn from_upstream(status: StatusCode, body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::new(status, json!({}));
        }

        let body = serde_json::from_slice(body).unwrap_or_else(|_| {
            json!({ "error": String::from_utf8_lossy(body).trim() })
        });

        Self::new(status, body)
    }

    /// Check if the service reported success
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Multipart field name the service expects for a class's training examples.
///
/// `negative` maps to `negative_examples`, every other class to
/// `<class>_positive_examples`.
pub fn example_field_name(class_name: &str) -> String {
    if class_name == NEGATIVE_CLASS {
        "negative_examples".to_string()
    } else {
        format!("{}_positive_examples", class_name)
    }
}

/// Training example archives keyed by their service field name
#[derive(Debug, Default)]
pub struct TrainingExamples {
    fields: BTreeMap<String, SpooledUpload>,
}

impl TrainingExamples {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the examples for a logical class, returning any upload it replaces
    pub fn insert(&mut self, class_name: &str, upload: SpooledUpload) -> Option<SpooledUpload> {
        self.fields.insert(example_field_name(class_name), upload)
    }

    /// Service field names, in sorted order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of example archives
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if no examples were supplied
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume the set, yielding `(field name, upload)` pairs
    pub fn into_fields(self) -> impl Iterator<Item = (String, SpooledUpload)> {
        self.fields.into_iter()
    }
}

impl FromIterator<(String, SpooledUpload)> for TrainingExamples {
    fn from_iter<I: IntoIterator<Item = (String, SpooledUpload)>>(iter: I) -> Self {
        let mut examples = Self::new();
        for (class_name, upload) in iter {
            examples.insert(&class_name, upload);
        }
        examples
    }
}

/// Parameters for a single classify call
#[derive(Debug)]
pub struct ClassifyParams {
    /// Classifiers to run the image through
    pub classifier_ids: Vec<String>,

    /// Uploaded image, if any
    pub image_file: Option<SpooledUpload>,

    /// Remote image URL, if any
    pub image_url: Option<String>,

    /// Minimum score for a class to be reported (0 accepts everything)
    pub threshold: f32,
}

impl ClassifyParams {
    /// Create parameters for the given classifiers with no image and threshold 0
    pub fn new<I, S>(classifier_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classifier_ids: classifier_ids.into_iter().map(Into::into).collect(),
            image_file: None,
            image_url: None,
            threshold: 0.0,
        }
    }

    /// Parse a comma-separated classifier id list
    pub fn parse_ids(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Attach an uploaded image
    pub fn with_image_file(mut self, upload: Option<SpooledUpload>) -> Self {
        self.image_file = upload;
        self
    }

    /// Attach a remote image URL; an empty URL counts as absent
    pub fn with_image_url(mut self, url: Option<String>) -> Self {
        self.image_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    /// Set the score threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// The `parameters` document sent alongside the image
    pub fn parameters_json(&self) -> Value {
        let mut parameters = json!({
            "classifier_ids": self.classifier_ids,
            "threshold": self.threshold,
        });
        if let Some(url) = &self.image_url {
            parameters["url"] = json!(url);
        }
        parameters
    }
}
