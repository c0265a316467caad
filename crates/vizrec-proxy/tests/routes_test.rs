//! Route and CORS behavior against a recording adapter

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use vizrec_core::{
    ApiKey, ClassifyParams, Result as CoreResult, ServiceReply, TrainingExamples,
    VisualRecognition,
};
use vizrec_proxy::cors::MethodLookup;
use vizrec_proxy::{create_router, AppState, ProxyConfig};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    List {
        key: Option<String>,
    },
    Get {
        id: String,
        key: Option<String>,
    },
    Create {
        name: String,
        fields: Vec<(String, Vec<u8>)>,
        key: Option<String>,
    },
    Classify {
        ids: Vec<String>,
        url: Option<String>,
        file: Option<Vec<u8>>,
        threshold: f32,
        key: Option<String>,
    },
    Delete {
        id: String,
        key: Option<String>,
    },
}

/// Replies with a fixed status and body, recording every call
struct RecordingService {
    status: StatusCode,
    body: Value,
    calls: Mutex<Vec<Call>>,
}

impl RecordingService {
    fn replying(status: StatusCode, body: Value) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn ok() -> Arc<Self> {
        Self::replying(StatusCode::OK, json!({"classifiers": []}))
    }

    fn record(&self, call: Call) -> ServiceReply {
        self.calls.lock().unwrap().push(call);
        ServiceReply::new(self.status, self.body.clone())
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

fn key(api_key: Option<&ApiKey>) -> Option<String> {
    api_key.map(|k| k.expose().to_string())
}

#[async_trait]
impl VisualRecognition for RecordingService {
    async fn list_classifiers(&self, api_key: Option<&ApiKey>) -> CoreResult<ServiceReply> {
        Ok(self.record(Call::List { key: key(api_key) }))
    }

    async fn get_classifier(&self, id: &str, api_key: Option<&ApiKey>) -> CoreResult<ServiceReply> {
        Ok(self.record(Call::Get {
            id: id.to_string(),
            key: key(api_key),
        }))
    }

    async fn create_classifier(
        &self,
        name: &str,
        examples: TrainingExamples,
        api_key: Option<&ApiKey>,
    ) -> CoreResult<ServiceReply> {
        let mut fields = Vec::new();
        for (field, upload) in examples.into_fields() {
            fields.push((field, upload.into_bytes().await?));
        }
        Ok(self.record(Call::Create {
            name: name.to_string(),
            fields,
            key: key(api_key),
        }))
    }

    async fn classify_image(
        &self,
        params: ClassifyParams,
        api_key: Option<&ApiKey>,
    ) -> CoreResult<ServiceReply> {
        let file = match params.image_file {
            Some(upload) => Some(upload.into_bytes().await?),
            None => None,
        };
        Ok(self.record(Call::Classify {
            ids: params.classifier_ids,
            url: params.image_url,
            file,
            threshold: params.threshold,
            key: key(api_key),
        }))
    }

    async fn delete_classifier(&self, id: &str, api_key: Option<&ApiKey>) -> CoreResult<ServiceReply> {
        Ok(self.record(Call::Delete {
            id: id.to_string(),
            key: key(api_key),
        }))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn test_config() -> ProxyConfig {
    ProxyConfig {
        assets_dir: PathBuf::from("/nonexistent/vizrec-assets"),
        ..Default::default()
    }
}

fn app_with(config: ProxyConfig, service: Arc<RecordingService>) -> Router {
    let state = AppState::with_service(config, service).unwrap();
    create_router(state)
}

fn app(service: Arc<RecordingService>) -> Router {
    app_with(test_config(), service)
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

const BOUNDARY: &str = "vizrec-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_list_forwards_key_and_attaches_cors_headers() {
    let service = RecordingService::ok();
    let response = app(service.clone())
        .oneshot(request(Method::GET, "/api/classifiers?apiKey=secret"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    assert_eq!(
        header_str(&response, "access-control-allow-methods"),
        Some("GET, HEAD, OPTIONS, POST")
    );
    assert_eq!(header_str(&response, "access-control-max-age"), Some("21600"));
    assert_eq!(
        header_str(&response, "access-control-allow-credentials"),
        Some("true")
    );
    assert_eq!(
        header_str(&response, "access-control-allow-headers"),
        Some("Origin, X-Requested-With, Content-Type, Accept, Authorization")
    );
    assert_eq!(body_json(response).await, json!({"classifiers": []}));
    assert_eq!(
        service.calls(),
        vec![Call::List {
            key: Some("secret".into())
        }]
    );
}

#[tokio::test]
async fn test_list_without_key() {
    let service = RecordingService::ok();
    let response = app(service.clone())
        .oneshot(request(Method::GET, "/api/classifiers"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(service.calls(), vec![Call::List { key: None }]);
}

#[tokio::test]
async fn test_service_status_passes_through() {
    let error_body = json!({"code": 401, "error": "Invalid API key"});
    let service = RecordingService::replying(StatusCode::UNAUTHORIZED, error_body.clone());

    let response = app(service)
        .oneshot(request(Method::GET, "/api/classifier/dogs_1?apiKey=bad"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    assert_eq!(body_json(response).await, error_body);
}

#[tokio::test]
async fn test_get_classifier_by_id() {
    let service = RecordingService::replying(
        StatusCode::OK,
        json!({"classifier_id": "dogs_1", "status": "ready"}),
    );
    let response = app(service.clone())
        .oneshot(request(Method::GET, "/api/classifier/dogs_1?apiKey=k"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, "access-control-allow-methods"),
        Some("DELETE, GET, HEAD, OPTIONS")
    );
    assert_eq!(
        service.calls(),
        vec![Call::Get {
            id: "dogs_1".into(),
            key: Some("k".into())
        }]
    );
}

#[tokio::test]
async fn test_delete_reads_key_from_header() {
    let service = RecordingService::replying(StatusCode::OK, json!({}));
    let req = Request::builder()
        .method(Method::DELETE)
        .uri("/api/classifier/dogs_1?apiKey=ignored")
        .header("apiKey", "from-header")
        .body(Body::empty())
        .unwrap();

    let response = app(service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        service.calls(),
        vec![Call::Delete {
            id: "dogs_1".into(),
            key: Some("from-header".into())
        }]
    );
}

#[tokio::test]
async fn test_create_maps_class_names_to_fields() {
    let service = RecordingService::replying(StatusCode::OK, json!({"classifier_id": "pets_1"}));
    let req = multipart_request(
        "/api/classifiers",
        &[
            Part::Text("classifier_name", "pets"),
            Part::Text("api_key", "k"),
            Part::File("negative", "cats.zip", b"negative-archive"),
            Part::File("dog", "dogs.zip", b"dog-archive"),
        ],
    );

    let response = app(service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"classifier_id": "pets_1"}));
    assert_eq!(
        service.calls(),
        vec![Call::Create {
            name: "pets".into(),
            fields: vec![
                ("dog_positive_examples".into(), b"dog-archive".to_vec()),
                ("negative_examples".into(), b"negative-archive".to_vec()),
            ],
            key: Some("k".into()),
        }]
    );
}

#[tokio::test]
async fn test_create_requires_name_and_key() {
    let service = RecordingService::ok();
    let req = multipart_request(
        "/api/classifiers",
        &[
            Part::Text("api_key", "k"),
            Part::File("dog", "dogs.zip", b"dog-archive"),
        ],
    );

    let response = app(service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("classifier_name"));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_create_rejects_non_multipart_body() {
    let service = RecordingService::ok();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/classifiers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app(service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_classify_by_url_sends_no_file() {
    let service = RecordingService::replying(StatusCode::OK, json!({"images": []}));
    let req = multipart_request(
        "/api/classify",
        &[
            Part::Text("classifier_id", "dogs_1, cats_2"),
            Part::Text("api_key", "k"),
            Part::Text("image_url", "https://img.example/dog.jpg"),
        ],
    );

    let response = app(service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        service.calls(),
        vec![Call::Classify {
            ids: vec!["dogs_1".into(), "cats_2".into()],
            url: Some("https://img.example/dog.jpg".into()),
            file: None,
            threshold: 0.0,
            key: Some("k".into()),
        }]
    );
}

#[tokio::test]
async fn test_classify_by_file_sends_no_url() {
    let service = RecordingService::replying(StatusCode::OK, json!({"images": []}));
    let req = multipart_request(
        "/api/classify",
        &[
            Part::Text("classifier_id", "dogs_1"),
            Part::Text("api_key", "k"),
            Part::Text("image_url", ""),
            Part::File("file", "dog.jpg", b"jpeg-bytes"),
        ],
    );

    let response = app(service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        service.calls(),
        vec![Call::Classify {
            ids: vec!["dogs_1".into()],
            url: None,
            file: Some(b"jpeg-bytes".to_vec()),
            threshold: 0.0,
            key: Some("k".into()),
        }]
    );
}

#[tokio::test]
async fn test_classify_skips_empty_file_input() {
    let service = RecordingService::ok();
    let req = multipart_request(
        "/api/classify",
        &[
            Part::Text("classifier_id", "dogs_1"),
            Part::Text("api_key", "k"),
            Part::Text("image_url", "https://img.example/dog.jpg"),
            Part::File("file", "", b""),
        ],
    );

    let response = app(service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    match &service.calls()[..] {
        [Call::Classify { file, url, .. }] => {
            assert!(file.is_none());
            assert!(url.is_some());
        }
        other => panic!("unexpected calls: {:?}", other),
    }
}

#[tokio::test]
async fn test_preflight_never_reaches_handler() {
    let service = RecordingService::ok();
    let response = app(service.clone())
        .oneshot(request(Method::OPTIONS, "/api/classifiers"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "allow"), Some("GET, HEAD, OPTIONS, POST"));
    assert_eq!(
        header_str(&response, "access-control-allow-methods"),
        Some("GET, HEAD, OPTIONS, POST")
    );
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    assert!(body_bytes(response).await.is_empty());
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_explicit_cors_settings() {
    let mut config = test_config();
    config.cors = serde_yaml::from_str(
        r#"
origins: ["https://a.example", "https://b.example"]
methods: [post, get]
headers: [content-type, x-custom]
max_age_secs: 600
"#,
    )
    .unwrap();

    let response = app_with(config, RecordingService::ok())
        .oneshot(request(Method::GET, "/api/classifiers"))
        .await
        .unwrap();

    assert_eq!(
        header_str(&response, "access-control-allow-origin"),
        Some("https://a.example, https://b.example")
    );
    assert_eq!(header_str(&response, "access-control-allow-methods"), Some("GET, POST"));
    assert_eq!(
        header_str(&response, "access-control-allow-headers"),
        Some("CONTENT-TYPE, X-CUSTOM")
    );
    assert_eq!(header_str(&response, "access-control-max-age"), Some("600"));
}

#[tokio::test]
async fn test_unknown_api_route_is_404_page() {
    let service = RecordingService::ok();
    let response = app(service.clone())
        .oneshot(request(Method::GET, "/api/nothing-here"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("Page not found"));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_page_paths_serve_app_shell() {
    for path in ["/", "/classifiers/dogs_1"] {
        let response = app(RecordingService::ok())
            .oneshot(request(Method::GET, path))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("Visual Recognition Tool"), "{}", path);
    }
}

#[tokio::test]
async fn test_page_paths_advertise_get_and_head() {
    let response = app(RecordingService::ok())
        .oneshot(request(Method::OPTIONS, "/classifiers/dogs_1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, "access-control-allow-methods"),
        Some("GET, HEAD, OPTIONS")
    );
}

#[tokio::test]
async fn test_shell_served_from_assets_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<div id=\"custom\"></div>").unwrap();
    let config = ProxyConfig {
        assets_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let response = app_with(config, RecordingService::ok())
        .oneshot(request(Method::GET, "/anything"))
        .await
        .unwrap();

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(body, "<div id=\"custom\"></div>");
}

#[tokio::test]
async fn test_favicon_served_from_assets_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("img")).unwrap();
    std::fs::write(dir.path().join("img").join("favicon.ico"), b"icon-bytes").unwrap();
    let config = ProxyConfig {
        assets_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let response = app_with(config, RecordingService::ok())
        .oneshot(request(Method::GET, "/favicon.ico"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    assert_eq!(body_bytes(response).await, b"icon-bytes");
}

#[tokio::test]
async fn test_missing_favicon_is_404_page() {
    let response = app(RecordingService::ok())
        .oneshot(request(Method::GET, "/favicon.ico"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("Page not found"));
}

#[tokio::test]
async fn test_method_lookup_on_unknown_api_route_skips_page() {
    let mut req = request(Method::OPTIONS, "/api/nothing-here");
    req.extensions_mut().insert(MethodLookup);

    let response = app(RecordingService::ok()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_unknown_api_route_preflight_keeps_404_page() {
    let response = app(RecordingService::ok())
        .oneshot(request(Method::OPTIONS, "/api/nothing-here"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("Page not found"));
}

#[tokio::test]
async fn test_trailing_slash_is_ignored() {
    let service = RecordingService::ok();
    let response = app(service.clone())
        .oneshot(request(Method::GET, "/api/classifiers/?apiKey=k"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(service.calls(), vec![Call::List { key: Some("k".into()) }]);
}

#[tokio::test]
async fn test_upload_over_limit_rejected() {
    let service = RecordingService::ok();
    let config = ProxyConfig {
        max_upload_bytes: 64,
        ..test_config()
    };
    let req = multipart_request(
        "/api/classify",
        &[
            Part::Text("classifier_id", "dogs_1"),
            Part::Text("api_key", "k"),
            Part::File("file", "big.jpg", &[0u8; 1024]),
        ],
    );

    let response = app_with(config, service.clone()).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_health() {
    let response = app(RecordingService::ok())
        .oneshot(request(Method::GET, "/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");
}

#[tokio::test]
async fn test_unreachable_service_is_bad_gateway() {
    let mut config = test_config();
    config.service.url = "http://127.0.0.1:1/api".into();
    config.service.allow_insecure = true;
    config.service.timeout_secs = 5;

    let state = AppState::new(config, None).unwrap();
    let response = create_router(state)
        .oneshot(request(Method::GET, "/api/classifiers?apiKey=secret"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "upstream_error");
    assert!(!body["error"]["message"].as_str().unwrap().contains("secret"));
}
