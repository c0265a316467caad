//! HTTP routes and handlers

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    limit::RequestBodyLimitLayer, normalize_path::NormalizePathLayer, services::ServeFile,
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vizrec_core::{ApiKey, ClassifyParams, ServiceReply, TrainingExamples};

use crate::cors::MethodLookup;
use crate::form::UploadForm;
use crate::state::AppState;

/// Header carrying the key on delete requests
const API_KEY_HEADER: &str = "apikey";

pub fn create_router(state: AppState) -> Router {
    let cors = state.cors.clone();
    let max_upload_bytes = state.config.max_upload_bytes;

    let routes = Router::new()
        .route(
            "/api/classifiers",
            get(list_classifiers).post(create_classifier),
        )
        .route(
            "/api/classifier/:id",
            get(get_classifier).delete(delete_classifier),
        )
        .route("/api/classify", post(classify))
        .route("/", get(index))
        .route("/favicon.ico", get(favicon))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state);

    // CORS wraps the whole router so preflights see the 405 `Allow` header
    let app = ServiceBuilder::new()
        .layer(cors)
        .layer(NormalizePathLayer::trim_trailing_slash())
        .service(routes);

    Router::new().fallback_service(app).layer(
        // The default span records the full URI, query string and api key included
        TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                id = %Uuid::new_v4(),
                method = %req.method(),
                path = %req.uri().path(),
            )
        }),
    )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

async fn index(State(state): State<AppState>) -> Html<String> {
    state.assets.index_page().await
}

/// Served from the assets directory, with the 404 page when missing
async fn favicon(State(state): State<AppState>, req: Request<Body>) -> Response {
    let response = ServeFile::new(state.assets.favicon_path())
        .oneshot(req)
        .await
        .unwrap_or_else(|never| match never {});

    if response.status() == StatusCode::NOT_FOUND {
        debug!("No favicon at {}", state.assets.favicon_path().display());
        return not_found(&state).await;
    }
    response.into_response()
}

/// SPA shell for page paths, 404 page for everything else
async fn fallback(
    State(state): State<AppState>,
    lookup: Option<Extension<MethodLookup>>,
    method: Method,
    uri: Uri,
) -> Response {
    let path = uri.path();
    let api_path = path == "/api" || path.starts_with("/api/");

    if !api_path {
        if method == Method::GET || method == Method::HEAD {
            return state.assets.index_page().await.into_response();
        }
        if method == Method::OPTIONS {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "GET,HEAD")],
            )
                .into_response();
        }
    }

    // The CORS layer only reads the status and headers of its lookups
    if lookup.is_some() {
        return StatusCode::NOT_FOUND.into_response();
    }

    debug!("No route for {} {}", method, path);
    not_found(&state).await
}

async fn not_found(state: &AppState) -> Response {
    (StatusCode::NOT_FOUND, state.assets.not_found_page().await).into_response()
}

/// Key passed as the `apiKey` query parameter
#[derive(Debug, Deserialize)]
struct KeyQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

impl KeyQuery {
    fn into_key(self) -> Option<ApiKey> {
        self.api_key.map(ApiKey::from)
    }
}

async fn list_classifiers(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Result<Response, AppError> {
    count_request("list_classifiers");

    let api_key = query.into_key();
    let reply = state.service.list_classifiers(api_key.as_ref()).await?;
    Ok(relay("list_classifiers", reply))
}

async fn get_classifier(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Response, AppError> {
    count_request("get_classifier");

    let api_key = query.into_key();
    let reply = state.service.get_classifier(&id, api_key.as_ref()).await?;
    Ok(relay("get_classifier", reply))
}

async fn delete_classifier(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    count_request("delete_classifier");

    let api_key = match headers.get(API_KEY_HEADER) {
        Some(value) => Some(ApiKey::new(value.to_str().map_err(|_| {
            AppError::InvalidRequest("Header 'apiKey' is not valid text".to_string())
        })?)),
        None => None,
    };

    info!("Deleting classifier {}", id);
    let reply = state
        .service
        .delete_classifier(&id, api_key.as_ref())
        .await?;
    Ok(relay("delete_classifier", reply))
}

/// Every file part is a training example named after its class
async fn create_classifier(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    count_request("create_classifier");

    let mut form = UploadForm::read(multipart?).await?;
    let name = form.require("classifier_name")?;
    let api_key = ApiKey::new(form.require("api_key")?);
    let examples: TrainingExamples = form.take_files().into_iter().collect();

    info!(
        "Creating classifier '{}' from {} example set(s)",
        name,
        examples.len()
    );
    let reply = state
        .service
        .create_classifier(&name, examples, Some(&api_key))
        .await?;
    Ok(relay("create_classifier", reply))
}

async fn classify(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    count_request("classify");

    let mut form = UploadForm::read(multipart?).await?;
    let classifier_ids = form.require("classifier_id")?;
    let api_key = ApiKey::new(form.require("api_key")?);

    let params = ClassifyParams::new(ClassifyParams::parse_ids(&classifier_ids))
        .with_image_url(form.take("image_url"))
        .with_image_file(form.take_file("file"))
        .with_threshold(0.0);

    debug!(
        "Classifying with {:?} (file: {}, url: {})",
        params.classifier_ids,
        params.image_file.is_some(),
        params.image_url.is_some()
    );
    let reply = state.service.classify_image(params, Some(&api_key)).await?;
    Ok(relay("classify", reply))
}

fn count_request(route: &'static str) {
    metrics::counter!("vizrec_requests_total", "route" => route).increment(1);
}

/// Forward the service's status and body unchanged
fn relay(route: &str, reply: ServiceReply) -> Response {
    if reply.is_success() {
        debug!("{} -> {}", route, reply.status);
    } else {
        warn!("{} -> service replied {}", route, reply.status);
    }
    (reply.status, Json(reply.body)).into_response()
}

/// Application errors
#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    Multipart(MultipartError),
    Upstream(String),
    Internal(String),
}

impl From<vizrec_core::Error> for AppError {
    fn from(err: vizrec_core::Error) -> Self {
        if err.is_transport() {
            AppError::Upstream(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Multipart(err)
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg, "invalid_request_error")
            }
            AppError::Multipart(err) => (err.status(), err.body_text(), "invalid_request_error"),
            AppError::Upstream(msg) => {
                error!("Recognition service unreachable: {}", msg);
                (StatusCode::BAD_GATEWAY, msg, "upstream_error")
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg, "internal_error")
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
