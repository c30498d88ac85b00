//! HTTP surface for BuildConfig resources.
//!
//! Routes OpenShift `oapi/v1` paths to [`Translator`] operations.
//!
//! # Endpoints
//!
//! All resource paths live under `/oapi/v1/namespaces/{namespace}`.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/buildconfigs`, `/buildconfigs/` | List BuildConfigs |
//! | `GET` | `/buildconfigs/{name}` | Fetch one BuildConfig |
//! | `POST` | `/buildconfigs` | Create (`201`) |
//! | `POST`, `PUT` | `/buildconfigs/{name}` | Update (`200`) |
//! | `DELETE` | `/buildconfigs/{name}` | Delete (`200`, `{}`) |
//! | `GET` | `/builds`, `/builds/` | Always an empty `BuildList` |
//! | `GET` | `/templates`, `/templates/` | Always an empty `TemplateList` |
//! | `GET` | `/health` (top level) | Health check (returns version) |
//!
//! The `builds` and `templates` stubs exist because the console probes them
//! unconditionally.
//!
//! # Error Contract
//!
//! Every failure, including an undecodable request body, is answered with
//! `404 Not Found` and the error message as a `text/plain` body. When a job
//! write succeeds but its annotations cannot be stored, the success response
//! carries a `Warning: 199 jenkinshift "<message>"` header.
//!
//! # Request bodies
//!
//! JSON by default; XML when the `Content-Type` mentions `xml`.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{FromRequest, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::annotations::configmap::ConfigMapStore;
use crate::annotations::AnnotationOverlay;
use crate::config::Config;
use crate::error::TranslateError;
use crate::jenkins::JenkinsClient;
use crate::models::{BuildConfig, BuildConfigList, ResourceList};
use crate::translator::{Translator, WriteOutcome};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    translator: Arc<Translator>,
}

/// Starts the server against the configured Jenkins and Kubernetes API.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let jobs = JenkinsClient::new(&config.jenkins)?;
    let store = ConfigMapStore::new(&config.kubernetes)?;
    let translator = Translator::new(
        Arc::new(jobs),
        AnnotationOverlay::new(Arc::new(store)),
    );

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!(
        jenkins = %config.jenkins.url,
        annotations_namespace = %config.kubernetes.namespace,
        "jenkinshift listening on http://{}",
        config.server.bind
    );
    serve(listener, translator).await
}

/// Serves the API on an already-bound listener.
pub async fn serve(listener: TcpListener, translator: Translator) -> anyhow::Result<()> {
    axum::serve(listener, router(translator)).await?;
    Ok(())
}

/// Builds the application router.
pub fn router(translator: Translator) -> Router {
    let state = AppState {
        translator: Arc::new(translator),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::WARNING]);

    let resources = Router::new()
        .route(
            "/buildconfigs",
            get(handle_list_build_configs).post(handle_create_build_config),
        )
        .route("/buildconfigs/", get(handle_list_build_configs))
        .route(
            "/buildconfigs/{name}",
            get(handle_get_build_config)
                .post(handle_update_build_config)
                .put(handle_update_build_config)
                .delete(handle_delete_build_config),
        )
        .route("/builds", get(handle_list_builds))
        .route("/builds/", get(handle_list_builds))
        .route("/templates", get(handle_list_templates))
        .route("/templates/", get(handle_list_templates));

    Router::new()
        .nest("/oapi/v1/namespaces/{namespace}", resources)
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// Converts any translator failure into `404 text/plain`.
struct ApiError(TranslateError);

impl From<TranslateError> for ApiError {
    fn from(err: TranslateError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::info!(error = %self.0, "request failed");
        (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            self.0.to_string(),
        )
            .into_response()
    }
}

// ============ Request bodies ============

/// A request body decoded from JSON, or from XML when the content type says so.
struct Entity<T>(T);

impl<S, T> FromRequest<S> for Entity<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_xml = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("xml"))
            .unwrap_or(false);

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| TranslateError::Body(e.to_string()))?;

        let value = if is_xml {
            let text =
                std::str::from_utf8(&bytes).map_err(|e| TranslateError::Body(e.to_string()))?;
            quick_xml::de::from_str(text).map_err(|e| TranslateError::Body(e.to_string()))?
        } else {
            serde_json::from_slice(&bytes).map_err(|e| TranslateError::Body(e.to_string()))?
        };
        Ok(Entity(value))
    }
}

// ============ Write responses ============

/// Serializes a write result, attaching a `Warning` header when the
/// annotations could not be stored.
fn write_response(status: StatusCode, outcome: WriteOutcome) -> Response {
    let mut response = (status, Json(outcome.build_config)).into_response();
    if let Some(warning) = outcome.annotation_warning {
        let text: String = warning
            .chars()
            .map(|c| if c == '"' { '\'' } else { c })
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();
        if let Ok(value) = HeaderValue::from_str(&format!("199 jenkinshift \"{}\"", text)) {
            response.headers_mut().insert(header::WARNING, value);
        }
    }
    response
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ BuildConfigs ============

async fn handle_list_build_configs(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<BuildConfigList>, ApiError> {
    let items = state.translator.list(&namespace).await?;
    Ok(Json(ResourceList::new("BuildConfigList", items)))
}

async fn handle_get_build_config(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<BuildConfig>, ApiError> {
    Ok(Json(state.translator.get(&namespace, &name).await?))
}

async fn handle_create_build_config(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Entity(build_config): Entity<BuildConfig>,
) -> Result<Response, ApiError> {
    let outcome = state.translator.create(&namespace, build_config).await?;
    Ok(write_response(StatusCode::CREATED, outcome))
}

async fn handle_update_build_config(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Entity(build_config): Entity<BuildConfig>,
) -> Result<Response, ApiError> {
    let outcome = state
        .translator
        .update(&namespace, &name, build_config)
        .await?;
    Ok(write_response(StatusCode::OK, outcome))
}

async fn handle_delete_build_config(
    State(state): State<AppState>,
    Path((_namespace, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.translator.delete(&name).await?;
    Ok(Json(serde_json::json!({})))
}

// ============ Stubs ============

async fn handle_list_builds(Path(_namespace): Path<String>) -> Json<ResourceList<serde_json::Value>> {
    Json(ResourceList::new("BuildList", Vec::new()))
}

async fn handle_list_templates(
    Path(_namespace): Path<String>,
) -> Json<ResourceList<serde_json::Value>> {
    Json(ResourceList::new("TemplateList", Vec::new()))
}
