// crates/outbound-harness-server/src/server.rs
// ============================================================================
// Module: Replay Server
// Description: axum HTTP surface over the replay router.
// Purpose: Serve the interactive fixture replay pages.
// Dependencies: axum, tokio, tracing
// ============================================================================

//! ## Overview
//! Routes: `GET /`, `GET|POST /{category}/{integration}` and
//! `GET|POST /{category}/{integration}/{fixture}`. Anything else is 404.
//! Pages are HTML by default; clients sending `Accept: application/json`
//! receive the render context itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Form;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::ACCEPT;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;
use tracing::warn;

use crate::render::BasicHtmlRenderer;
use crate::render::PageRenderer;
use crate::router::RenderContext;
use crate::router::ReplayError;
use crate::router::ReplayRouter;
use crate::router::RouteTarget;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Interactive replay server.
pub struct ReplayServer {
    /// Shared handler state.
    state: Arc<ServerState>,
}

/// Shared state for handlers.
struct ServerState {
    /// Replay router.
    router: ReplayRouter,
    /// Page renderer.
    renderer: Arc<dyn PageRenderer>,
}

impl ReplayServer {
    /// Creates a server with the basic HTML renderer.
    #[must_use]
    pub fn new(router: ReplayRouter) -> Self {
        Self::with_renderer(router, Arc::new(BasicHtmlRenderer))
    }

    /// Creates a server with a custom renderer.
    #[must_use]
    pub fn with_renderer(router: ReplayRouter, renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            state: Arc::new(ServerState {
                router,
                renderer,
            }),
        }
    }

    /// Builds the axum application.
    pub fn app(&self) -> Router {
        Router::new()
            .route("/", get(handle_index))
            .route("/{category}/{integration}", get(handle_show).post(handle_submit))
            .route("/{category}/{integration}/{fixture}", get(handle_show_fixture).post(handle_submit_fixture))
            .fallback(handle_not_found)
            .with_state(Arc::clone(&self.state))
    }

    /// Binds `addr` and serves until the process stops.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Bind(format!("{addr}: {err}")))?;
        self.serve_listener(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when serving fails.
    pub async fn serve_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener.local_addr().map_err(|err| ServerError::Bind(err.to_string()))?;
        info!(
            module = self.state.router.module_name(),
            url = %format!("http://{local}"),
            "replay server started"
        );
        axum::serve(listener, self.app()).await.map_err(|err| ServerError::Serve(err.to_string()))
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /`.
async fn handle_index(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let context = state.router.summary();
    respond(&state, &headers, &context, true)
}

/// `GET /{category}/{integration}`.
async fn handle_show(
    State(state): State<Arc<ServerState>>,
    Path((category, integration)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    show(&state, &headers, RouteTarget::from_segments(&category, &integration, None))
}

/// `GET /{category}/{integration}/{fixture}`.
async fn handle_show_fixture(
    State(state): State<Arc<ServerState>>,
    Path((category, integration, fixture)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    show(&state, &headers, RouteTarget::from_segments(&category, &integration, Some(&fixture)))
}

/// `POST /{category}/{integration}`.
async fn handle_submit(
    State(state): State<Arc<ServerState>>,
    Path((category, integration)): Path<(String, String)>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    submit(&state, &headers, RouteTarget::from_segments(&category, &integration, None), form).await
}

/// `POST /{category}/{integration}/{fixture}`.
async fn handle_submit_fixture(
    State(state): State<Arc<ServerState>>,
    Path((category, integration, fixture)): Path<(String, String, String)>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    submit(&state, &headers, RouteTarget::from_segments(&category, &integration, Some(&fixture)), form).await
}

/// Fallback for unmatched routes.
async fn handle_not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Shared GET path.
fn show(state: &ServerState, headers: &HeaderMap, target: Option<RouteTarget>) -> Response {
    let Some(target) = target else {
        return handle_error(&ReplayError::NotFound("route".to_string()));
    };
    match state.router.show(&target) {
        Ok(context) => respond(state, headers, &context, false),
        Err(err) => handle_error(&err),
    }
}

/// Shared POST path.
async fn submit(
    state: &ServerState,
    headers: &HeaderMap,
    target: Option<RouteTarget>,
    form: Vec<(String, String)>,
) -> Response {
    let Some(target) = target else {
        return handle_error(&ReplayError::NotFound("route".to_string()));
    };
    match state.router.submit(&target, form).await {
        Ok(context) => respond(state, headers, &context, false),
        Err(err) => handle_error(&err),
    }
}

/// Renders a context as HTML or JSON depending on `Accept`.
fn respond(state: &ServerState, headers: &HeaderMap, context: &RenderContext, index: bool) -> Response {
    let wants_json = headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));
    if wants_json {
        return Json(context).into_response();
    }
    let page = if index { state.renderer.render_index(context) } else { state.renderer.render_method(context) };
    Html(page).into_response()
}

/// Maps replay errors to status codes.
fn handle_error(err: &ReplayError) -> Response {
    let status = match err {
        ReplayError::NotFound(_) => StatusCode::NOT_FOUND,
        ReplayError::Fixture(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ReplayError::InvalidForm(_) => StatusCode::BAD_REQUEST,
    };
    warn!(status = status.as_u16(), error = %err, "replay request failed");
    (status, err.to_string()).into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Replay server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("bind error: {0}")]
    Bind(String),
    /// Serving failed.
    #[error("serve error: {0}")]
    Serve(String),
}
