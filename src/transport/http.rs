//! Streamable HTTP transport: a single tool-call endpoint plus health check,
//! under the same rate-limit/auth/trace/CORS layering the teacher's API
//! server uses (spec.md §6 "streamable HTTP").

use crate::auth::{auth_middleware, create_auth_state};
use crate::config::Config;
use crate::error::{MarcusError, Result};
use crate::rate_limit::{rate_limit_middleware, RateLimitState};
use crate::transport::tools::{self, AppState};
use axum::{
    extract::{Path, State},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

const SERVICE_NAME: &str = "marcus-core";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
struct HttpState {
    tools: AppState,
}

pub struct ApiServer {
    config: Config,
    state: HttpState,
}

impl ApiServer {
    pub fn new(config: Config, tools: AppState) -> Self {
        Self {
            config,
            state: HttpState { tools },
        }
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.build_router();
        let listener = tokio::net::TcpListener::bind(format!(
            "{}:{}",
            self.config.transport.host, self.config.transport.port
        ))
        .await
        .map_err(MarcusError::Io)?;

        info!(
            host = %self.config.transport.host,
            port = self.config.transport.port,
            "marcus HTTP transport listening"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .map_err(|e| MarcusError::Transport(e.to_string()))?;

        Ok(())
    }

    /// Order matters: rate limit rejects before auth does any key comparison
    /// work, auth runs before the request reaches a handler.
    pub fn build_router(&self) -> Router {
        let auth_state = create_auth_state(self.config.transport.clone());
        let rate_limit_state = Arc::new(RateLimitState::new());

        Router::new()
            .route("/health", get(health_check))
            .route("/tools/{tool}", post(call_tool))
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(
                        rate_limit_state,
                        rate_limit_middleware,
                    ))
                    .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(self.state.clone())
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({"status": "healthy", "service": SERVICE_NAME, "version": SERVICE_VERSION}))
}

async fn call_tool(
    State(state): State<HttpState>,
    Path(tool): Path<String>,
    Json(params): Json<Value>,
) -> Json<Value> {
    Json(tools::dispatch(&state.tools, &tool, params).await)
}
