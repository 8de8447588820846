use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tracing::{info, warn};

use super::handlers::{handle_detect, handle_health, handle_root, AppState};
use super::middleware::trace_id_middleware;
use crate::config::Settings;
use crate::error::AppError;
use crate::helpers::build_pipeline;
use crate::pipeline::Pipeline;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/v1/detect", post(handle_detect))
        .with_state(state)
        .layer(middleware::from_fn(trace_id_middleware))
}

pub struct DetectionServer {
    pub port: u16,
    pub state: AppState,
}

impl DetectionServer {
    pub fn new(settings: Settings, pipeline: Pipeline) -> Self {
        Self {
            port: settings.port,
            state: AppState {
                settings: Arc::new(settings),
                pipeline: Arc::new(pipeline),
            },
        }
    }

    pub fn from_settings(settings: Settings) -> Result<Self, AppError> {
        let pipeline = build_pipeline(&settings)?;
        Ok(Self::new(settings, pipeline))
    }

    pub async fn start(&self) -> Result<(), AppError> {
        let app = build_router(self.state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!(%addr, app = %self.state.settings.app_name, "listening");
        axum::Server::try_bind(&addr)
            .map_err(|err| AppError::configuration(format!("cannot bind {}", addr), Some("APP_PORT")).with_source(err))?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| AppError::app("server error").with_source(err))
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            warn!(error = %err, "cannot listen for Ctrl-C, graceful shutdown disabled");
            std::future::pending::<()>().await
        }
    }
}
