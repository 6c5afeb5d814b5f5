//! HTTP surface for fragrun
//!
//! Maps the function registry, the requirements list and the run trigger onto
//! JSON endpoints. Handlers are thin: validation and execution live in
//! `fragrun_core`, and every failure is converted into one JSON error body by
//! [`ServerError`].

pub mod error;

pub use error::{Result, ServerError};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use fragrun_core::config::ServerSettings;
use fragrun_core::{Fragment, RegistryStore, Runner};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub sandbox: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            enable_cors: true,
            cors_origins: None,
            max_body_size: 1024 * 1024, // 1MB
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `server` section of the service configuration.
    pub fn from_settings(settings: &ServerSettings) -> Result<Self> {
        let mut config = Self::new()
            .with_bind_addr_str(&settings.bind_addr)?
            .with_cors(settings.enable_cors)
            .with_max_body_size(settings.max_body_size);
        if let Some(origins) = &settings.cors_origins {
            config = config.with_cors_origins(origins.clone());
        }
        Ok(config)
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(self, addr: &str) -> Result<Self> {
        let addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self.with_bind_addr(addr))
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub runner: Runner,
}

impl AppState {
    fn store(&self) -> &dyn RegistryStore {
        self.runner.store().as_ref()
    }
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Requirement {
    pub package_name: String,
}

fn success(message: impl Into<String>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": message.into()
    }))
}

/// Handler for POST/PUT /functions/
async fn upsert_function_handler(
    State(state): State<AppState>,
    Json(function): Json<Fragment>,
) -> Result<Json<Value>> {
    let name = function.name.clone();
    let outcome = state.store().upsert_fragment(function).await?;
    log::info!("Function {} {}", name, outcome.as_str());
    Ok(success(format!(
        "Function {} {} successfully.",
        name,
        outcome.as_str()
    )))
}

/// Handler for POST /functions/bulk/
async fn bulk_functions_handler(
    State(state): State<AppState>,
    Json(functions): Json<Vec<Fragment>>,
) -> Result<Json<Value>> {
    let count = functions.len();
    state.store().upsert_fragments(functions).await?;
    log::info!("Upserted {} functions", count);
    Ok(success("Functions updated successfully."))
}

/// Handler for GET /functions/?name=
async fn get_function_handler(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<Fragment>> {
    state
        .store()
        .get_fragment(&query.name)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::not_found("Function not found"))
}

async fn lookup_functions(state: &AppState, names: Vec<String>) -> Result<Json<Vec<Fragment>>> {
    let found = state.store().get_fragments(&names).await?;
    if found.is_empty() {
        return Err(ServerError::not_found("One or more functions not found"));
    }
    Ok(Json(found))
}

/// Handler for GET and POST /functions/multiple/
///
/// Names come from `names` query parameters, repeated or comma-separated,
/// and from an optional JSON array body.
async fn multiple_functions_handler(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<Vec<Fragment>>> {
    let mut names = names_from_query(&params);
    if !body.iter().all(u8::is_ascii_whitespace) {
        let listed: Vec<String> = serde_json::from_slice(&body).map_err(|e| {
            ServerError::InvalidInput(format!("expected a JSON array of function names: {}", e))
        })?;
        names.extend(listed);
    }
    lookup_functions(&state, names).await
}

fn names_from_query(params: &[(String, String)]) -> Vec<String> {
    params
        .iter()
        .filter(|(key, _)| key == "names")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Handler for GET /requirements/
async fn list_requirements_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let packages = state.store().list_dependencies().await?;
    Ok(Json(json!({ "packages": packages })))
}

/// Handler for POST /requirements/add/
async fn add_requirement_handler(
    State(state): State<AppState>,
    Json(requirement): Json<Requirement>,
) -> Result<Json<Value>> {
    if state.store().add_dependency(&requirement.package_name).await? {
        Ok(success(format!(
            "Package {} added successfully.",
            requirement.package_name
        )))
    } else {
        Ok(Json(json!({
            "status": "error",
            "message": "Package already in list."
        })))
    }
}

/// Handler for POST /requirements/bulk/
async fn bulk_requirements_handler(
    State(state): State<AppState>,
    Json(requirements): Json<Vec<Requirement>>,
) -> Result<Json<Value>> {
    let packages = requirements.into_iter().map(|r| r.package_name).collect();
    state.store().add_dependencies(packages).await?;
    Ok(success("Packages updated successfully."))
}

/// Handler for POST /requirements/remove/
async fn remove_requirement_handler(
    State(state): State<AppState>,
    Json(requirement): Json<Requirement>,
) -> Result<Json<Value>> {
    if state.store().remove_dependency(&requirement.package_name).await? {
        Ok(success(format!(
            "Package {} removed successfully.",
            requirement.package_name
        )))
    } else {
        Ok(Json(json!({
            "status": "error",
            "message": "Package not found in list."
        })))
    }
}

/// Handler for POST /requirements/install/
async fn install_requirements_handler(State(state): State<AppState>) -> Json<Value> {
    let report = state.runner.install_dependencies().await;
    Json(json!({
        "status": if report.succeeded { "success" } else { "error" },
        "message": report.message
    }))
}

/// Handler for POST /run-main/
async fn run_main_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    let result = state.runner.run_main().await?;
    if !result.succeeded() {
        return Err(ServerError::RunFailed {
            status: result.status,
            detail: result.output,
        });
    }
    Ok(Json(json!({
        "status": "success",
        "output": result.output
    })))
}

pub struct FragrunServer {
    runner: Runner,
    config: ServerConfig,
}

impl FragrunServer {
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(runner: Runner, config: ServerConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            runner: self.runner.clone(),
        };
        let sandbox = self.runner.sandbox_name().to_string();

        let mut router = Router::new()
            .route(
                "/health",
                get(move || {
                    let sandbox = sandbox.clone();
                    async move {
                        Json(HealthResponse {
                            status: "healthy".to_string(),
                            timestamp: chrono::Utc::now(),
                            version: env!("CARGO_PKG_VERSION").to_string(),
                            sandbox,
                        })
                    }
                }),
            )
            // Function registry
            .route(
                "/functions/",
                get(get_function_handler)
                    .post(upsert_function_handler)
                    .put(upsert_function_handler),
            )
            .route("/functions/bulk/", post(bulk_functions_handler))
            .route(
                "/functions/multiple/",
                get(multiple_functions_handler).post(multiple_functions_handler),
            )
            // Requirements
            .route("/requirements/", get(list_requirements_handler))
            .route("/requirements/add/", post(add_requirement_handler))
            .route("/requirements/bulk/", post(bulk_requirements_handler))
            .route("/requirements/remove/", post(remove_requirement_handler))
            .route("/requirements/install/", post(install_requirements_handler))
            // Execution
            .route("/run-main/", post(run_main_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async move {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();
                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    log::info!(
                        "Response {} {} in {:?}",
                        request_id,
                        response.status(),
                        start.elapsed()
                    );
                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: std::result::Result<Vec<axum::http::HeaderValue>, _> =
                    origins.iter().map(|s| s.parse()).collect();
                match origins {
                    Ok(origins) => CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods(Any)
                        .allow_headers(Any),
                    Err(e) => {
                        log::warn!("Invalid CORS origin ({}), allowing any origin", e);
                        CorsLayer::permissive()
                    }
                }
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server with graceful shutdown support.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "fragrun server listening on {} ({} sandbox, timeout {}s)",
            self.config.bind_addr,
            self.runner.sandbox_name(),
            self.runner.timeout().as_secs()
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("fragrun server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
