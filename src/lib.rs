use argon2::Params;
use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;

// Routing split by access level (Public, Authenticated).
pub mod routes;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use auth::{Authenticator, CredentialError, CredentialStore, Principal};
pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// The generated OpenAPI document, served at `/api-docs/openapi.json` and
/// browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_advertisement, handlers::list_advertisements,
        handlers::get_advertisement, handlers::delete_advertisement,
        handlers::update_advertisement,
    ),
    components(
        schemas(
            models::Advertisement, models::CreateAdvertisementRequest,
            models::UpdateAdvertisementRequest,
        )
    ),
    modifiers(&BasicAuthScheme),
    tags(
        (name = "classified-ads", description = "Classified Advertisements API")
    )
)]
struct ApiDoc;

/// Registers the `basic_auth` security scheme referenced by the mutating paths.
struct BasicAuthScheme;

impl Modify for BasicAuthScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "basic_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Basic)),
            );
        }
    }
}

/// AppState
///
/// The single shared container handed to every handler: the advertisement
/// store, the authenticator and the immutable configuration. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Advertisement persistence (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Credential verification for the authenticated routes.
    pub authenticator: Authenticator,
    /// The loaded environment configuration. `AppState::new` empties `users`.
    pub config: AppConfig,
}

impl AppState {
    /// Builds the state from a loaded configuration.
    ///
    /// `config.users` is moved out and hashed into the credential store, so the
    /// plaintext secrets never reach the shared state.
    pub fn new(
        repo: RepositoryState,
        mut config: AppConfig,
        params: Params,
    ) -> Result<Self, CredentialError> {
        let users = std::mem::take(&mut config.users);
        let store = CredentialStore::from_spec(&users, params)?;
        drop(users);

        if store.is_empty() {
            tracing::warn!("No users configured; every mutating request will be rejected");
        } else {
            tracing::info!("Loaded {} user credential(s)", store.len());
        }

        Ok(Self {
            repo,
            authenticator: Authenticator::new(store, config.realm.clone()),
            config,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for Authenticator {
    fn from_ref(app_state: &AppState) -> Authenticator {
        app_state.authenticator.clone()
    }
}

/// require_principal
///
/// Route layer for `authenticated_routes`. Verifies the Basic credentials once,
/// stores the resulting `Principal` in the request extensions and only then
/// lets the request reach the handler. On failure the handler never runs and
/// the client receives 401 with a `WWW-Authenticate` challenge.
async fn require_principal(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticator.authenticate(request.headers()).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the routing table, applies the auth layer to the mutating routes
/// and wraps everything in the request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_principal,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with method, URI and `x-request-id`, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
