mod error;
mod history;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use common::db::AsyncDb;
use common::store;
use common::types::{PaymentKind, User};
use error::ApiError;
use insight::activity;
use insight::ai::{CompletionRequest, InsightModel, ScalewayClient};
use insight::narrative;
use insight::persona::generate_persona;
use insight::prompts;
use insight::session::InsightSession;

pub struct AppState {
    pub db: AsyncDb,
    pub model: Arc<dyn InsightModel>,
    pub chunk_timeout: Duration,
}

/// Authenticated user, inserted by the auth middleware.
#[derive(Clone)]
struct AuthedUser(User);

// --- Auth middleware ---

/// Resolves the bearer token against the sessions table. Everything
/// behind this layer sees a valid, unexpired user; nothing downstream
/// runs for anonymous requests.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    let Some(token) = token else {
        return ApiError::Unauthenticated.into_response();
    };

    let now = chrono::Utc::now();
    let user = state
        .db
        .call_named("user_for_session", move |conn| {
            store::user_for_session(conn, &token, now)
        })
        .await;
    match user {
        Ok(Some(user)) => {
            request.extensions_mut().insert(AuthedUser(user));
            next.run(request).await
        }
        Ok(None) => ApiError::Unauthenticated.into_response(),
        Err(e) => error::internal(&e).into_response(),
    }
}

// --- Handlers ---

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// POST /api/ai/analyze — stream a personalized financial analysis.
///
/// The upstream stream is established before the response is built, so
/// a pre-stream refusal still reaches the client as a 500 envelope.
/// Once chunks flow the status line is committed; a later failure ends
/// the body with the partial text and the cause is logged.
async fn analyze(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
) -> Result<Response, ApiError> {
    let snapshot = activity::aggregate_activity(&state.db, &user.id, activity::DEFAULT_WINDOW_DAYS)
        .await
        .map_err(|e| error::internal(&e))?;
    let context = narrative::build_context(&user, &snapshot.wallets, &snapshot.aggregate);
    let request = CompletionRequest {
        system: prompts::FINANCIAL_ANALYSIS_SYSTEM_PROMPT.to_string(),
        prompt: prompts::analysis_prompt(user.display_first_name(), &context),
    };

    let mut session = InsightSession::with_chunk_timeout(state.chunk_timeout);
    let stream = session
        .open(state.model.as_ref(), &request)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %user.id, "analysis request refused upstream");
            ApiError::Analysis
        })?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        // A closed channel means the client went away; returning false
        // from publish cancels the session cooperatively.
        let outcome = session
            .consume(stream, &cancel, |chunk, _buffer| {
                tx.send(chunk.to_string()).is_ok()
            })
            .await;
        if let Err(e) = outcome {
            tracing::error!(
                error = %e,
                partial_chars = session.text().chars().count(),
                "analysis stream failed"
            );
        }
    });

    let body = Body::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    }));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to build streaming response");
            ApiError::Internal
        })?;
    Ok(response)
}

/// POST /api/ai/persona — one schema-validated persona, no streaming.
async fn persona(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = activity::aggregate_activity(&state.db, &user.id, activity::DEFAULT_WINDOW_DAYS)
        .await
        .map_err(|e| error::internal(&e))?;
    let context = narrative::condensed_context(&user, &snapshot.aggregate);
    let persona = generate_persona(state.model.as_ref(), &context)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %user.id, "persona generation failed");
            ApiError::PersonaGeneration
        })?;
    Ok(Json(serde_json::json!({
        "success": true,
        "persona": persona,
    })))
}

#[derive(Deserialize)]
struct HistoryParams {
    page: Option<u32>,
    limit: Option<u32>,
    #[serde(rename = "type")]
    kind: Option<String>,
    status: Option<String>,
}

/// GET /api/payments/history — unified deposits/cashouts view.
async fn payment_history(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(20);
    if page == 0 {
        return Err(ApiError::InvalidParam("page"));
    }
    if limit == 0 {
        return Err(ApiError::InvalidParam("limit"));
    }
    if (page - 1).checked_mul(limit).is_none() {
        return Err(ApiError::InvalidParam("page"));
    }
    let kind = match params.kind.as_deref() {
        None => None,
        Some(raw) => Some(PaymentKind::parse(raw).ok_or(ApiError::InvalidParam("type"))?),
    };

    let view = history::fetch_history(
        &state.db,
        &user.id,
        kind,
        params.status.as_deref(),
        page,
        limit,
    )
    .await
    .map_err(|e| error::internal(&e))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "payments": view.payments,
        "pagination": view.pagination,
    })))
}

// --- Router ---

pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/ai/analyze", post(analyze))
        .route("/api/ai/persona", post(persona))
        .route("/api/payments/history", get(payment_history))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;
    let dispatch = common::observability::build_dispatch(&config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch)?;

    let db = AsyncDb::open(&config.database.path).await?;
    let model: Arc<dyn InsightModel> = Arc::new(ScalewayClient::new(&config.ai)?);
    let state = Arc::new(AppState {
        db,
        model,
        chunk_timeout: Duration::from_secs(config.ai.chunk_timeout_secs),
    });

    let web_port = config.web.as_ref().map_or(8080, |w| w.port);
    let web_host = config
        .web
        .as_ref()
        .map_or("0.0.0.0".to_string(), |w| w.host.clone());

    let app = create_router(state);
    let addr: SocketAddr = format!("{web_host}:{web_port}").parse()?;
    tracing::info!("insight API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
