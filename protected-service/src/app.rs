use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Json, Router};
use idp_auth::{require_auth, AuthContext, Claims, Guard};
use serde_json::Value;
use tower_http::trace::TraceLayer;

async fn health() -> &'static str {
    "ok"
}

async fn me(auth: AuthContext) -> Json<Claims> {
    Json(auth.into_claims())
}

async fn claim(auth: AuthContext, Path(name): Path<String>) -> Result<Json<Value>, StatusCode> {
    auth.claims
        .claim(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// `/healthz` is open; everything under `/api` passes through `guard` first.
pub fn build_router<G>(guard: Arc<G>) -> Router
where
    G: Guard + 'static,
{
    let protected = Router::new()
        .route("/api/me", get(me))
        .route("/api/claims/:name", get(claim))
        .route_layer(middleware::from_fn_with_state(guard, require_auth::<G>));

    Router::new()
        .route("/healthz", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
}
