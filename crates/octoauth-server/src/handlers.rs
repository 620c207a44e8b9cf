use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use octoauth_core::{AccessGrant, OAuthState};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

pub async fn healthz(State(state): State<OAuthState>) -> Response {
    match state.server.sessions().count().await {
        Ok(sessions) => Json(json!({ "status": "ok", "sessions": sessions })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

/// Context derived from the caller's access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub session_id: Uuid,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub scopes: BTreeSet<String>,
    pub expires_in: u64,
}

/// `GET /api/me`, mounted behind the bearer filter.
pub async fn me(Extension(grant): Extension<AccessGrant>) -> Json<MeResponse> {
    let expires_in = grant.expires_in(OffsetDateTime::now_utc());
    Json(MeResponse {
        session_id: grant.session_id,
        client_id: grant.client_id,
        owner_id: grant.owner_id,
        scopes: grant.scopes,
        expires_in,
    })
}
