//! On-demand expiry sweep.
//!
//! Mount behind an [`OAuthFilter`](crate::middleware::OAuthFilter) that
//! requires the maintenance scope.

use axum::{Json, extract::State};

use super::OAuthState;
use crate::error::AuthError;
use crate::sweeper::SweepReport;

/// `POST /oauth/maintenance/sweep`
pub async fn sweep_handler(
    State(state): State<OAuthState>,
) -> Result<Json<SweepReport>, AuthError> {
    let report = state.sweeper.sweep().await?;
    tracing::info!(removed = report.sessions_removed, "Manual expiry sweep completed");
    Ok(Json(report))
}
