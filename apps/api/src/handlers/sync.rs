use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use rolebridge_application::ReconciliationReport;
use rolebridge_domain::ExternalUserId;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub external_user_id: String,
}

/// POST /api/internal/sync - Reconcile one user's group memberships.
pub async fn sync_user_handler(
    State(state): State<AppState>,
    Json(payload): Json<SyncRequest>,
) -> ApiResult<Json<ReconciliationReport>> {
    let external_user_id = ExternalUserId::new(payload.external_user_id)?;
    let report = state
        .reconciliation_service
        .reconcile(&external_user_id)
        .await?;

    Ok(Json(report))
}
