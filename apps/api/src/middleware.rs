use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use rolebridge_core::AppError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Guards the internal sync route with the notifier's shared bearer secret.
pub async fn require_notifier_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    if presented.is_empty() || presented != state.notifier_shared_secret {
        return Err(AppError::Unauthorized("notifier authentication required".to_owned()).into());
    }

    Ok(next.run(request).await)
}
