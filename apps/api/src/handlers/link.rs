use axum::extract::{Query, State};
use axum::response::{Html, Redirect};
use serde::Deserialize;

use rolebridge_application::{LinkCompletion, ReconciliationReport};
use rolebridge_core::AppError;
use rolebridge_domain::{EmailAddress, ExternalUserId};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BeginLinkParams {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// GET /auth/link - Send the user to the provider consent screen.
pub async fn begin_link_handler(
    State(state): State<AppState>,
    Query(params): Query<BeginLinkParams>,
) -> ApiResult<Redirect> {
    let external_user_id = ExternalUserId::new(params.user)?;
    let consent_url = state.linking_service.begin_link(&external_user_id).await?;

    Ok(Redirect::temporary(&consent_url))
}

/// GET /auth/google/callback - Finish the link and apply group policy.
pub async fn google_callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Html<String>> {
    if let Some(error) = params.error {
        return Err(AppError::Unauthorized(format!("consent was not granted: {error}")).into());
    }

    let state_token = params
        .state
        .ok_or_else(|| AppError::Validation("missing 'state' query parameter".to_owned()))?;
    let code = params
        .code
        .ok_or_else(|| AppError::Validation("missing 'code' query parameter".to_owned()))?;

    let completion = state
        .linking_service
        .complete_link(&state_token, &code)
        .await?;
    let report = state
        .reconciliation_service
        .reconcile(&completion.external_user_id)
        .await?;

    Ok(Html(render_confirmation(&completion, &report)))
}

fn render_confirmation(completion: &LinkCompletion, report: &ReconciliationReport) -> String {
    let added = render_group_list(&report.added, "No groups were added.");
    let removed = render_group_list(&report.removed, "No groups were removed.");

    format!(
        "<!doctype html>\n\
         <html>\n\
         <head><title>Rolebridge</title></head>\n\
         <body>\n\
         <h1>Account linked</h1>\n\
         <p>Platform account <strong>{user}</strong> is now linked to <strong>{email}</strong>.</p>\n\
         <h2>Groups added</h2>\n{added}\n\
         <h2>Groups removed</h2>\n{removed}\n\
         <p>You can close this window.</p>\n\
         </body>\n\
         </html>\n",
        user = escape_html(completion.external_user_id.as_str()),
        email = escape_html(completion.directory_email.as_str()),
    )
}

fn render_group_list(groups: &[EmailAddress], empty_label: &str) -> String {
    if groups.is_empty() {
        return format!("<p>{empty_label}</p>");
    }

    let items = groups
        .iter()
        .map(|group| format!("<li>{}</li>", escape_html(group.as_str())))
        .collect::<Vec<_>>()
        .join("\n");

    format!("<ul>\n{items}\n</ul>")
}

fn escape_html(value: &str) -> String {
    value
        .chars()
        .fold(String::with_capacity(value.len()), |mut escaped, character| {
            match character {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                other => escaped.push(other),
            }
            escaped
        })
}
