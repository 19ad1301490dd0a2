// src/handlers/admin.rs
use crate::auth::AdminToken;
use crate::models::{AppendResponse, ErrorBody, PresenceRecord, PresenceUpdate};
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use std::sync::Arc;
use validator::Validate;

type BadRequest = (StatusCode, Json<ErrorBody>);

fn bad_request(message: String) -> BadRequest {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message }))
}

/// Flatten validator output into one message naming the offending fields.
fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let detail = errs
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| "is invalid".to_string());
            format!("{} {}", field, detail)
        })
        .collect();
    parts.sort();
    format!("invalid field(s): {}", parts.join(", "))
}

pub async fn update_presence(
    State(state): State<Arc<AppState>>,
    _admin: AdminToken,
    Json(body): Json<Value>,
) -> Result<Json<PresenceRecord>, BadRequest> {
    // Deserialize by hand so a missing/invalid field is a 400 with a
    // descriptive message rather than the framework's generic rejection
    let update: PresenceUpdate = serde_json::from_value(body)
        .map_err(|e| bad_request(format!("invalid body: {}", e)))?;
    update
        .validate()
        .map_err(|e| bad_request(validation_message(&e)))?;

    let record = state
        .presence()
        .update(update.state, update.message, update.ttl_seconds)
        .await;
    tracing::info!("presence updated: {}", record.state);
    Ok(Json(record))
}

pub async fn append_history(
    State(state): State<Arc<AppState>>,
    _admin: AdminToken,
    Json(body): Json<Value>,
) -> Result<Json<AppendResponse>, BadRequest> {
    let history = state.history();
    let appended = match body {
        Value::Array(entries) => {
            if entries.is_empty() {
                return Err(bad_request("entries array must not be empty".to_string()));
            }
            history.append_many(&entries).await
        }
        value @ Value::Object(_) => history.append(&value).await,
        _ => {
            return Err(bad_request(
                "body must be an entry object or an array of entries".to_string(),
            ))
        }
    };

    Ok(Json(AppendResponse { appended }))
}
