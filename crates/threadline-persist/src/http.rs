use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{PersistError, Result};

/// Map a non-success response to a typed error
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => PersistError::Unauthorized(message),
        StatusCode::NOT_FOUND => PersistError::NotFound(message),
        _ => PersistError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| PersistError::Deserialization(e.to_string()))
}

/// Like [`decode`] but tolerates non-array bodies by returning an empty list
pub(crate) async fn decode_list<T: DeserializeOwned>(response: Response) -> Result<Vec<T>> {
    let response = check_status(response).await?;
    let body = response.text().await?;

    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| PersistError::Deserialization(e.to_string())))
            .collect(),
        Ok(other) => {
            tracing::warn!(body = %other, "Expected a JSON array, treating as empty");
            Ok(Vec::new())
        }
        Err(e) => Err(PersistError::Deserialization(e.to_string())),
    }
}

/// `detail` (FastAPI style) or `message` from an error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| match value.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
}
