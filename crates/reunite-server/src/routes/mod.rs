pub mod chatrooms;
pub mod conversations;
pub mod gateway;
pub mod notifications;
pub mod requests;

use axum::Json;

use reunite_core::CoreError;

use crate::error::ApiError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run a synchronous engine call off the async runtime. rusqlite is
/// blocking; every handler goes through here.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!("spawn_blocking join error: {e}");
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}
