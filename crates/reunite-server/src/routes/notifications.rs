use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use reunite_core::notify;
use reunite_types::api::Claims;

use crate::AppState;
use crate::error::ApiResult;
use crate::routes::blocking;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/notifications/read-all", post(mark_all_read))
}

async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views = blocking(move || notify::list_notifications(&state.db, &actor)).await?;
    Ok(Json(views))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    blocking(move || notify::mark_notification_read(&state.db, &actor, id)).await?;
    Ok(Json(serde_json::json!({ "id": id, "is_read": true })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let updated =
        blocking(move || notify::mark_all_notifications_read(&state.db, &actor)).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
