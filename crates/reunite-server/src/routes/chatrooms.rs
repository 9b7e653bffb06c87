use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use reunite_core::chatroom;
use reunite_types::api::{Claims, SendMessageRequest};

use crate::AppState;
use crate::error::ApiResult;
use crate::routes::blocking;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chatrooms", get(list_chatrooms))
        .route("/chatrooms/{id}", delete(delete_chatroom))
        .route("/chatrooms/{id}/participants", get(list_participants))
        .route(
            "/chatrooms/{id}/participants/{user_id}",
            delete(remove_participant),
        )
        .route(
            "/chatrooms/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route(
            "/chatrooms/{id}/messages/{message_id}",
            delete(delete_message_for_everyone),
        )
        .route(
            "/chatrooms/{id}/messages/{message_id}/delete-for-me",
            post(delete_message_for_me),
        )
        .route("/admin/chatrooms/{id}/messages", delete(clear_messages))
}

async fn list_chatrooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views = blocking(move || chatroom::list_chatrooms(&state.db, &actor)).await?;
    Ok(Json(views))
}

async fn list_participants(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views = blocking(move || chatroom::list_participants(&state.db, &actor, id)).await?;
    Ok(Json(views))
}

async fn remove_participant(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    blocking(move || {
        chatroom::remove_participant(&state.db, &state.dispatcher, &actor, id, user_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views = blocking(move || chatroom::list_messages(&state.db, &actor, id)).await?;
    Ok(Json(views))
}

async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view =
        blocking(move || chatroom::post_message(&state.db, &state.dispatcher, &actor, id, req))
            .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn delete_message_for_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view =
        blocking(move || chatroom::delete_message_for_me(&state.db, &actor, id, message_id))
            .await?;
    Ok(Json(view))
}

async fn delete_message_for_everyone(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view =
        blocking(move || chatroom::delete_message_for_everyone(&state.db, &actor, id, message_id))
            .await?;
    Ok(Json(view))
}

async fn delete_chatroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    blocking(move || chatroom::delete_chatroom(&state.db, &actor, id)).await?;
    Ok(Json(serde_json::json!({ "chatroom_id": id })))
}

async fn clear_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let deleted = blocking(move || chatroom::clear_messages(&state.db, &actor, id)).await?;
    Ok(Json(serde_json::json!({
        "chatroom_id": id,
        "deleted_count": deleted,
    })))
}
