use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use reunite_core::conversation::{self, NewConversation};
use reunite_types::api::{
    Claims, CreateConversationRequest, SendMessageRequest, UpdateConversationStatusRequest,
};
use reunite_types::models::ConversationStatus;

use crate::AppState;
use crate::error::ApiResult;
use crate::routes::blocking;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/chat/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/chat/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/chat/conversations/{id}/confirm", post(confirm))
        .route(
            "/chat/conversations/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route(
            "/chat/conversations/{id}/messages/{message_id}",
            delete(delete_message_for_everyone),
        )
        .route(
            "/chat/conversations/{id}/messages/{message_id}/delete-for-me",
            post(delete_message_for_me),
        )
        .route("/admin/chat/conversations/{id}/accept", post(accept))
        .route("/admin/chat/conversations/{id}/close", post(close))
        .route("/admin/chat/conversations/{id}/status", patch(set_status))
        .route(
            "/admin/chat/conversations/{id}/messages",
            delete(clear_messages),
        )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<ConversationStatus>,
}

async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views = blocking(move || {
        conversation::list_conversations(&state.db, &actor, query.status)
    })
    .await?;
    Ok(Json(views))
}

async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        let convo = conversation::create_conversation(
            &state.db,
            &state.dispatcher,
            &actor,
            NewConversation {
                pet_kind: req.pet_kind,
                pet_unique_id: req.pet_unique_id,
                pet_name: req.pet_name,
                reason: req.reason,
            },
        )?;
        conversation::get_conversation_view(&state.db, &actor, convo.id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view =
        blocking(move || conversation::get_conversation_view(&state.db, &actor, id)).await?;
    Ok(Json(view))
}

async fn confirm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        conversation::confirm_conversation(&state.db, &state.dispatcher, &actor, id)?;
        conversation::get_conversation_view(&state.db, &actor, id)
    })
    .await?;
    Ok(Json(view))
}

async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        conversation::accept_conversation(&state.db, &state.dispatcher, &actor, id)?;
        conversation::get_conversation_view(&state.db, &actor, id)
    })
    .await?;
    Ok(Json(view))
}

async fn close(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        conversation::close_conversation(&state.db, &state.dispatcher, &actor, id)?;
        conversation::get_conversation_view(&state.db, &actor, id)
    })
    .await?;
    Ok(Json(view))
}

async fn set_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConversationStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        conversation::set_conversation_status(
            &state.db,
            &state.dispatcher,
            &actor,
            id,
            req.status,
        )?;
        conversation::get_conversation_view(&state.db, &actor, id)
    })
    .await?;
    Ok(Json(view))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    blocking(move || conversation::delete_conversation(&state.db, &actor, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views = blocking(move || conversation::list_messages(&state.db, &actor, id)).await?;
    Ok(Json(views))
}

async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        conversation::post_message(&state.db, &state.dispatcher, &actor, id, req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn delete_message_for_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        conversation::delete_message_for_me(&state.db, &actor, id, message_id)
    })
    .await?;
    Ok(Json(view))
}

async fn delete_message_for_everyone(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        conversation::delete_message_for_everyone(&state.db, &actor, id, message_id)
    })
    .await?;
    Ok(Json(view))
}

async fn clear_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let deleted = blocking(move || conversation::clear_messages(&state.db, &actor, id)).await?;
    Ok(Json(serde_json::json!({
        "conversation_id": id,
        "deleted_count": deleted,
    })))
}
