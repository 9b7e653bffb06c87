use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use reunite_core::access::{self, AddParticipant, NewInvitation};
use reunite_core::chatroom;
use reunite_types::api::{Claims, CreateInvitationRequest, DirectAddRequest};

use crate::AppState;
use crate::error::ApiResult;
use crate::routes::blocking;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chatroom-requests", get(list_requests))
        .route("/chatroom-requests/{id}/accept", post(accept))
        .route("/chatroom-requests/{id}/reject", post(reject))
        .route("/admin/chatrooms/invite", post(invite))
        .route("/admin/chatrooms/add", post(direct_add))
        .route("/admin/chatrooms/{id}/requests", get(list_room_requests))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    conversation_id: Option<Uuid>,
}

/// The invitee's own history by default; staff may instead filter by the
/// parent conversation to see an invitation's fate.
async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views = blocking(move || match query.conversation_id {
        Some(conversation_id) if actor.is_staff => {
            access::list_requests_for_conversation(&state.db, &actor, conversation_id)
        }
        _ => access::list_my_requests(&state.db, &actor),
    })
    .await?;
    Ok(Json(views))
}

async fn list_room_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let views =
        blocking(move || access::list_requests_for_chatroom(&state.db, &actor, id)).await?;
    Ok(Json(views))
}

async fn invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateInvitationRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        let request = access::create_invitation(
            &state.db,
            &state.dispatcher,
            &actor,
            NewInvitation {
                user_id: req.user_id,
                chatroom_id: req.chatroom_id,
                pet_unique_id: req.pet_unique_id,
                pet_kind: req.pet_kind,
                pet_name: req.pet_name,
                conversation_id: req.conversation_id,
                role: req.role,
            },
        )?;
        access::request_view(&state.db, &request)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn direct_add(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DirectAddRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let body = blocking(move || {
        let (room, participant) = access::direct_add(
            &state.db,
            &state.dispatcher,
            &actor,
            AddParticipant {
                user_id: req.user_id,
                chatroom_id: req.chatroom_id,
                pet_unique_id: req.pet_unique_id,
                pet_kind: req.pet_kind,
                pet_name: req.pet_name,
                conversation_id: req.conversation_id,
                role: req.role,
            },
        )?;
        Ok(serde_json::json!({
            "chatroom": chatroom::chatroom_view(room),
            "participant_id": participant.id,
            "role": participant.role,
        }))
    })
    .await?;
    Ok((StatusCode::CREATED, Json(body)))
}

async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        let request = access::accept_request(&state.db, &state.dispatcher, &actor, id)?;
        access::request_view(&state.db, &request)
    })
    .await?;
    Ok(Json(view))
}

async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.actor();
    let view = blocking(move || {
        let request = access::reject_request(&state.db, &state.dispatcher, &actor, id)?;
        access::request_view(&state.db, &request)
    })
    .await?;
    Ok(Json(view))
}
