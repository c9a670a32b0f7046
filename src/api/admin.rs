use axum::Router;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::api;
use crate::error::Result;
use crate::ids::{CourseId, UserId};
use crate::principal::{Principal, Role};
use crate::{AppState, course, user};

async fn admin(session: &Session) -> Result<Principal> {
    Principal::from_session(session).await?.require(Role::Admin)
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/users",
    method(get),
    responses(
        (status = 200, description = "All registered users"),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn list_users(State(state): State<AppState>, session: Session) -> Response {
    if let Err(e) = admin(&session).await {
        return api::fail(e);
    }
    api::respond(user::list_users(&state.db).await)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/users/{user_id}/role",
    method(put),
    params(("user_id" = i64, Path, description = "User id")),
    request_body = SetRoleRequest,
    responses((status = 200, description = "Role updated"))
)]
pub async fn set_role(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<UserId>,
    Json(req): Json<SetRoleRequest>,
) -> Response {
    if let Err(e) = admin(&session).await {
        return api::fail(e);
    }
    let result = async {
        user::set_role(&state.db, user_id, req.role).await?;
        user::get_user(&state.db, user_id).await
    }
    .await;
    api::respond(result)
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/users/{user_id}",
    method(delete),
    params(("user_id" = i64, Path, description = "User id")),
    responses((status = 200, description = "Account removed"))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<UserId>,
) -> Response {
    if let Err(e) = admin(&session).await {
        return api::fail(e);
    }
    api::respond(user::delete_user(&state.db, user_id).await)
}

#[utoipa::path(
    context_path = "/api/admin",
    path = "/courses/{course_id}/unpublish",
    method(post),
    params(("course_id" = i64, Path, description = "Course id")),
    responses((status = 200, description = "Course hidden from the catalog"))
)]
pub async fn unpublish_course(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
) -> Response {
    let principal = match admin(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(course::set_published(&state.db, principal, course_id, false).await)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{user_id}", delete(delete_user))
        .route("/users/{user_id}/role", put(set_role))
        .route("/courses/{course_id}/unpublish", post(unpublish_course))
}
