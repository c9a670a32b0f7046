use axum::Router;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use axum::routing::{delete, get, patch, post};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::api;
use crate::course::{self, CourseUpdate, NewCourse};
use crate::error::Result;
use crate::ids::{CourseId, LessonId};
use crate::principal::{Principal, Role};
use crate::AppState;

/// All instructor routes require at least the instructor role; ownership
/// of the individual course is checked in the core.
async fn instructor(session: &Session) -> Result<Principal> {
    Principal::from_session(session).await?.require(Role::Instructor)
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses",
    method(get),
    responses((status = 200, description = "Courses authored by the caller"))
)]
pub async fn my_courses(State(state): State<AppState>, session: Session) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(course::list_by_instructor(&state.db, principal.user_id).await)
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses",
    method(post),
    request_body = NewCourse,
    responses(
        (status = 200, description = "Course created, unpublished"),
        (status = 400, description = "Invalid title or non-positive price")
    )
)]
pub async fn create_course(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewCourse>,
) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(course::create_course(&state.db, principal, req).await)
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses/{course_id}",
    method(patch),
    params(("course_id" = i64, Path, description = "Course id")),
    request_body = CourseUpdate,
    responses(
        (status = 200, description = "Course updated"),
        (status = 403, description = "Not the course owner")
    )
)]
pub async fn update_course(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
    Json(req): Json<CourseUpdate>,
) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(course::update_course(&state.db, principal, course_id, req).await)
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses/{course_id}",
    method(delete),
    params(("course_id" = i64, Path, description = "Course id")),
    responses((status = 200, description = "Course deleted with its lessons and ratings"))
)]
pub async fn delete_course(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(course::delete_course(&state.db, principal, course_id).await)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishRequest {
    pub published: bool,
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses/{course_id}/publish",
    method(post),
    params(("course_id" = i64, Path, description = "Course id")),
    request_body = PublishRequest,
    responses((status = 200, description = "Visibility updated"))
)]
pub async fn set_published(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
    Json(req): Json<PublishRequest>,
) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(course::set_published(&state.db, principal, course_id, req.published).await)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewLessonRequest {
    pub title: String,
    #[serde(default)]
    pub duration_minutes: i64,
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses/{course_id}/lessons",
    method(get),
    params(("course_id" = i64, Path, description = "Course id")),
    responses((status = 200, description = "Lessons in position order"))
)]
pub async fn list_lessons(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    let result = async {
        course::owned_course(&state.db, principal, course_id).await?;
        course::list_lessons(&state.db, course_id).await
    }
    .await;
    api::respond(result)
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses/{course_id}/lessons",
    method(post),
    params(("course_id" = i64, Path, description = "Course id")),
    request_body = NewLessonRequest,
    responses((status = 200, description = "Lesson appended at the end"))
)]
pub async fn add_lesson(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
    Json(req): Json<NewLessonRequest>,
) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(
        course::add_lesson(&state.db, principal, course_id, &req.title, req.duration_minutes).await,
    )
}

#[utoipa::path(
    context_path = "/api/instructor",
    path = "/courses/{course_id}/lessons/{lesson_id}",
    method(delete),
    params(
        ("course_id" = i64, Path, description = "Course id"),
        ("lesson_id" = i64, Path, description = "Lesson id")
    ),
    responses((status = 200, description = "Lesson removed; completion marks drop with it"))
)]
pub async fn remove_lesson(
    State(state): State<AppState>,
    session: Session,
    Path((course_id, lesson_id)): Path<(CourseId, LessonId)>,
) -> Response {
    let principal = match instructor(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(course::remove_lesson(&state.db, principal, course_id, lesson_id).await)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(my_courses).post(create_course))
        .route(
            "/courses/{course_id}",
            patch(update_course).delete(delete_course),
        )
        .route("/courses/{course_id}/publish", post(set_published))
        .route(
            "/courses/{course_id}/lessons",
            get(list_lessons).post(add_lesson),
        )
        .route(
            "/courses/{course_id}/lessons/{lesson_id}",
            delete(remove_lesson),
        )
}
