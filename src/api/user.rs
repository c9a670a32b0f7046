use axum::Router;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use serde::Deserialize;
use tower_sessions::Session;
use utoipa::ToSchema;

use crate::api;
use crate::error::Error;
use crate::ids::{CourseId, LessonId};
use crate::principal::Principal;
use crate::{AppState, cart, course, enrollment, progress, rating, user};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/register",
    method(post),
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    api::respond(user::register(&state.db, &req.name, &req.email, &req.password).await)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/login",
    method(post),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Response {
    let result = async {
        let (user_id, role) = user::login(&state.db, &req.email, &req.password).await?;
        let principal = Principal { user_id, role };
        principal.persist(&session).await?;
        user::get_user(&state.db, user_id).await
    }
    .await;
    api::respond(result)
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/logout",
    method(post),
    responses((status = 200, description = "Session cleared"))
)]
pub async fn logout(session: Session) -> Response {
    match session.flush().await {
        Ok(()) => api::ok("logged out"),
        Err(e) => api::fail(Error::Session(e.to_string())),
    }
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/me",
    method(get),
    responses(
        (status = 200, description = "Profile of the logged-in user"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn me(State(state): State<AppState>, session: Session) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(user::get_user(&state.db, principal.user_id).await)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/me",
    method(put),
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Profile updated"))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UpdateProfileRequest>,
) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(user::update_profile(&state.db, principal.user_id, &req.name).await)
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/courses",
    method(get),
    responses((status = 200, description = "Enrolled courses with completion percentages"))
)]
pub async fn my_courses(State(state): State<AppState>, session: Session) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(progress::enrolled_with_progress(&state.db, principal.user_id).await)
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/progress",
    method(get),
    responses((status = 200, description = "Completed / in-progress counts and average percentage"))
)]
pub async fn overall_progress(State(state): State<AppState>, session: Session) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(progress::overall_progress(&state.db, principal.user_id).await)
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/courses/{course_id}/lessons/{lesson_id}/complete",
    method(post),
    params(
        ("course_id" = i64, Path, description = "Course id"),
        ("lesson_id" = i64, Path, description = "Lesson id")
    ),
    responses(
        (status = 200, description = "Updated progress record (idempotent)"),
        (status = 403, description = "Not enrolled in this course")
    )
)]
pub async fn complete_lesson(
    State(state): State<AppState>,
    session: Session,
    Path((course_id, lesson_id)): Path<(CourseId, LessonId)>,
) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    let result = async {
        if !enrollment::is_enrolled(&state.db, principal.user_id, course_id).await? {
            return Err(Error::NotEnrolled);
        }
        let total = course::lesson_count(&state.db, course_id).await?;
        progress::mark_lesson_complete(&state.db, principal.user_id, course_id, lesson_id, total)
            .await
    }
    .await;
    api::respond(result)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartAddRequest {
    pub course_id: CourseId,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/cart",
    method(get),
    responses((status = 200, description = "Current cart contents"))
)]
pub async fn list_cart(State(state): State<AppState>, session: Session) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(cart::list_cart(&state.db, principal.user_id).await)
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/cart",
    method(post),
    request_body = CartAddRequest,
    responses(
        (status = 200, description = "Course added (no-op when already carted)"),
        (status = 409, description = "Already enrolled in this course")
    )
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CartAddRequest>,
) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    let result = async {
        cart::add_to_cart(&state.db, principal.user_id, req.course_id).await?;
        cart::list_cart(&state.db, principal.user_id).await
    }
    .await;
    api::respond(result)
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/cart/{course_id}",
    method(delete),
    params(("course_id" = i64, Path, description = "Course id")),
    responses((status = 200, description = "Course removed from the cart"))
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    let result = async {
        cart::remove_from_cart(&state.db, principal.user_id, course_id).await?;
        cart::list_cart(&state.db, principal.user_id).await
    }
    .await;
    api::respond(result)
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/cart/checkout",
    method(post),
    responses(
        (status = 200, description = "Per-item checkout outcomes"),
        (status = 400, description = "Cart is empty")
    )
)]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(cart::checkout(&state.db, principal.user_id).await)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RateRequest {
    pub value: i64,
    #[serde(default)]
    pub review: Option<String>,
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/courses/{course_id}/rating",
    method(put),
    params(("course_id" = i64, Path, description = "Course id")),
    request_body = RateRequest,
    responses(
        (status = 200, description = "Rating stored, aggregate recomputed"),
        (status = 400, description = "Value outside 1..=5"),
        (status = 403, description = "Not enrolled in this course")
    )
)]
pub async fn rate_course(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
    Json(req): Json<RateRequest>,
) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(
        rating::upsert_rating(&state.db, principal.user_id, course_id, req.value, req.review).await,
    )
}

#[utoipa::path(
    context_path = "/api/user",
    path = "/courses/{course_id}/rating",
    method(delete),
    params(("course_id" = i64, Path, description = "Course id")),
    responses((status = 200, description = "Rating removed, aggregate recomputed"))
)]
pub async fn delete_rating(
    State(state): State<AppState>,
    session: Session,
    Path(course_id): Path<CourseId>,
) -> Response {
    let principal = match Principal::from_session(&session).await {
        Ok(p) => p,
        Err(e) => return api::fail(e),
    };
    api::respond(rating::delete_rating(&state.db, principal.user_id, course_id).await)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me).put(update_profile))
        .route("/courses", get(my_courses))
        .route("/progress", get(overall_progress))
        .route(
            "/courses/{course_id}/lessons/{lesson_id}/complete",
            post(complete_lesson),
        )
        .route("/cart", get(list_cart).post(add_to_cart))
        .route("/cart/checkout", post(checkout))
        .route("/cart/{course_id}", delete(remove_from_cart))
        .route(
            "/courses/{course_id}/rating",
            put(rate_course).delete(delete_rating),
        )
}
