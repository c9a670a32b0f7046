use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;

use crate::api;
use crate::course::{self, CourseFilter};
use crate::rating;
use crate::{AppState, error::Error};

#[utoipa::path(
    context_path = "/api/public",
    path = "/courses",
    method(get),
    params(
        ("category" = Option<String>, Query, description = "Category filter"),
        ("level" = Option<String>, Query, description = "Level filter"),
        ("language" = Option<String>, Query, description = "Language filter"),
        ("q" = Option<String>, Query, description = "Title substring filter")
    ),
    responses(
        (status = 200, description = "Published courses matching the filters")
    )
)]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(filter): Query<CourseFilter>,
) -> Response {
    api::respond(course::list_courses(&state.db, &filter).await)
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/courses/{slug}",
    method(get),
    params(("slug" = String, Path, description = "Course slug")),
    responses(
        (status = 200, description = "Course detail with its lessons"),
        (status = 404, description = "No published course with this slug")
    )
)]
pub async fn get_course(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let result = async {
        let course = course::get_published_by_slug(&state.db, &slug).await?;
        let lessons = course::list_lessons(&state.db, course.id).await?;
        Ok::<_, Error>(CourseDetail { course, lessons })
    }
    .await;
    api::respond(result)
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct CourseDetail {
    pub course: course::Course,
    pub lessons: Vec<course::Lesson>,
}

#[utoipa::path(
    context_path = "/api/public",
    path = "/courses/{slug}/ratings",
    method(get),
    params(("slug" = String, Path, description = "Course slug")),
    responses(
        (status = 200, description = "Ratings with reviewer names, newest first"),
        (status = 404, description = "No published course with this slug")
    )
)]
pub async fn course_ratings(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let result = async {
        let course = course::get_published_by_slug(&state.db, &slug).await?;
        rating::course_ratings(&state.db, course.id).await
    }
    .await;
    api::respond(result)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        .route("/courses/{slug}", get(get_course))
        .route("/courses/{slug}/ratings", get(course_ratings))
}
