use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::course::Course;
use crate::error::{Error, Result};
use crate::ids::{CourseId, UserId};
use crate::utils::now_utc;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: CourseId,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
}

/// At-most-once enrollment. The membership check catches the common case;
/// the UNIQUE constraint catches the race, so the loser of two concurrent
/// attempts gets `AlreadyEnrolled` instead of a double write. The course
/// counter moves in the same transaction as the enrollment row.
pub async fn enroll(database: &SqlitePool, user_id: UserId, course_id: CourseId) -> Result<Enrollment> {
    let mut tx = database.begin().await?;
    let enrollment = enroll_tx(&mut tx, user_id, course_id).await?;
    tx.commit().await?;
    info!("user {user_id} enrolled in course {course_id}");
    Ok(enrollment)
}

pub(crate) async fn enroll_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    course_id: CourseId,
) -> Result<Enrollment> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound("course"));
    }
    if is_enrolled_conn(&mut *conn, user_id, course_id).await? {
        return Err(Error::AlreadyEnrolled);
    }
    let enrolled_at = now_utc();
    insert_enrollment(&mut *conn, user_id, course_id, enrolled_at).await?;
    sqlx::query("UPDATE course SET enrollments = enrollments + 1 WHERE id = ?")
        .bind(course_id)
        .execute(&mut *conn)
        .await?;
    Ok(Enrollment {
        user_id,
        course_id,
        enrolled_at,
    })
}

/// The insert itself, with the UNIQUE constraint standing in for the
/// membership check a racing writer may have passed before we committed.
pub(crate) async fn insert_enrollment(
    conn: &mut SqliteConnection,
    user_id: UserId,
    course_id: CourseId,
    enrolled_at: OffsetDateTime,
) -> Result<()> {
    let inserted =
        sqlx::query("INSERT INTO enrollment (user_id, course_id, enrolled_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(course_id)
            .bind(enrolled_at)
            .execute(conn)
            .await;
    match inserted {
        Ok(_) => Ok(()),
        Err(e) if Error::is_unique_violation(&e) => Err(Error::AlreadyEnrolled),
        Err(e) => Err(e.into()),
    }
}

pub async fn is_enrolled(database: &SqlitePool, user_id: UserId, course_id: CourseId) -> Result<bool> {
    let mut conn = database.acquire().await?;
    is_enrolled_conn(&mut conn, user_id, course_id).await
}

pub(crate) async fn is_enrolled_conn(
    conn: &mut SqliteConnection,
    user_id: UserId,
    course_id: CourseId,
) -> Result<bool> {
    let row: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM enrollment WHERE user_id = ? AND course_id = ?")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.is_some())
}

pub async fn enrolled_courses(database: &SqlitePool, user_id: UserId) -> Result<Vec<Course>> {
    Ok(sqlx::query_as(
        "SELECT c.id, c.title, c.slug, c.description, c.price_cents, c.category, c.level, \
         c.language, c.instructor_id, c.published, c.enrollments, c.rating_avg, \
         c.rating_count, c.created_at \
         FROM enrollment e JOIN course c ON c.id = e.course_id \
         WHERE e.user_id = ? ORDER BY e.enrolled_at, e.rowid",
    )
    .bind(user_id)
    .fetch_all(database)
    .await?)
}
