use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::enrollment;
use crate::error::{Error, Result};
use crate::ids::{CourseId, UserId};
use crate::progress;
use crate::utils::now_utc;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct CartItem {
    pub course_id: CourseId,
    pub title: String,
    pub price_cents: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Enrolled,
    AlreadyEnrolled,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutOutcome {
    pub course_id: CourseId,
    pub status: CheckoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Adds a published course to the cart. Courses the user already owns are
/// rejected; re-adding a carted course is a no-op (the cart is a set).
pub async fn add_to_cart(database: &SqlitePool, user_id: UserId, course_id: CourseId) -> Result<()> {
    let published: Option<bool> = sqlx::query_scalar("SELECT published FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(database)
        .await?;
    if published != Some(true) {
        return Err(Error::NotFound("course"));
    }
    if enrollment::is_enrolled(database, user_id, course_id).await? {
        return Err(Error::AlreadyEnrolled);
    }
    sqlx::query("INSERT OR IGNORE INTO cart_item (user_id, course_id, added_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(course_id)
        .bind(now_utc())
        .execute(database)
        .await?;
    Ok(())
}

pub async fn remove_from_cart(
    database: &SqlitePool,
    user_id: UserId,
    course_id: CourseId,
) -> Result<()> {
    let done = sqlx::query("DELETE FROM cart_item WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(database)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::NotFound("cart item"));
    }
    Ok(())
}

/// Cart contents joined with the course for display. A carted course that
/// has since been deleted shows up with an empty title and is resolved at
/// checkout.
pub async fn list_cart(database: &SqlitePool, user_id: UserId) -> Result<Vec<CartItem>> {
    Ok(sqlx::query_as(
        "SELECT ci.course_id, COALESCE(c.title, '') AS title, \
         COALESCE(c.price_cents, 0) AS price_cents, ci.added_at \
         FROM cart_item ci LEFT JOIN course c ON c.id = ci.course_id \
         WHERE ci.user_id = ? ORDER BY ci.added_at, ci.rowid",
    )
    .bind(user_id)
    .fetch_all(database)
    .await?)
}

/// Turns the cart into enrollments. Each item runs in its own transaction:
/// the enrollment, the empty progress record and the cart-row removal
/// either all commit or all roll back, so a failing item (say, the course
/// was deleted after it was carted) stays in the cart while the rest go
/// through. An empty cart fails up front with no writes.
pub async fn checkout(database: &SqlitePool, user_id: UserId) -> Result<Vec<CheckoutOutcome>> {
    let items: Vec<CourseId> = sqlx::query_scalar(
        "SELECT course_id FROM cart_item WHERE user_id = ? ORDER BY added_at, rowid",
    )
    .bind(user_id)
    .fetch_all(database)
    .await?;
    if items.is_empty() {
        return Err(Error::EmptyCart);
    }

    let mut outcomes = Vec::with_capacity(items.len());
    for course_id in items {
        let mut tx = database.begin().await?;
        let status = match enrollment::enroll_tx(&mut tx, user_id, course_id).await {
            Ok(_) => {
                progress::init_progress_tx(&mut tx, user_id, course_id).await?;
                CheckoutStatus::Enrolled
            }
            // Stale cart row; drop it from the cart like a success.
            Err(Error::AlreadyEnrolled) => CheckoutStatus::AlreadyEnrolled,
            Err(e @ Error::NotFound(_)) => {
                warn!("checkout item {course_id} for user {user_id} failed: {e}");
                drop(tx);
                outcomes.push(CheckoutOutcome {
                    course_id,
                    status: CheckoutStatus::Failed,
                    message: Some(e.to_string()),
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        sqlx::query("DELETE FROM cart_item WHERE user_id = ? AND course_id = ?")
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        outcomes.push(CheckoutOutcome {
            course_id,
            status,
            message: None,
        });
    }
    info!(
        "checkout for user {user_id}: {} item(s), {} failed",
        outcomes.len(),
        outcomes
            .iter()
            .filter(|o| o.status == CheckoutStatus::Failed)
            .count()
    );
    Ok(outcomes)
}
