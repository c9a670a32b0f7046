use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::enrollment;
use crate::error::{Error, Result};
use crate::ids::{CourseId, UserId};
use crate::utils::now_utc;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Rating {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub value: i64,
    pub review: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One rating as shown on the public course page.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct CourseRating {
    pub user_name: String,
    pub value: i64,
    pub review: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Creates or overwrites the caller's rating for a course. Only enrolled
/// users may rate. The course aggregate is recomputed in the same
/// transaction, so callers never observe a stale mean.
pub async fn upsert_rating(
    database: &SqlitePool,
    user_id: UserId,
    course_id: CourseId,
    value: i64,
    review: Option<String>,
) -> Result<Rating> {
    if !(1..=5).contains(&value) {
        return Err(Error::InvalidRating);
    }
    let mut tx = database.begin().await?;
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound("course"));
    }
    if !enrollment::is_enrolled_conn(&mut tx, user_id, course_id).await? {
        return Err(Error::NotEnrolled);
    }
    let now = now_utc();
    sqlx::query(
        "INSERT INTO rating (user_id, course_id, value, review, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT (user_id, course_id) DO UPDATE SET \
         value = excluded.value, review = excluded.review, updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(value)
    .bind(&review)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    recompute_aggregate(&mut tx, course_id).await?;
    let rating = sqlx::query_as(
        "SELECT user_id, course_id, value, review, created_at, updated_at FROM rating \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(rating)
}

pub async fn delete_rating(database: &SqlitePool, user_id: UserId, course_id: CourseId) -> Result<()> {
    let mut tx = database.begin().await?;
    let done = sqlx::query("DELETE FROM rating WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::NotFound("rating"));
    }
    recompute_aggregate(&mut tx, course_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Rewrites the course aggregate from the current rating rows. Idempotent,
/// safe to retry. Also used when account deletion cascades rating rows
/// away.
pub(crate) async fn recompute_aggregate(conn: &mut SqliteConnection, course_id: CourseId) -> Result<()> {
    sqlx::query(
        "UPDATE course SET \
         rating_avg = COALESCE((SELECT AVG(value) FROM rating WHERE course_id = ?), 0), \
         rating_count = (SELECT COUNT(*) FROM rating WHERE course_id = ?) \
         WHERE id = ?",
    )
    .bind(course_id)
    .bind(course_id)
    .bind(course_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn course_ratings(database: &SqlitePool, course_id: CourseId) -> Result<Vec<CourseRating>> {
    Ok(sqlx::query_as(
        "SELECT u.name AS user_name, r.value, r.review, r.updated_at \
         FROM rating r JOIN user u ON u.id = r.user_id \
         WHERE r.course_id = ? ORDER BY r.updated_at DESC, r.rowid DESC",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::course;
    use crate::store::test_support::{memory_pool, seed_course, seed_student};

    async fn enrolled_student(pool: &SqlitePool, email: &str, course_id: CourseId) -> UserId {
        let user = seed_student(pool, email).await;
        enrollment::enroll(pool, user, course_id).await.unwrap();
        user
    }

    #[tokio::test]
    async fn mean_of_five_and_three_then_delete_three() {
        let pool = memory_pool().await;
        let course_id = seed_course(&pool, "Rated", 1).await;
        let alice = enrolled_student(&pool, "alice@example.com", course_id).await;
        let bob = enrolled_student(&pool, "bob@example.com", course_id).await;

        upsert_rating(&pool, alice, course_id, 5, None).await.unwrap();
        upsert_rating(&pool, bob, course_id, 3, Some("fine".to_string()))
            .await
            .unwrap();
        let course = course::get_course(&pool, course_id).await.unwrap();
        assert!((course.rating_avg - 4.0).abs() < f64::EPSILON);
        assert_eq!(course.rating_count, 2);

        delete_rating(&pool, bob, course_id).await.unwrap();
        let course = course::get_course(&pool, course_id).await.unwrap();
        assert!((course.rating_avg - 5.0).abs() < f64::EPSILON);
        assert_eq!(course.rating_count, 1);
    }

    #[tokio::test]
    async fn out_of_range_values_are_invalid() {
        let pool = memory_pool().await;
        let course_id = seed_course(&pool, "Rated", 1).await;
        let user = enrolled_student(&pool, "s@example.com", course_id).await;
        for bad in [0, 6, -1] {
            assert!(matches!(
                upsert_rating(&pool, user, course_id, bad, None).await,
                Err(Error::InvalidRating)
            ));
        }
    }

    #[tokio::test]
    async fn only_enrolled_users_may_rate() {
        let pool = memory_pool().await;
        let course_id = seed_course(&pool, "Rated", 1).await;
        let outsider = seed_student(&pool, "outsider@example.com").await;
        assert!(matches!(
            upsert_rating(&pool, outsider, course_id, 4, None).await,
            Err(Error::NotEnrolled)
        ));
        let course = course::get_course(&pool, course_id).await.unwrap();
        assert_eq!(course.rating_count, 0);
    }

    #[tokio::test]
    async fn upsert_overwrites_in_place() {
        let pool = memory_pool().await;
        let course_id = seed_course(&pool, "Rated", 1).await;
        let user = enrolled_student(&pool, "s@example.com", course_id).await;

        upsert_rating(&pool, user, course_id, 2, Some("meh".to_string()))
            .await
            .unwrap();
        let updated = upsert_rating(&pool, user, course_id, 5, Some("grew on me".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.value, 5);
        assert_eq!(updated.review.as_deref(), Some("grew on me"));

        let course = course::get_course(&pool, course_id).await.unwrap();
        assert!((course.rating_avg - 5.0).abs() < f64::EPSILON);
        assert_eq!(course.rating_count, 1);
    }

    #[tokio::test]
    async fn deleting_a_missing_rating_is_not_found() {
        let pool = memory_pool().await;
        let course_id = seed_course(&pool, "Rated", 1).await;
        let user = enrolled_student(&pool, "s@example.com", course_id).await;
        assert!(matches!(
            delete_rating(&pool, user, course_id).await,
            Err(Error::NotFound("rating"))
        ));
    }

    /// Random upsert/delete sequences must keep the stored aggregate equal
    /// to the mean of a model kept in the test.
    #[tokio::test]
    async fn aggregate_converges_to_model_mean_under_random_ops() {
        let pool = memory_pool().await;
        let course_id = seed_course(&pool, "Fuzzed", 1).await;
        let mut users = Vec::new();
        for i in 0..4 {
            users.push(enrolled_student(&pool, &format!("u{i}@example.com"), course_id).await);
        }

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut model: HashMap<UserId, i64> = HashMap::new();
        for _ in 0..60 {
            let user = users[rng.gen_range(0..users.len())];
            if rng.gen_bool(0.3) && model.contains_key(&user) {
                delete_rating(&pool, user, course_id).await.unwrap();
                model.remove(&user);
            } else {
                let value = rng.gen_range(1..=5);
                upsert_rating(&pool, user, course_id, value, None).await.unwrap();
                model.insert(user, value);
            }

            let course = course::get_course(&pool, course_id).await.unwrap();
            assert_eq!(course.rating_count, model.len() as i64);
            let expected = if model.is_empty() {
                0.0
            } else {
                model.values().sum::<i64>() as f64 / model.len() as f64
            };
            assert!(
                (course.rating_avg - expected).abs() < 1e-9,
                "aggregate {} diverged from model mean {expected}",
                course.rating_avg
            );
        }
    }
}
