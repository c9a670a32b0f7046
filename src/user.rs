use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::ids::{CourseId, UserId};
use crate::principal::Role;
use crate::rating;
use crate::utils::now_utc;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

pub async fn register(
    database: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
) -> Result<UserId> {
    if name.trim().is_empty() || email.trim().is_empty() {
        return Err(Error::InvalidInput("name and email must not be empty".to_string()));
    }
    if password.len() < 8 {
        return Err(Error::InvalidInput(
            "password must be at least 8 characters".to_string(),
        ));
    }
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::InvalidInput(format!("failed to hash password: {e}")))?
        .to_string();
    let result = sqlx::query(
        "INSERT INTO user (name, email, password, role, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(Role::Student)
    .bind(now_utc())
    .execute(database)
    .await;
    match result {
        Ok(done) => Ok(UserId::new(done.last_insert_rowid()).ok_or(Error::NotFound("user"))?),
        Err(e) if Error::is_unique_violation(&e) => Err(Error::AlreadyExists("email")),
        Err(e) => Err(e.into()),
    }
}

/// Verifies credentials and returns the identity to store in the session.
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(database: &SqlitePool, email: &str, password: &str) -> Result<(UserId, Role)> {
    let row: Option<(UserId, String, Role)> =
        sqlx::query_as("SELECT id, password, role FROM user WHERE email = ?")
            .bind(email)
            .fetch_optional(database)
            .await?;
    let Some((id, stored_hash, role)) = row else {
        return Err(Error::Unauthorized);
    };
    let parsed_hash = PasswordHash::new(&stored_hash).map_err(|_| Error::Unauthorized)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| Error::Unauthorized)?;
    Ok((id, role))
}

pub async fn get_user(database: &SqlitePool, id: UserId) -> Result<UserInfo> {
    sqlx::query_as("SELECT id, name, email, role FROM user WHERE id = ?")
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("user"))
}

pub async fn update_profile(database: &SqlitePool, id: UserId, name: &str) -> Result<UserInfo> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("name must not be empty".to_string()));
    }
    let done = sqlx::query("UPDATE user SET name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(database)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::NotFound("user"));
    }
    get_user(database, id).await
}

pub async fn list_users(database: &SqlitePool) -> Result<Vec<UserInfo>> {
    Ok(
        sqlx::query_as("SELECT id, name, email, role FROM user ORDER BY id")
            .fetch_all(database)
            .await?,
    )
}

pub async fn set_role(database: &SqlitePool, id: UserId, role: Role) -> Result<()> {
    let done = sqlx::query("UPDATE user SET role = ? WHERE id = ?")
        .bind(role)
        .bind(id)
        .execute(database)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::NotFound("user"));
    }
    Ok(())
}

/// Removes the account. Enrollments, progress, ratings and cart rows go
/// with it via foreign keys; the aggregates of the courses the user had
/// rated or joined are repaired in the same transaction, so the stored
/// mean and the enrollment counter never drift from the surviving rows.
pub async fn delete_user(database: &SqlitePool, id: UserId) -> Result<()> {
    let mut tx = database.begin().await?;
    let rated: Vec<CourseId> = sqlx::query_scalar("SELECT course_id FROM rating WHERE user_id = ?")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
    let enrolled: Vec<CourseId> =
        sqlx::query_scalar("SELECT course_id FROM enrollment WHERE user_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
    let done = sqlx::query("DELETE FROM user WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::NotFound("user"));
    }
    // The cascades have dropped the user's rows by now; courses the user
    // authored are gone too, for those the updates below hit nothing.
    for course_id in rated {
        rating::recompute_aggregate(&mut tx, course_id).await?;
    }
    for course_id in enrolled {
        sqlx::query("UPDATE course SET enrollments = enrollments - 1 WHERE id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{memory_pool, seed_course, seed_student};
    use crate::{course, enrollment};

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let pool = memory_pool().await;
        let id = register(&pool, "Ada", "ada@example.com", "correct horse")
            .await
            .unwrap();
        let (login_id, role) = login(&pool, "ada@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(login_id, id);
        assert_eq!(role, Role::Student);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_unauthorized() {
        let pool = memory_pool().await;
        register(&pool, "Ada", "ada@example.com", "correct horse")
            .await
            .unwrap();
        assert!(matches!(
            login(&pool, "ada@example.com", "wrong").await,
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            login(&pool, "nobody@example.com", "whatever").await,
            Err(Error::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let pool = memory_pool().await;
        register(&pool, "Ada", "ada@example.com", "correct horse")
            .await
            .unwrap();
        assert!(matches!(
            register(&pool, "Other", "ada@example.com", "different pass").await,
            Err(Error::AlreadyExists("email"))
        ));
    }

    #[tokio::test]
    async fn deleting_a_user_repairs_course_aggregates() {
        let pool = memory_pool().await;
        let course_id = seed_course(&pool, "Databases", 2).await;
        let alice = seed_student(&pool, "alice@example.com").await;
        let bob = seed_student(&pool, "bob@example.com").await;
        for (user, value) in [(alice, 5), (bob, 3)] {
            enrollment::enroll(&pool, user, course_id).await.unwrap();
            rating::upsert_rating(&pool, user, course_id, value, None)
                .await
                .unwrap();
        }

        delete_user(&pool, bob).await.unwrap();

        let course = course::get_course(&pool, course_id).await.unwrap();
        assert_eq!(course.rating_count, 1);
        assert_eq!(course.rating_avg, 5.0);
        assert_eq!(course.enrollments, 1);
        let ratings = rating::course_ratings(&pool, course_id).await.unwrap();
        assert_eq!(ratings.len(), 1);
    }

    #[tokio::test]
    async fn role_changes_are_visible() {
        let pool = memory_pool().await;
        let id = register(&pool, "Ada", "ada@example.com", "correct horse")
            .await
            .unwrap();
        set_role(&pool, id, Role::Instructor).await.unwrap();
        let info = get_user(&pool, id).await.unwrap();
        assert_eq!(info.role, Role::Instructor);
    }
}
