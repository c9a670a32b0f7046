use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::info;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open (creating if missing) the SQLite database and apply the schema.
pub async fn connect(path: impl AsRef<Path>) -> anyhow::Result<SqlitePool> {
    let path = path.as_ref();
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    apply_schema(&pool).await?;
    info!("database ready at {}", path.display());
    Ok(pool)
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::course::{Category, Language, Level, NewCourse};
    use crate::ids::{CourseId, UserId};
    use crate::principal::{Principal, Role};
    use crate::{course, user};

    /// In-memory database for tests. A single connection keeps the
    /// `:memory:` database alive for the life of the pool.
    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        super::apply_schema(&pool).await.unwrap();
        pool
    }

    pub async fn seed_student(pool: &SqlitePool, email: &str) -> UserId {
        user::register(pool, "Test Student", email, "hunter2hunter2")
            .await
            .unwrap()
    }

    pub async fn seed_instructor(pool: &SqlitePool, email: &str) -> Principal {
        let user_id = user::register(pool, "Test Instructor", email, "hunter2hunter2")
            .await
            .unwrap();
        user::set_role(pool, user_id, Role::Instructor).await.unwrap();
        Principal {
            user_id,
            role: Role::Instructor,
        }
    }

    /// Published course with the given number of lessons, authored by a
    /// fresh instructor.
    pub async fn seed_course(pool: &SqlitePool, title: &str, lessons: usize) -> CourseId {
        let instructor = seed_instructor(pool, &format!("{}@instructors.test", slug(title))).await;
        let created = course::create_course(
            pool,
            instructor,
            NewCourse {
                title: title.to_string(),
                description: String::new(),
                price_cents: 4900,
                category: Category::Development,
                level: Level::Beginner,
                language: Language::English,
            },
        )
        .await
        .unwrap();
        for i in 0..lessons {
            course::add_lesson(pool, instructor, created.id, &format!("Lesson {}", i + 1), 10)
                .await
                .unwrap();
        }
        course::set_published(pool, instructor, created.id, true)
            .await
            .unwrap();
        created.id
    }

    fn slug(title: &str) -> String {
        course::slugify(title)
    }
}
