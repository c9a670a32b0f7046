use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::ids::{CourseId, LessonId, UserId};
use crate::principal::Principal;
use crate::utils::now_utc;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Category {
    Development,
    Business,
    Design,
    Marketing,
    Music,
    Photography,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
    AllLevels,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Portuguese,
    Chinese,
    Other,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price_cents: i64,
    pub category: Category,
    pub level: Level,
    pub language: Language,
    pub instructor_id: UserId,
    pub published: bool,
    /// Aggregate counter, incremented on every successful enrollment.
    pub enrollments: i64,
    /// Mean of all current ratings, 0.0 when there are none.
    pub rating_avg: f64,
    pub rating_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub category: Category,
    pub level: Level,
    pub language: Language,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<Category>,
    pub level: Option<Level>,
    pub language: Option<Language>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CourseFilter {
    pub category: Option<Category>,
    pub level: Option<Level>,
    pub language: Option<Language>,
    /// Substring match on the title.
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Lesson {
    pub id: LessonId,
    pub course_id: CourseId,
    pub position: i64,
    pub title: String,
    pub duration_minutes: i64,
}

const COURSE_COLS: &str = "id, title, slug, description, price_cents, category, level, \
     language, instructor_id, published, enrollments, rating_avg, rating_count, created_at";

/// Lowercase the title and collapse everything non-alphanumeric to single
/// hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

async fn unique_slug(database: &SqlitePool, base: &str) -> Result<String> {
    let mut slug = base.to_string();
    let mut n = 2;
    loop {
        let taken: Option<i64> = sqlx::query_scalar("SELECT 1 FROM course WHERE slug = ?")
            .bind(&slug)
            .fetch_optional(database)
            .await?;
        if taken.is_none() {
            return Ok(slug);
        }
        slug = format!("{base}-{n}");
        n += 1;
    }
}

fn validate_price(price_cents: i64) -> Result<()> {
    if price_cents <= 0 {
        return Err(Error::InvalidInput("price must be positive".to_string()));
    }
    Ok(())
}

pub async fn create_course(
    database: &SqlitePool,
    instructor: Principal,
    new: NewCourse,
) -> Result<Course> {
    validate_price(new.price_cents)?;
    let base = slugify(&new.title);
    if base.is_empty() {
        return Err(Error::InvalidInput(
            "title must contain alphanumeric characters".to_string(),
        ));
    }
    let slug = unique_slug(database, &base).await?;
    let result = sqlx::query(
        "INSERT INTO course (title, slug, description, price_cents, category, level, \
         language, instructor_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&new.title)
    .bind(&slug)
    .bind(&new.description)
    .bind(new.price_cents)
    .bind(new.category)
    .bind(new.level)
    .bind(new.language)
    .bind(instructor.user_id)
    .bind(now_utc())
    .execute(database)
    .await;
    let id = match result {
        Ok(done) => done.last_insert_rowid(),
        // A racing create picked the same slug between the uniqueness
        // check and the insert.
        Err(e) if Error::is_unique_violation(&e) => return Err(Error::AlreadyExists("course slug")),
        Err(e) => return Err(e.into()),
    };
    info!("course {slug} created by user {}", instructor.user_id);
    get_course(database, CourseId::new(id).ok_or(Error::NotFound("course"))?).await
}

pub async fn get_course(database: &SqlitePool, id: CourseId) -> Result<Course> {
    let sql = format!("SELECT {COURSE_COLS} FROM course WHERE id = ?");
    sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("course"))
}

/// Public lookup: only published courses are visible by slug.
pub async fn get_published_by_slug(database: &SqlitePool, slug: &str) -> Result<Course> {
    let sql = format!("SELECT {COURSE_COLS} FROM course WHERE slug = ? AND published = 1");
    sqlx::query_as(&sql)
        .bind(slug)
        .fetch_optional(database)
        .await?
        .ok_or(Error::NotFound("course"))
}

/// The course, or `Forbidden` when the principal is neither the owning
/// instructor nor an admin.
pub async fn owned_course(
    database: &SqlitePool,
    principal: Principal,
    id: CourseId,
) -> Result<Course> {
    let course = get_course(database, id).await?;
    if course.instructor_id != principal.user_id && !principal.is_admin() {
        return Err(Error::Forbidden("not the course owner"));
    }
    Ok(course)
}

/// Partial update by the owner or an admin. The slug stays stable when
/// the title changes so catalog links keep working.
pub async fn update_course(
    database: &SqlitePool,
    principal: Principal,
    id: CourseId,
    update: CourseUpdate,
) -> Result<Course> {
    let current = owned_course(database, principal, id).await?;
    let title = update.title.unwrap_or(current.title);
    if title.trim().is_empty() {
        return Err(Error::InvalidInput("title must not be empty".to_string()));
    }
    let description = update.description.unwrap_or(current.description);
    let price_cents = update.price_cents.unwrap_or(current.price_cents);
    validate_price(price_cents)?;
    let category = update.category.unwrap_or(current.category);
    let level = update.level.unwrap_or(current.level);
    let language = update.language.unwrap_or(current.language);
    sqlx::query(
        "UPDATE course SET title = ?, description = ?, price_cents = ?, category = ?, \
         level = ?, language = ? WHERE id = ?",
    )
    .bind(&title)
    .bind(&description)
    .bind(price_cents)
    .bind(category)
    .bind(level)
    .bind(language)
    .bind(id)
    .execute(database)
    .await?;
    get_course(database, id).await
}

pub async fn set_published(
    database: &SqlitePool,
    principal: Principal,
    id: CourseId,
    published: bool,
) -> Result<()> {
    owned_course(database, principal, id).await?;
    sqlx::query("UPDATE course SET published = ? WHERE id = ?")
        .bind(published)
        .bind(id)
        .execute(database)
        .await?;
    Ok(())
}

/// Deletes the course; lessons, enrollments, progress and ratings cascade.
/// Cart rows referencing it are left behind on purpose and reported as
/// failed at checkout.
pub async fn delete_course(database: &SqlitePool, principal: Principal, id: CourseId) -> Result<()> {
    owned_course(database, principal, id).await?;
    sqlx::query("DELETE FROM course WHERE id = ?")
        .bind(id)
        .execute(database)
        .await?;
    info!("course {id} deleted by user {}", principal.user_id);
    Ok(())
}

/// Published catalog, newest first, narrowed by the optional filters.
pub async fn list_courses(database: &SqlitePool, filter: &CourseFilter) -> Result<Vec<Course>> {
    let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {COURSE_COLS} FROM course WHERE published = 1"
    ));
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category);
    }
    if let Some(level) = filter.level {
        builder.push(" AND level = ").push_bind(level);
    }
    if let Some(language) = filter.language {
        builder.push(" AND language = ").push_bind(language);
    }
    if let Some(q) = &filter.q {
        builder
            .push(" AND title LIKE ")
            .push_bind(format!("%{q}%"));
    }
    builder.push(" ORDER BY created_at DESC");
    Ok(builder.build_query_as().fetch_all(database).await?)
}

pub async fn list_by_instructor(database: &SqlitePool, instructor: UserId) -> Result<Vec<Course>> {
    let sql = format!(
        "SELECT {COURSE_COLS} FROM course WHERE instructor_id = ? ORDER BY created_at DESC"
    );
    Ok(sqlx::query_as(&sql)
        .bind(instructor)
        .fetch_all(database)
        .await?)
}

pub async fn add_lesson(
    database: &SqlitePool,
    principal: Principal,
    course_id: CourseId,
    title: &str,
    duration_minutes: i64,
) -> Result<Lesson> {
    owned_course(database, principal, course_id).await?;
    if title.trim().is_empty() {
        return Err(Error::InvalidInput("lesson title must not be empty".to_string()));
    }
    if duration_minutes < 0 {
        return Err(Error::InvalidInput("duration must not be negative".to_string()));
    }
    let done = sqlx::query(
        "INSERT INTO lesson (course_id, position, title, duration_minutes) VALUES \
         (?, (SELECT COALESCE(MAX(position), 0) + 1 FROM lesson WHERE course_id = ?), ?, ?)",
    )
    .bind(course_id)
    .bind(course_id)
    .bind(title)
    .bind(duration_minutes)
    .execute(database)
    .await?;
    let id = LessonId::new(done.last_insert_rowid()).ok_or(Error::NotFound("lesson"))?;
    sqlx::query_as(
        "SELECT id, course_id, position, title, duration_minutes FROM lesson WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(database)
    .await?
    .ok_or(Error::NotFound("lesson"))
}

/// Removing a lesson also drops its completion marks via foreign keys, so
/// progress percentages stay consistent with the remaining lessons.
pub async fn remove_lesson(
    database: &SqlitePool,
    principal: Principal,
    course_id: CourseId,
    lesson_id: LessonId,
) -> Result<()> {
    owned_course(database, principal, course_id).await?;
    let done = sqlx::query("DELETE FROM lesson WHERE id = ? AND course_id = ?")
        .bind(lesson_id)
        .bind(course_id)
        .execute(database)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::NotFound("lesson"));
    }
    Ok(())
}

pub async fn list_lessons(database: &SqlitePool, course_id: CourseId) -> Result<Vec<Lesson>> {
    Ok(sqlx::query_as(
        "SELECT id, course_id, position, title, duration_minutes FROM lesson \
         WHERE course_id = ? ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?)
}

pub async fn lesson_count(database: &SqlitePool, course_id: CourseId) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM lesson WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(database)
            .await?,
    )
}
