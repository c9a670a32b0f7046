use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use utoipa::ToSchema;

use crate::course::Course;
use crate::error::{Error, Result};
use crate::ids::{CourseId, LessonId, UserId};
use crate::utils::now_utc;

/// Completion state for one (user, course) pair. The percentage is always
/// derived from the completed set and the lesson total, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProgressRecord {
    pub course_id: CourseId,
    pub completed_lessons: Vec<LessonId>,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OverallProgress {
    pub completed_courses: i64,
    pub in_progress_courses: i64,
    /// Mean completion percentage across all enrolled courses, 0 when
    /// there are none.
    pub average_percentage: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnrolledCourse {
    pub course: Course,
    pub percentage: u8,
}

pub fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Marks a lesson as completed. Re-marking a completed lesson is an
/// idempotent no-op that returns the record unchanged.
pub async fn mark_lesson_complete(
    database: &SqlitePool,
    user_id: UserId,
    course_id: CourseId,
    lesson_id: LessonId,
    total_lessons: i64,
) -> Result<ProgressRecord> {
    let mut tx = database.begin().await?;
    let owner: Option<CourseId> = sqlx::query_scalar("SELECT course_id FROM lesson WHERE id = ?")
        .bind(lesson_id)
        .fetch_optional(&mut *tx)
        .await?;
    if owner != Some(course_id) {
        return Err(Error::NotFound("lesson"));
    }
    init_progress_tx(&mut tx, user_id, course_id).await?;
    sqlx::query(
        "INSERT OR IGNORE INTO progress_lesson (user_id, course_id, lesson_id, completed_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(lesson_id)
    .bind(now_utc())
    .execute(&mut *tx)
    .await?;
    let completed = completed_lessons_conn(&mut tx, user_id, course_id).await?;
    tx.commit().await?;
    Ok(record(course_id, completed, total_lessons))
}

/// Creates the empty progress record if it does not exist yet. Used at
/// checkout and implicitly by the first lesson completion.
pub(crate) async fn init_progress_tx(
    conn: &mut SqliteConnection,
    user_id: UserId,
    course_id: CourseId,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO progress (user_id, course_id, started_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(course_id)
        .bind(now_utc())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn course_progress(
    database: &SqlitePool,
    user_id: UserId,
    course_id: CourseId,
    total_lessons: i64,
) -> Result<ProgressRecord> {
    let mut conn = database.acquire().await?;
    let completed = completed_lessons_conn(&mut conn, user_id, course_id).await?;
    Ok(record(course_id, completed, total_lessons))
}

async fn completed_lessons_conn(
    conn: &mut SqliteConnection,
    user_id: UserId,
    course_id: CourseId,
) -> Result<Vec<LessonId>> {
    Ok(sqlx::query_scalar(
        "SELECT lesson_id FROM progress_lesson WHERE user_id = ? AND course_id = ? \
         ORDER BY completed_at, rowid",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(conn)
    .await?)
}

fn record(course_id: CourseId, completed: Vec<LessonId>, total_lessons: i64) -> ProgressRecord {
    let pct = percentage(completed.len(), usize::try_from(total_lessons).unwrap_or(0));
    ProgressRecord {
        course_id,
        completed_lessons: completed,
        percentage: pct,
    }
}

/// Dashboard aggregate over every enrolled course: completed at exactly
/// 100, in progress strictly between 0 and 100.
pub async fn overall_progress(database: &SqlitePool, user_id: UserId) -> Result<OverallProgress> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM lesson l WHERE l.course_id = e.course_id) AS total, \
         (SELECT COUNT(*) FROM progress_lesson pl \
          WHERE pl.user_id = e.user_id AND pl.course_id = e.course_id) AS done \
         FROM enrollment e WHERE e.user_id = ?",
    )
    .bind(user_id)
    .fetch_all(database)
    .await?;

    let mut completed_courses = 0;
    let mut in_progress_courses = 0;
    let mut pct_sum = 0.0;
    for (total, done) in &rows {
        let pct = percentage(
            usize::try_from(*done).unwrap_or(0),
            usize::try_from(*total).unwrap_or(0),
        );
        match pct {
            100 => completed_courses += 1,
            0 => {}
            _ => in_progress_courses += 1,
        }
        pct_sum += f64::from(pct);
    }
    let average_percentage = if rows.is_empty() {
        0.0
    } else {
        pct_sum / rows.len() as f64
    };
    Ok(OverallProgress {
        completed_courses,
        in_progress_courses,
        average_percentage,
    })
}

/// Enrolled courses with their completion percentage, for the student
/// dashboard.
pub async fn enrolled_with_progress(
    database: &SqlitePool,
    user_id: UserId,
) -> Result<Vec<EnrolledCourse>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        course: Course,
        total_lessons: i64,
        completed_lessons: i64,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT c.*, \
         (SELECT COUNT(*) FROM lesson l WHERE l.course_id = c.id) AS total_lessons, \
         (SELECT COUNT(*) FROM progress_lesson pl \
          WHERE pl.user_id = e.user_id AND pl.course_id = c.id) AS completed_lessons \
         FROM enrollment e JOIN course c ON c.id = e.course_id \
         WHERE e.user_id = ? ORDER BY e.enrolled_at, e.rowid",
    )
    .bind(user_id)
    .fetch_all(database)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let pct = percentage(
                usize::try_from(row.completed_lessons).unwrap_or(0),
                usize::try_from(row.total_lessons).unwrap_or(0),
            );
            EnrolledCourse {
                course: row.course,
                percentage: pct,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{memory_pool, seed_course, seed_student};
    use crate::{course, enrollment};

    #[test]
    fn percentage_rounds_and_clamps_zero_total() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(4, 4), 100);
    }

    #[tokio::test]
    async fn four_lesson_scenario_is_monotonic_and_idempotent() {
        let pool = memory_pool().await;
        let user = seed_student(&pool, "s@example.com").await;
        let course_id = seed_course(&pool, "Four Lessons", 4).await;
        enrollment::enroll(&pool, user, course_id).await.unwrap();
        let lessons = course::list_lessons(&pool, course_id).await.unwrap();
        let total = lessons.len() as i64;

        let first = mark_lesson_complete(&pool, user, course_id, lessons[0].id, total)
            .await
            .unwrap();
        assert_eq!(first.percentage, 25);

        // Marking the same lesson again changes nothing.
        let again = mark_lesson_complete(&pool, user, course_id, lessons[0].id, total)
            .await
            .unwrap();
        assert_eq!(again, first);

        let mut last = again.percentage;
        for lesson in &lessons[1..] {
            let rec = mark_lesson_complete(&pool, user, course_id, lesson.id, total)
                .await
                .unwrap();
            assert!(rec.percentage >= last);
            last = rec.percentage;
        }
        assert_eq!(last, 100);

        let overall = overall_progress(&pool, user).await.unwrap();
        assert_eq!(overall.completed_courses, 1);
        assert_eq!(overall.in_progress_courses, 0);
        assert!((overall.average_percentage - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn course_without_lessons_reports_zero_percent() {
        let pool = memory_pool().await;
        let user = seed_student(&pool, "s@example.com").await;
        let course_id = seed_course(&pool, "Empty Course", 0).await;
        let rec = course_progress(&pool, user, course_id, 0).await.unwrap();
        assert_eq!(rec.percentage, 0);
        assert!(rec.completed_lessons.is_empty());
    }

    #[tokio::test]
    async fn lesson_from_another_course_is_rejected() {
        let pool = memory_pool().await;
        let user = seed_student(&pool, "s@example.com").await;
        let course_a = seed_course(&pool, "Course A", 1).await;
        let course_b = seed_course(&pool, "Course B", 1).await;
        let foreign = course::list_lessons(&pool, course_b).await.unwrap()[0].id;
        assert!(matches!(
            mark_lesson_complete(&pool, user, course_a, foreign, 1).await,
            Err(Error::NotFound("lesson"))
        ));
    }

    #[tokio::test]
    async fn overall_progress_partitions_courses() {
        let pool = memory_pool().await;
        let user = seed_student(&pool, "s@example.com").await;
        let done = seed_course(&pool, "Done", 1).await;
        let half = seed_course(&pool, "Half", 2).await;
        let untouched = seed_course(&pool, "Untouched", 2).await;
        for id in [done, half, untouched] {
            enrollment::enroll(&pool, user, id).await.unwrap();
        }
        let done_lesson = course::list_lessons(&pool, done).await.unwrap()[0].id;
        mark_lesson_complete(&pool, user, done, done_lesson, 1).await.unwrap();
        let half_lesson = course::list_lessons(&pool, half).await.unwrap()[0].id;
        mark_lesson_complete(&pool, user, half, half_lesson, 2).await.unwrap();

        let overall = overall_progress(&pool, user).await.unwrap();
        assert_eq!(overall.completed_courses, 1);
        assert_eq!(overall.in_progress_courses, 1);
        assert!((overall.average_percentage - 50.0).abs() < f64::EPSILON);

        let dashboard = enrolled_with_progress(&pool, user).await.unwrap();
        assert_eq!(dashboard.len(), 3);
        assert_eq!(dashboard[0].percentage, 100);
        assert_eq!(dashboard[1].percentage, 50);
        assert_eq!(dashboard[2].percentage, 0);
    }
}
