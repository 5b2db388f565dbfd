use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Submission, SubmissionPayload};
use crate::db::types::SubmissionStatus;

const COLUMNS: &str = "\
    id, course_id, assignment_id, task_id, user_id, status, payload, grade, feedback, \
    locked, submitted_at, graded_at, created_at, updated_at";

pub(crate) struct UpsertSubmission<'a> {
    pub id: &'a str,
    pub course_id: &'a str,
    pub assignment_id: &'a str,
    pub task_id: &'a str,
    pub user_id: &'a str,
    pub status: SubmissionStatus,
    pub payload: SubmissionPayload,
    pub grade: Option<f64>,
    pub graded_at: Option<PrimitiveDateTime>,
    pub now: PrimitiveDateTime,
}

/// One submission per task and student. A resubmission replaces the stored
/// payload unless the row is locked; `None` means the lock won.
pub(crate) async fn upsert(
    pool: &PgPool,
    params: UpsertSubmission<'_>,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions
            (id, course_id, assignment_id, task_id, user_id, status, payload, grade,
             feedback, locked, submitted_at, graded_at, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,NULL,FALSE,$9,$10,$9,$9)
         ON CONFLICT (task_id, user_id) DO UPDATE
         SET status = EXCLUDED.status,
             payload = EXCLUDED.payload,
             grade = EXCLUDED.grade,
             feedback = NULL,
             submitted_at = EXCLUDED.submitted_at,
             graded_at = EXCLUDED.graded_at,
             updated_at = EXCLUDED.updated_at
         WHERE submissions.locked = FALSE
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.assignment_id)
    .bind(params.task_id)
    .bind(params.user_id)
    .bind(params.status)
    .bind(Json(params.payload))
    .bind(params.grade)
    .bind(params.now)
    .bind(params.graded_at)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE course_id = $1 AND id = $2",
    ))
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_task_user(
    pool: &PgPool,
    course_id: &str,
    task_id: &str,
    user_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE course_id = $1 AND task_id = $2 AND user_id = $3",
    ))
    .bind(course_id)
    .bind(task_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_for_assignment_user(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
    user_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE course_id = $1 AND assignment_id = $2 AND user_id = $3
         ORDER BY created_at",
    ))
    .bind(course_id)
    .bind(assignment_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_for_assignment(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE course_id = $1 AND assignment_id = $2
         ORDER BY user_id, created_at",
    ))
    .bind(course_id)
    .bind(assignment_id)
    .fetch_all(pool)
    .await
}

/// Replaces the payload of an existing submission without touching its
/// status or grade. Used for file re-uploads after grading.
pub(crate) async fn update_payload(
    pool: &PgPool,
    course_id: &str,
    id: &str,
    payload: SubmissionPayload,
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET payload = $1, submitted_at = $2, updated_at = $2
         WHERE course_id = $3 AND id = $4 AND locked = FALSE
         RETURNING {COLUMNS}",
    ))
    .bind(Json(payload))
    .bind(now)
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn count_graded_for_assignment(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM submissions
         WHERE course_id = $1 AND assignment_id = $2 AND status = $3",
    )
    .bind(course_id)
    .bind(assignment_id)
    .bind(SubmissionStatus::Graded)
    .fetch_one(pool)
    .await
}

/// Locks every submission a student has for an assignment. Returns how many
/// rows were locked; zero means there was nothing to finalize.
pub(crate) async fn lock_for_assignment_user(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET locked = TRUE, updated_at = $1
         WHERE course_id = $2 AND assignment_id = $3 AND user_id = $4",
    )
    .bind(now)
    .bind(course_id)
    .bind(assignment_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(updated.rows_affected())
}

pub(crate) async fn delete_for_assignment_user(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
    user_id: &str,
) -> Result<u64, sqlx::Error> {
    let deleted = sqlx::query(
        "DELETE FROM submissions
         WHERE course_id = $1 AND assignment_id = $2 AND user_id = $3",
    )
    .bind(course_id)
    .bind(assignment_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(deleted.rows_affected())
}

/// Grading does not lock the row; only finalize does. A graded file
/// submission therefore stays open for payload re-uploads.
pub(crate) async fn grade(
    pool: &PgPool,
    course_id: &str,
    id: &str,
    grade: f64,
    feedback: Option<String>,
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET status = $1, grade = $2, feedback = $3,
             graded_at = $4, updated_at = $4
         WHERE course_id = $5 AND id = $6
         RETURNING {COLUMNS}",
    ))
    .bind(SubmissionStatus::Graded)
    .bind(grade)
    .bind(feedback)
    .bind(now)
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}
