use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{CourseRun, RunStep};
use crate::db::types::RunStatus;

const RUN_COLUMNS: &str = "\
    id, course_id, user_id, status, started_at, completed_at, created_at, updated_at";

const STEP_COLUMNS: &str = "\
    id, course_id, run_id, activity_id, complete, completed_at, created_at, updated_at";

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    user_id: &str,
) -> Result<Option<CourseRun>, sqlx::Error> {
    sqlx::query_as::<_, CourseRun>(&format!(
        "SELECT {RUN_COLUMNS} FROM course_runs WHERE course_id = $1 AND user_id = $2",
    ))
    .bind(course_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Creates the run on first touch; concurrent callers converge on one row.
pub(crate) async fn ensure(
    pool: &PgPool,
    id: &str,
    course_id: &str,
    user_id: &str,
    status: RunStatus,
    now: PrimitiveDateTime,
) -> Result<CourseRun, sqlx::Error> {
    sqlx::query_as::<_, CourseRun>(&format!(
        "INSERT INTO course_runs
            (id, course_id, user_id, status, started_at, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$5,$5)
         ON CONFLICT (course_id, user_id) DO UPDATE
         SET updated_at = course_runs.updated_at
         RETURNING {RUN_COLUMNS}",
    ))
    .bind(id)
    .bind(course_id)
    .bind(user_id)
    .bind(status)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn set_status(
    pool: &PgPool,
    course_id: &str,
    run_id: &str,
    from: RunStatus,
    to: RunStatus,
    completed_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE course_runs
         SET status = $1, completed_at = $2, updated_at = $3
         WHERE course_id = $4 AND id = $5 AND status = $6",
    )
    .bind(to)
    .bind(completed_at)
    .bind(now)
    .bind(course_id)
    .bind(run_id)
    .bind(from)
    .execute(pool)
    .await?;
    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn upsert_step(
    pool: &PgPool,
    id: &str,
    course_id: &str,
    run_id: &str,
    activity_id: &str,
    complete: bool,
    now: PrimitiveDateTime,
) -> Result<RunStep, sqlx::Error> {
    let completed_at = if complete { Some(now) } else { None };
    sqlx::query_as::<_, RunStep>(&format!(
        "INSERT INTO run_steps
            (id, course_id, run_id, activity_id, complete, completed_at, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$7)
         ON CONFLICT (run_id, activity_id) DO UPDATE
         SET complete = EXCLUDED.complete,
             completed_at = EXCLUDED.completed_at,
             updated_at = EXCLUDED.updated_at
         RETURNING {STEP_COLUMNS}",
    ))
    .bind(id)
    .bind(course_id)
    .bind(run_id)
    .bind(activity_id)
    .bind(complete)
    .bind(completed_at)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list_steps(pool: &PgPool, run_id: &str) -> Result<Vec<RunStep>, sqlx::Error> {
    sqlx::query_as::<_, RunStep>(&format!(
        "SELECT {STEP_COLUMNS} FROM run_steps WHERE run_id = $1 ORDER BY created_at",
    ))
    .bind(run_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_completed_steps(
    pool: &PgPool,
    run_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM run_steps WHERE run_id = $1 AND complete = TRUE",
    )
    .bind(run_id)
    .fetch_one(pool)
    .await
}

/// Completed steps for every activity but the given one. Used to decide
/// whether the activity being marked is the last one outstanding.
pub(crate) async fn count_completed_steps_excluding(
    pool: &PgPool,
    run_id: &str,
    activity_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM run_steps
         WHERE run_id = $1 AND activity_id <> $2 AND complete = TRUE",
    )
    .bind(run_id)
    .bind(activity_id)
    .fetch_one(pool)
    .await
}
