use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Assignment;
use crate::db::types::GradingType;

const COLUMNS: &str = "\
    id, course_id, activity_id, grading_type, published, published_at, due_at, \
    created_at, updated_at";

pub(crate) async fn create(
    pool: &PgPool,
    id: &str,
    course_id: &str,
    activity_id: &str,
    grading_type: GradingType,
    due_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Result<Assignment, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "INSERT INTO assignments
            (id, course_id, activity_id, grading_type, published, due_at, created_at, updated_at)
         VALUES ($1,$2,$3,$4,FALSE,$5,$6,$6)
         RETURNING {COLUMNS}",
    ))
    .bind(id)
    .bind(course_id)
    .bind(activity_id)
    .bind(grading_type)
    .bind(due_at)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS} FROM assignments WHERE course_id = $1 AND id = $2",
    ))
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_activity(
    pool: &PgPool,
    course_id: &str,
    activity_id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS} FROM assignments WHERE course_id = $1 AND activity_id = $2",
    ))
    .bind(course_id)
    .bind(activity_id)
    .fetch_optional(pool)
    .await
}

pub(crate) struct UpdateAssignment {
    pub grading_type: Option<GradingType>,
    pub due_at: Option<Option<PrimitiveDateTime>>,
}

pub(crate) async fn update(
    pool: &PgPool,
    course_id: &str,
    id: &str,
    params: UpdateAssignment,
    now: PrimitiveDateTime,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "UPDATE assignments
         SET grading_type = COALESCE($1, grading_type),
             due_at = CASE WHEN $2 THEN $3 ELSE due_at END,
             updated_at = $4
         WHERE course_id = $5 AND id = $6
         RETURNING {COLUMNS}",
    ))
    .bind(params.grading_type)
    .bind(params.due_at.is_some())
    .bind(params.due_at.flatten())
    .bind(now)
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Publishes once; returns the updated row only on the first transition.
pub(crate) async fn publish(
    pool: &PgPool,
    course_id: &str,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "UPDATE assignments
         SET published = TRUE, published_at = $1, updated_at = $1
         WHERE course_id = $2 AND id = $3 AND published = FALSE
         RETURNING {COLUMNS}",
    ))
    .bind(now)
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}
