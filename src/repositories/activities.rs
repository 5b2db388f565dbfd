use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Activity;
use crate::db::types::ActivityKind;

const COLUMNS: &str = "id, course_id, chapter_id, title, kind, order_index, created_at, updated_at";

pub(crate) struct CreateActivity<'a> {
    pub id: &'a str,
    pub course_id: &'a str,
    pub chapter_id: &'a str,
    pub title: &'a str,
    pub kind: ActivityKind,
    pub order_index: i32,
    pub now: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateActivity<'_>,
) -> Result<Activity, sqlx::Error> {
    sqlx::query_as::<_, Activity>(&format!(
        "INSERT INTO activities
            (id, course_id, chapter_id, title, kind, order_index, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$7)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.chapter_id)
    .bind(params.title)
    .bind(params.kind)
    .bind(params.order_index)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    id: &str,
) -> Result<Option<Activity>, sqlx::Error> {
    sqlx::query_as::<_, Activity>(&format!(
        "SELECT {COLUMNS} FROM activities WHERE course_id = $1 AND id = $2",
    ))
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<Activity>, sqlx::Error> {
    sqlx::query_as::<_, Activity>(
        "SELECT a.id, a.course_id, a.chapter_id, a.title, a.kind, a.order_index,
                a.created_at, a.updated_at
         FROM activities a
         JOIN chapters ch ON ch.id = a.chapter_id
         WHERE a.course_id = $1
         ORDER BY ch.order_index, a.order_index, a.created_at",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct UpdateActivity<'a> {
    pub title: Option<&'a str>,
    pub order_index: Option<i32>,
}

pub(crate) async fn update(
    pool: &PgPool,
    course_id: &str,
    id: &str,
    params: UpdateActivity<'_>,
    now: PrimitiveDateTime,
) -> Result<Option<Activity>, sqlx::Error> {
    sqlx::query_as::<_, Activity>(&format!(
        "UPDATE activities
         SET title = COALESCE($1, title),
             order_index = COALESCE($2, order_index),
             updated_at = $3
         WHERE course_id = $4 AND id = $5
         RETURNING {COLUMNS}",
    ))
    .bind(params.title)
    .bind(params.order_index)
    .bind(now)
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Cascades to the activity's assignment, tasks, submissions and run steps.
pub(crate) async fn delete(
    pool: &PgPool,
    course_id: &str,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM activities WHERE course_id = $1 AND id = $2")
        .bind(course_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(deleted.rows_affected() > 0)
}

pub(crate) async fn count_for_course(pool: &PgPool, course_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM activities WHERE course_id = $1")
        .bind(course_id)
        .fetch_one(pool)
        .await
}
