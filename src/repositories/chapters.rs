use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Chapter;

const COLUMNS: &str = "id, course_id, title, order_index, created_at, updated_at";

pub(crate) async fn create(
    pool: &PgPool,
    id: &str,
    course_id: &str,
    title: &str,
    order_index: i32,
    now: PrimitiveDateTime,
) -> Result<Chapter, sqlx::Error> {
    sqlx::query_as::<_, Chapter>(&format!(
        "INSERT INTO chapters (id, course_id, title, order_index, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$5)
         RETURNING {COLUMNS}",
    ))
    .bind(id)
    .bind(course_id)
    .bind(title)
    .bind(order_index)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    id: &str,
) -> Result<Option<Chapter>, sqlx::Error> {
    sqlx::query_as::<_, Chapter>(&format!(
        "SELECT {COLUMNS} FROM chapters WHERE course_id = $1 AND id = $2",
    ))
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<Chapter>, sqlx::Error> {
    sqlx::query_as::<_, Chapter>(&format!(
        "SELECT {COLUMNS} FROM chapters WHERE course_id = $1 ORDER BY order_index, created_at",
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await
}
