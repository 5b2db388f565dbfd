use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::CourseInviteCode;
use crate::db::types::CourseRole;

const COLUMNS: &str =
    "id, course_id, role, code_hash, is_active, usage_count, created_at, updated_at";

pub(crate) async fn create(
    pool: &PgPool,
    id: &str,
    course_id: &str,
    role: CourseRole,
    code_hash: &str,
    now: PrimitiveDateTime,
) -> Result<CourseInviteCode, sqlx::Error> {
    sqlx::query_as::<_, CourseInviteCode>(&format!(
        "INSERT INTO course_invite_codes
            (id, course_id, role, code_hash, is_active, usage_count, created_at, updated_at)
         VALUES ($1,$2,$3,$4,TRUE,0,$5,$5)
         RETURNING {COLUMNS}",
    ))
    .bind(id)
    .bind(course_id)
    .bind(role)
    .bind(code_hash)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_active_by_hash(
    pool: &PgPool,
    code_hash: &str,
) -> Result<Option<CourseInviteCode>, sqlx::Error> {
    sqlx::query_as::<_, CourseInviteCode>(&format!(
        "SELECT {COLUMNS} FROM course_invite_codes WHERE code_hash = $1 AND is_active = TRUE",
    ))
    .bind(code_hash)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn record_use(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE course_invite_codes
         SET usage_count = usage_count + 1, updated_at = $1
         WHERE id = $2",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn deactivate(
    pool: &PgPool,
    course_id: &str,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE course_invite_codes
         SET is_active = FALSE, updated_at = $1
         WHERE course_id = $2 AND id = $3 AND is_active = TRUE",
    )
    .bind(now)
    .bind(course_id)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn list_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<CourseInviteCode>, sqlx::Error> {
    sqlx::query_as::<_, CourseInviteCode>(&format!(
        "SELECT {COLUMNS} FROM course_invite_codes WHERE course_id = $1 ORDER BY created_at",
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await
}
