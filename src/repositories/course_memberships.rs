use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::CourseMembership;
use crate::db::types::{CourseRole, MembershipStatus};

const COLUMNS: &str = "id, course_id, user_id, role, status, joined_at";

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    user_id: &str,
) -> Result<Option<CourseMembership>, sqlx::Error> {
    sqlx::query_as::<_, CourseMembership>(&format!(
        "SELECT {COLUMNS} FROM course_memberships WHERE course_id = $1 AND user_id = $2",
    ))
    .bind(course_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Adds a member, reactivating a previous membership if one exists. A user
/// keeps a single role per course; rejoining with a different code switches it.
pub(crate) async fn upsert(
    pool: &PgPool,
    id: &str,
    course_id: &str,
    user_id: &str,
    role: CourseRole,
    now: PrimitiveDateTime,
) -> Result<CourseMembership, sqlx::Error> {
    sqlx::query_as::<_, CourseMembership>(&format!(
        "INSERT INTO course_memberships (id, course_id, user_id, role, status, joined_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         ON CONFLICT (course_id, user_id) DO UPDATE
         SET role = EXCLUDED.role, status = EXCLUDED.status
         RETURNING {COLUMNS}",
    ))
    .bind(id)
    .bind(course_id)
    .bind(user_id)
    .bind(role)
    .bind(MembershipStatus::Active)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<CourseMembership>, sqlx::Error> {
    sqlx::query_as::<_, CourseMembership>(&format!(
        "SELECT {COLUMNS} FROM course_memberships
         WHERE course_id = $1 AND status = $2
         ORDER BY joined_at",
    ))
    .bind(course_id)
    .bind(MembershipStatus::Active)
    .fetch_all(pool)
    .await
}
