use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Course;
use crate::db::types::MembershipStatus;

const COLUMNS: &str = "id, slug, title, is_active, created_by, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COLUMNS} FROM courses WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn exists_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM courses WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
}

pub(crate) struct CreateCourse<'a> {
    pub id: &'a str,
    pub slug: &'a str,
    pub title: &'a str,
    pub created_by: &'a str,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateCourse<'_>,
) -> Result<Course, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!(
        "INSERT INTO courses (id, slug, title, is_active, created_by, created_at, updated_at)
         VALUES ($1,$2,$3,TRUE,$4,$5,$6)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.slug)
    .bind(params.title)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "SELECT c.id, c.slug, c.title, c.is_active, c.created_by, c.created_at, c.updated_at
         FROM courses c
         JOIN course_memberships m ON m.course_id = c.id
         WHERE m.user_id = $1 AND m.status = $2
         ORDER BY c.created_at",
    )
    .bind(user_id)
    .bind(MembershipStatus::Active)
    .fetch_all(pool)
    .await
}
