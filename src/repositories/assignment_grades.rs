use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::AssignmentGrade;

const COLUMNS: &str = "\
    id, course_id, assignment_id, user_id, grade, max_grade, graded_by, created_at, updated_at";

pub(crate) struct UpsertGrade<'a> {
    pub id: &'a str,
    pub course_id: &'a str,
    pub assignment_id: &'a str,
    pub user_id: &'a str,
    pub grade: f64,
    pub max_grade: f64,
    pub graded_by: &'a str,
    pub now: PrimitiveDateTime,
}

pub(crate) async fn upsert(
    pool: &PgPool,
    params: UpsertGrade<'_>,
) -> Result<AssignmentGrade, sqlx::Error> {
    sqlx::query_as::<_, AssignmentGrade>(&format!(
        "INSERT INTO assignment_grades
            (id, course_id, assignment_id, user_id, grade, max_grade, graded_by,
             created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8)
         ON CONFLICT (assignment_id, user_id) DO UPDATE
         SET grade = EXCLUDED.grade,
             max_grade = EXCLUDED.max_grade,
             graded_by = EXCLUDED.graded_by,
             updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.assignment_id)
    .bind(params.user_id)
    .bind(params.grade)
    .bind(params.max_grade)
    .bind(params.graded_by)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
    user_id: &str,
) -> Result<Option<AssignmentGrade>, sqlx::Error> {
    sqlx::query_as::<_, AssignmentGrade>(&format!(
        "SELECT {COLUMNS} FROM assignment_grades
         WHERE course_id = $1 AND assignment_id = $2 AND user_id = $3",
    ))
    .bind(course_id)
    .bind(assignment_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let deleted = sqlx::query(
        "DELETE FROM assignment_grades
         WHERE course_id = $1 AND assignment_id = $2 AND user_id = $3",
    )
    .bind(course_id)
    .bind(assignment_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(deleted.rows_affected() > 0)
}

pub(crate) async fn find_by_activity_user(
    pool: &PgPool,
    course_id: &str,
    activity_id: &str,
    user_id: &str,
) -> Result<Option<AssignmentGrade>, sqlx::Error> {
    sqlx::query_as::<_, AssignmentGrade>(
        "SELECT g.id, g.course_id, g.assignment_id, g.user_id, g.grade, g.max_grade,
                g.graded_by, g.created_at, g.updated_at
         FROM assignment_grades g
         JOIN assignments a ON a.id = g.assignment_id
         WHERE g.course_id = $1 AND a.activity_id = $2 AND g.user_id = $3",
    )
    .bind(course_id)
    .bind(activity_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
