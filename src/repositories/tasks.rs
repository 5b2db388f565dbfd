use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{QuizQuestion, Task};
use crate::db::types::TaskKind;

const COLUMNS: &str = "\
    id, course_id, assignment_id, kind, order_index, max_grade, questions, reference_file, \
    created_at, updated_at";

pub(crate) struct CreateTask<'a> {
    pub id: &'a str,
    pub course_id: &'a str,
    pub assignment_id: &'a str,
    pub kind: TaskKind,
    pub order_index: i32,
    pub max_grade: f64,
    pub questions: Vec<QuizQuestion>,
    pub reference_file: Option<String>,
    pub now: PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateTask<'_>) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks
            (id, course_id, assignment_id, kind, order_index, max_grade, questions,
             reference_file, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.assignment_id)
    .bind(params.kind)
    .bind(params.order_index)
    .bind(params.max_grade)
    .bind(Json(params.questions))
    .bind(params.reference_file)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    course_id: &str,
    id: &str,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {COLUMNS} FROM tasks WHERE course_id = $1 AND id = $2",
    ))
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_for_assignment(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {COLUMNS} FROM tasks
         WHERE course_id = $1 AND assignment_id = $2
         ORDER BY order_index, created_at",
    ))
    .bind(course_id)
    .bind(assignment_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_for_assignment(
    pool: &PgPool,
    course_id: &str,
    assignment_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tasks WHERE course_id = $1 AND assignment_id = $2",
    )
    .bind(course_id)
    .bind(assignment_id)
    .fetch_one(pool)
    .await
}

pub(crate) struct UpdateTask {
    pub order_index: Option<i32>,
    pub max_grade: Option<f64>,
    pub questions: Option<Vec<QuizQuestion>>,
    pub reference_file: Option<Option<String>>,
}

pub(crate) async fn update(
    pool: &PgPool,
    course_id: &str,
    id: &str,
    params: UpdateTask,
    now: PrimitiveDateTime,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks
         SET order_index = COALESCE($1, order_index),
             max_grade = COALESCE($2, max_grade),
             questions = COALESCE($3, questions),
             reference_file = CASE WHEN $4 THEN $5 ELSE reference_file END,
             updated_at = $6
         WHERE course_id = $7 AND id = $8
         RETURNING {COLUMNS}",
    ))
    .bind(params.order_index)
    .bind(params.max_grade)
    .bind(params.questions.map(Json))
    .bind(params.reference_file.is_some())
    .bind(params.reference_file.flatten())
    .bind(now)
    .bind(course_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete(
    pool: &PgPool,
    course_id: &str,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM tasks WHERE course_id = $1 AND id = $2")
        .bind(course_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(deleted.rows_affected() > 0)
}
