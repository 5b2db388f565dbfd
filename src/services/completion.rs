use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Activity, CourseRun, RunStep};
use crate::db::types::{ActivityKind, RunStatus};
use crate::repositories;

#[derive(Debug, thiserror::Error)]
pub(crate) enum CompletionError {
    #[error("assignment not yet graded")]
    AssignmentNotGraded,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug)]
pub(crate) struct CompletionOutcome {
    pub(crate) run: CourseRun,
    pub(crate) step: RunStep,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub(crate) struct RunProgress {
    pub(crate) completed_activities: i64,
    pub(crate) total_activities: i64,
    pub(crate) percent: f64,
}

/// Fetches the student's run for a course, creating it lazily on first touch.
pub(crate) async fn ensure_run(
    pool: &PgPool,
    course_id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<CourseRun, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    repositories::runs::ensure(pool, &id, course_id, user_id, RunStatus::NotStarted, now).await
}

/// Marks an activity complete for a student. Assignment activities are gated
/// on a committed final grade. Re-marking an already complete activity is a
/// no-op with the same outcome.
pub(crate) async fn mark_complete(
    pool: &PgPool,
    course_id: &str,
    activity: &Activity,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<CompletionOutcome, CompletionError> {
    if activity.kind == ActivityKind::Assignment {
        let graded = repositories::assignment_grades::find_by_activity_user(
            pool,
            course_id,
            &activity.id,
            user_id,
        )
        .await?;
        if graded.is_none() {
            return Err(CompletionError::AssignmentNotGraded);
        }
    }

    let run = ensure_run(pool, course_id, user_id, now).await?;
    let total = repositories::activities::count_for_course(pool, course_id).await?;
    // The activity being marked must not count toward its own predicate, or
    // re-marking an already complete step would finish the run early.
    let completed_others =
        repositories::runs::count_completed_steps_excluding(pool, &run.id, &activity.id).await?;

    let step_id = Uuid::new_v4().to_string();
    let step =
        repositories::runs::upsert_step(pool, &step_id, course_id, &run.id, &activity.id, true, now)
            .await?;

    repositories::runs::set_status(
        pool,
        course_id,
        &run.id,
        RunStatus::NotStarted,
        RunStatus::InProgress,
        None,
        now,
    )
    .await?;

    // The step being committed was the last one outstanding.
    if total > 0 && completed_others >= total - 1 {
        repositories::runs::set_status(
            pool,
            course_id,
            &run.id,
            RunStatus::InProgress,
            RunStatus::Completed,
            Some(now),
            now,
        )
        .await?;
    }

    let run = repositories::runs::find(pool, course_id, user_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok(CompletionOutcome { run, step })
}

/// Clears an activity's completion mark. A completed run drops back to
/// in-progress, since its trail no longer covers every activity.
pub(crate) async fn unmark_complete(
    pool: &PgPool,
    course_id: &str,
    activity: &Activity,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<CompletionOutcome, sqlx::Error> {
    let run = ensure_run(pool, course_id, user_id, now).await?;

    let step_id = Uuid::new_v4().to_string();
    let step = repositories::runs::upsert_step(
        pool,
        &step_id,
        course_id,
        &run.id,
        &activity.id,
        false,
        now,
    )
    .await?;

    repositories::runs::set_status(
        pool,
        course_id,
        &run.id,
        RunStatus::Completed,
        RunStatus::InProgress,
        None,
        now,
    )
    .await?;

    let run = repositories::runs::find(pool, course_id, user_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok(CompletionOutcome { run, step })
}

/// Progress is measured against the course's current activity list, so adding
/// activities to a course can lower a student's percentage.
pub(crate) async fn progress(pool: &PgPool, run: &CourseRun) -> Result<RunProgress, sqlx::Error> {
    let total = repositories::activities::count_for_course(pool, &run.course_id).await?;
    let completed = repositories::runs::count_completed_steps(pool, &run.id).await?;
    let percent = if total > 0 {
        (completed.min(total) as f64) / (total as f64) * 100.0
    } else {
        0.0
    };
    Ok(RunProgress { completed_activities: completed, total_activities: total, percent })
}
