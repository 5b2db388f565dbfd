use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::{require_course_membership, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Activity;
use crate::schemas::run::RunResponse;
use crate::services::completion::{self, CompletionError};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route(
        "/:course_id/activities/:activity_id/complete",
        post(mark_complete).delete(unmark_complete),
    )
}

/// Marks an activity complete for the caller and returns the updated run.
/// Completing the last outstanding activity finishes the run.
async fn mark_complete(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, activity_id)): Path<(String, String)>,
) -> Result<Json<RunResponse>, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;
    let activity = load_activity(&state, &course_id, &activity_id).await?;

    let outcome = completion::mark_complete(
        state.db(),
        &course_id,
        &activity,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|err| match err {
        CompletionError::AssignmentNotGraded => ApiError::Conflict(
            "Assignment must be graded before it can be marked complete".to_string(),
        ),
        CompletionError::Db(db) => ApiError::internal(db, "Failed to mark activity complete"),
    })?;

    run_response(&state, outcome.run).await
}

async fn unmark_complete(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, activity_id)): Path<(String, String)>,
) -> Result<Json<RunResponse>, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;
    let activity = load_activity(&state, &course_id, &activity_id).await?;

    let outcome = completion::unmark_complete(
        state.db(),
        &course_id,
        &activity,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to unmark activity"))?;

    run_response(&state, outcome.run).await
}

async fn load_activity(
    state: &AppState,
    course_id: &str,
    activity_id: &str,
) -> Result<Activity, ApiError> {
    crate::repositories::activities::find(state.db(), course_id, activity_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load activity"))?
        .ok_or_else(|| ApiError::NotFound("Activity not found".to_string()))
}

async fn run_response(
    state: &AppState,
    run: crate::db::models::CourseRun,
) -> Result<Json<RunResponse>, ApiError> {
    let progress = completion::progress(state.db(), &run)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute run progress"))?;
    let steps = crate::repositories::runs::list_steps(state.db(), &run.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list run steps"))?;
    Ok(Json(RunResponse::from_db(run, progress, steps)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::db::types::CourseRole;
    use crate::test_support::{self, TestContext};

    struct Fixture {
        course_id: String,
        teacher_token: String,
        student_id: String,
        student_token: String,
        activity_ids: Vec<String>,
        task_id: String,
    }

    /// A course with two content activities plus one assignment activity
    /// carrying a single published file task.
    async fn setup(ctx: &TestContext) -> (Fixture, String) {
        let (teacher, teacher_token) =
            ctx.insert_user_with_token("teacher", "teacher-pass-1", false).await;
        let course = ctx.create_course_with_teacher("course", &teacher.id).await;

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{}/chapters", course.id),
                Some(&teacher_token),
                Some(serde_json::json!({"title": "Week 1"})),
            )
            .await;
        let chapter = test_support::read_json(response).await;

        let mut activity_ids = Vec::new();
        for (title, kind) in
            [("Intro", "video"), ("Notes", "document"), ("Homework", "assignment")]
        {
            let response = ctx
                .request(
                    "POST",
                    &format!("/api/v1/courses/{}/activities", course.id),
                    Some(&teacher_token),
                    Some(serde_json::json!({
                        "chapter_id": chapter["id"],
                        "title": title,
                        "kind": kind
                    })),
                )
                .await;
            let activity = test_support::read_json(response).await;
            activity_ids.push(activity["id"].as_str().unwrap().to_string());
        }

        let response = ctx
            .request(
                "POST",
                &format!(
                    "/api/v1/courses/{}/activities/{}/assignment",
                    course.id, activity_ids[2]
                ),
                Some(&teacher_token),
                Some(serde_json::json!({"grading_type": "numeric"})),
            )
            .await;
        let assignment = test_support::read_json(response).await;
        let assignment_id = assignment["id"].as_str().unwrap().to_string();

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{}/assignments/{assignment_id}/tasks", course.id),
                Some(&teacher_token),
                Some(serde_json::json!({"kind": "file_submission", "max_grade": 100.0})),
            )
            .await;
        let task = test_support::read_json(response).await;
        let task_id = task["id"].as_str().unwrap().to_string();
        ctx.request(
            "POST",
            &format!("/api/v1/courses/{}/assignments/{assignment_id}/publish", course.id),
            Some(&teacher_token),
            None,
        )
        .await;

        let (student, student_token) =
            ctx.insert_user_with_token("student", "student-pass-1", false).await;
        ctx.add_member(&course.id, &student.id, CourseRole::Student).await;

        (
            Fixture {
                course_id: course.id.clone(),
                teacher_token,
                student_id: student.id.clone(),
                student_token,
                activity_ids,
                task_id,
            },
            assignment_id,
        )
    }

    /// Student hands in the file task, teacher commits the final grade.
    async fn submit_and_grade(ctx: &TestContext, fixture: &Fixture, assignment_id: &str) {
        let response = ctx
            .request(
                "PUT",
                &format!(
                    "/api/v1/courses/{}/submissions/tasks/{}",
                    fixture.course_id, fixture.task_id
                ),
                Some(&fixture.student_token),
                Some(serde_json::json!({"type": "file", "file_handle": "uploads/hw.pdf"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = ctx
            .request(
                "POST",
                &format!(
                    "/api/v1/courses/{}/assignments/{assignment_id}/final-grade/{}",
                    fixture.course_id, fixture.student_id
                ),
                Some(&fixture.teacher_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn complete(
        ctx: &TestContext,
        fixture: &Fixture,
        activity_index: usize,
    ) -> axum::response::Response {
        ctx.request(
            "POST",
            &format!(
                "/api/v1/courses/{}/activities/{}/complete",
                fixture.course_id, fixture.activity_ids[activity_index]
            ),
            Some(&fixture.student_token),
            None,
        )
        .await
    }

    #[tokio::test]
    async fn assignment_activity_requires_final_grade() {
        let ctx = TestContext::new().await;
        let (fixture, assignment_id) = setup(&ctx).await;

        let response = complete(&ctx, &fixture, 2).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Grading unblocks the gate.
        submit_and_grade(&ctx, &fixture, &assignment_id).await;

        let response = complete(&ctx, &fixture, 2).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn completing_every_activity_finishes_the_run() {
        let ctx = TestContext::new().await;
        let (fixture, assignment_id) = setup(&ctx).await;

        submit_and_grade(&ctx, &fixture, &assignment_id).await;

        let run = test_support::read_json(complete(&ctx, &fixture, 0).await).await;
        assert_eq!(run["status"], "in_progress");

        test_support::read_json(complete(&ctx, &fixture, 1).await).await;
        let run = test_support::read_json(complete(&ctx, &fixture, 2).await).await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["progress"]["completed_activities"], 3);
        assert_eq!(run["progress"]["percent"], 100.0);
        assert!(run["completed_at"].is_string());
    }

    #[tokio::test]
    async fn remarking_a_complete_activity_is_idempotent() {
        let ctx = TestContext::new().await;
        let (fixture, _) = setup(&ctx).await;

        let first = test_support::read_json(complete(&ctx, &fixture, 0).await).await;
        let second = test_support::read_json(complete(&ctx, &fixture, 0).await).await;

        assert_eq!(first["progress"]["completed_activities"], 1);
        assert_eq!(second["progress"]["completed_activities"], 1);
        assert_eq!(second["status"], "in_progress");
    }

    /// With all but one activity done, re-marking an already complete step
    /// must not count as the missing one and finish the run.
    #[tokio::test]
    async fn remarking_does_not_finish_an_unfinished_run() {
        let ctx = TestContext::new().await;
        let (fixture, _) = setup(&ctx).await;

        complete(&ctx, &fixture, 0).await;
        complete(&ctx, &fixture, 1).await;

        let run = test_support::read_json(complete(&ctx, &fixture, 0).await).await;
        assert_eq!(run["status"], "in_progress");
        assert_eq!(run["progress"]["completed_activities"], 2);
        assert!(run["completed_at"].is_null());
    }

    #[tokio::test]
    async fn unmarking_reopens_a_completed_run() {
        let ctx = TestContext::new().await;
        let (fixture, assignment_id) = setup(&ctx).await;

        submit_and_grade(&ctx, &fixture, &assignment_id).await;
        for index in 0..3 {
            complete(&ctx, &fixture, index).await;
        }

        let response = ctx
            .request(
                "DELETE",
                &format!(
                    "/api/v1/courses/{}/activities/{}/complete",
                    fixture.course_id, fixture.activity_ids[0]
                ),
                Some(&fixture.student_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let run = test_support::read_json(response).await;
        assert_eq!(run["status"], "in_progress");
        assert_eq!(run["progress"]["completed_activities"], 2);
        assert!(run["completed_at"].is_null());
    }
}
