use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::{require_course_membership, require_course_role, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::CourseRole;
use crate::repositories;
use crate::schemas::run::RunResponse;
use crate::services::completion;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:course_id/runs", post(start_run))
        .route("/:course_id/runs/me", get(my_run))
        .route("/:course_id/runs/:user_id", get(run_for_user))
}

/// Explicitly starts the caller's run. Starting an already started run
/// returns the existing one.
async fn start_run(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;

    let run = completion::ensure_run(state.db(), &course_id, &user.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start run"))?;

    run_response(&state, run).await
}

async fn my_run(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;
    fetch_run(&state, &course_id, &user.id).await
}

async fn run_for_user(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, user_id)): Path<(String, String)>,
) -> Result<Json<RunResponse>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    fetch_run(&state, &course_id, &user_id).await
}

async fn fetch_run(
    state: &AppState,
    course_id: &str,
    user_id: &str,
) -> Result<Json<RunResponse>, ApiError> {
    let run = repositories::runs::find(state.db(), course_id, user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load run"))?
        .ok_or_else(|| ApiError::NotFound("Run not found".to_string()))?;
    run_response(state, run).await
}

async fn run_response(
    state: &AppState,
    run: crate::db::models::CourseRun,
) -> Result<Json<RunResponse>, ApiError> {
    let progress = completion::progress(state.db(), &run)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute run progress"))?;
    let steps = repositories::runs::list_steps(state.db(), &run.id)
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
        chapter_id: String,
        teacher_token: String,
        student_id: String,
        student_token: String,
        activity_ids: Vec<String>,
    }

    async fn add_activity(ctx: &TestContext, fixture: &mut Fixture, title: &str) {
        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{}/activities", fixture.course_id),
                Some(&fixture.teacher_token),
                Some(serde_json::json!({
                    "chapter_id": fixture.chapter_id,
                    "title": title,
                    "kind": "document"
                })),
            )
            .await;
        let activity = test_support::read_json(response).await;
        fixture.activity_ids.push(activity["id"].as_str().unwrap().to_string());
    }

    async fn setup(ctx: &TestContext, activities: usize) -> Fixture {
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

        let (student, student_token) =
            ctx.insert_user_with_token("student", "student-pass-1", false).await;
        ctx.add_member(&course.id, &student.id, CourseRole::Student).await;

        let mut fixture = Fixture {
            course_id: course.id.clone(),
            chapter_id: chapter["id"].as_str().unwrap().to_string(),
            teacher_token,
            student_id: student.id,
            student_token,
            activity_ids: Vec::new(),
        };

        for index in 0..activities {
            add_activity(ctx, &mut fixture, &format!("Reading {index}")).await;
        }

        fixture
    }

    #[tokio::test]
    async fn starting_a_run_is_idempotent() {
        let ctx = TestContext::new().await;
        let fixture = setup(&ctx, 2).await;

        let uri = format!("/api/v1/courses/{}/runs", fixture.course_id);
        let first = test_support::read_json(
            ctx.request("POST", &uri, Some(&fixture.student_token), None).await,
        )
        .await;
        let second = test_support::read_json(
            ctx.request("POST", &uri, Some(&fixture.student_token), None).await,
        )
        .await;

        assert_eq!(first["id"], second["id"]);
        assert_eq!(first["status"], "not_started");
        assert_eq!(first["progress"]["total_activities"], 2);
    }

    #[tokio::test]
    async fn my_run_requires_an_existing_run() {
        let ctx = TestContext::new().await;
        let fixture = setup(&ctx, 1).await;

        let response = ctx
            .request(
                "GET",
                &format!("/api/v1/courses/{}/runs/me", fixture.course_id),
                Some(&fixture.student_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn adding_activities_lowers_reported_progress() {
        let ctx = TestContext::new().await;
        let mut fixture = setup(&ctx, 2).await;

        for activity_id in fixture.activity_ids.clone() {
            ctx.request(
                "POST",
                &format!(
                    "/api/v1/courses/{}/activities/{activity_id}/complete",
                    fixture.course_id
                ),
                Some(&fixture.student_token),
                None,
            )
            .await;
        }

        let uri = format!("/api/v1/courses/{}/runs/me", fixture.course_id);
        let run = test_support::read_json(
            ctx.request("GET", &uri, Some(&fixture.student_token), None).await,
        )
        .await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["progress"]["percent"], 100.0);

        // The denominator tracks the live activity list.
        add_activity(&ctx, &mut fixture, "Reading 2").await;
        let run = test_support::read_json(
            ctx.request("GET", &uri, Some(&fixture.student_token), None).await,
        )
        .await;
        assert_eq!(run["progress"]["completed_activities"], 2);
        assert_eq!(run["progress"]["total_activities"], 3);
        assert_eq!(run["status"], "completed");
    }

    #[tokio::test]
    async fn teachers_can_read_student_runs() {
        let ctx = TestContext::new().await;
        let fixture = setup(&ctx, 1).await;

        ctx.request(
            "POST",
            &format!(
                "/api/v1/courses/{}/activities/{}/complete",
                fixture.course_id, fixture.activity_ids[0]
            ),
            Some(&fixture.student_token),
            None,
        )
        .await;

        let student_id = &fixture.student_id;

        let response = ctx
            .request(
                "GET",
                &format!("/api/v1/courses/{}/runs/{student_id}", fixture.course_id),
                Some(&fixture.teacher_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let run = test_support::read_json(response).await;
        assert_eq!(run["progress"]["completed_activities"], 1);

        // Students cannot read someone else's run through this route.
        let response = ctx
            .request(
                "GET",
                &format!("/api/v1/courses/{}/runs/{student_id}", fixture.course_id),
                Some(&fixture.student_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
