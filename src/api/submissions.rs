use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_course_membership, require_course_role, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Submission, SubmissionPayload, Task};
use crate::db::types::{CourseRole, SubmissionStatus, TaskKind};
use crate::repositories;
use crate::schemas::submission::{
    GradeSubmissionRequest, SubmissionResponse, SubmissionSubmit, TaskSubmissionState,
};
use crate::services::grading;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:course_id/submissions/tasks/:task_id", put(submit))
        .route("/:course_id/submissions/:submission_id/grade", post(grade_submission))
        .route(
            "/:course_id/assignments/:assignment_id/submissions",
            get(list_assignment_submissions),
        )
        .route(
            "/:course_id/assignments/:assignment_id/submissions/me",
            get(my_submission_states),
        )
        .route(
            "/:course_id/assignments/:assignment_id/submissions/finalize",
            post(finalize_submissions),
        )
        .route(
            "/:course_id/assignments/:assignment_id/submissions/:user_id",
            get(submission_states_for_user).delete(reject_submissions),
        )
}

/// Creates or overwrites the caller's submission for a task. Quiz payloads
/// are scored on the spot and go straight to graded, even past `due_at`
/// (lateness is only recorded for unscored work); a graded quiz can no
/// longer be resubmitted, while file uploads stay replaceable until the
/// assignment is finalized.
async fn submit(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, task_id)): Path<(String, String)>,
    Json(payload): Json<SubmissionSubmit>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;

    let task = repositories::tasks::find(state.db(), &course_id, &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load task"))?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    let assignment =
        repositories::assignments::find(state.db(), &course_id, &task.assignment_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
            .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;
    if !assignment.published {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    check_payload_kind(&task, &payload.payload)?;

    let now = primitive_now_utc();

    let existing =
        repositories::submissions::find_by_task_user(state.db(), &course_id, &task_id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load submission"))?;

    if let Some(existing) = existing {
        if existing.locked {
            return Err(ApiError::Conflict(
                "Submission is finalized and can no longer be edited".to_string(),
            ));
        }
        if existing.status == SubmissionStatus::Graded {
            return match task.kind {
                TaskKind::Quiz => Err(ApiError::Conflict(
                    "Quiz submission is already graded".to_string(),
                )),
                TaskKind::FileSubmission => {
                    let updated = repositories::submissions::update_payload(
                        state.db(),
                        &course_id,
                        &existing.id,
                        payload.payload,
                        now,
                    )
                    .await
                    .map_err(|e| ApiError::internal(e, "Failed to update submission payload"))?
                    .ok_or_else(|| {
                        ApiError::Conflict(
                            "Submission is finalized and can no longer be edited".to_string(),
                        )
                    })?;
                    Ok(Json(SubmissionResponse::from_db(updated)))
                }
            };
        }
    }

    let late = assignment.due_at.map(|due| now > due).unwrap_or(false);
    let (status, grade, graded_at) = match (&task.kind, &payload.payload) {
        (TaskKind::Quiz, SubmissionPayload::Quiz { answers }) => {
            let grade = grading::score_quiz(&task.questions.0, answers, task.max_grade);
            (SubmissionStatus::Graded, Some(grade), Some(now))
        }
        _ if late => (SubmissionStatus::Late, None, None),
        _ => (SubmissionStatus::Submitted, None, None),
    };

    let submission = repositories::submissions::upsert(
        state.db(),
        repositories::submissions::UpsertSubmission {
            id: &Uuid::new_v4().to_string(),
            course_id: &course_id,
            assignment_id: &task.assignment_id,
            task_id: &task_id,
            user_id: &user.id,
            status,
            payload: payload.payload,
            grade,
            graded_at,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store submission"))?
    .ok_or_else(|| {
        ApiError::Conflict("Submission is finalized and can no longer be edited".to_string())
    })?;

    Ok(Json(SubmissionResponse::from_db(submission)))
}

/// Locks every submission the caller has for the assignment. Further edits
/// fail with a conflict until a teacher rejects the work.
async fn finalize_submissions(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;

    let locked = repositories::submissions::lock_for_assignment_user(
        state.db(),
        &course_id,
        &assignment_id,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to finalize submissions"))?;

    if locked == 0 {
        return Err(ApiError::NotFound("No submissions to finalize".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Sends the student's work back: every submission for the assignment is
/// deleted along with any committed final grade.
async fn reject_submissions(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id, user_id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let deleted = repositories::submissions::delete_for_assignment_user(
        state.db(),
        &course_id,
        &assignment_id,
        &user_id,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to delete submissions"))?;

    if deleted == 0 {
        return Err(ApiError::NotFound("No submissions for this user".to_string()));
    }

    repositories::assignment_grades::delete(state.db(), &course_id, &assignment_id, &user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete final grade"))?;

    Ok(StatusCode::NO_CONTENT)
}

async fn grade_submission(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, submission_id)): Path<(String, String)>,
    Json(payload): Json<GradeSubmissionRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    payload.validate().map_err(ApiError::validation)?;

    let submission = repositories::submissions::find(state.db(), &course_id, &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    let task = repositories::tasks::find(state.db(), &course_id, &submission.task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load task"))?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    // Out-of-range grades are rejected, never clamped.
    if payload.grade > task.max_grade {
        return Err(ApiError::BadRequest(format!(
            "Grade {} exceeds the task maximum of {}",
            payload.grade, task.max_grade
        )));
    }

    let graded = repositories::submissions::grade(
        state.db(),
        &course_id,
        &submission_id,
        payload.grade,
        payload.feedback,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to grade submission"))?
    .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    Ok(Json(SubmissionResponse::from_db(graded)))
}

/// Teacher overview of every submission handed in for an assignment.
async fn list_assignment_submissions(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    repositories::assignments::find(state.db(), &course_id, &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    let submissions =
        repositories::submissions::list_for_assignment(state.db(), &course_id, &assignment_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    Ok(Json(submissions.into_iter().map(SubmissionResponse::from_db).collect()))
}

async fn my_submission_states(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
) -> Result<Json<Vec<TaskSubmissionState>>, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;
    let user_id = user.id.clone();
    submission_states(&state, &course_id, &assignment_id, &user_id).await
}

async fn submission_states_for_user(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id, user_id)): Path<(String, String, String)>,
) -> Result<Json<Vec<TaskSubmissionState>>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    submission_states(&state, &course_id, &assignment_id, &user_id).await
}

async fn submission_states(
    state: &AppState,
    course_id: &str,
    assignment_id: &str,
    user_id: &str,
) -> Result<Json<Vec<TaskSubmissionState>>, ApiError> {
    repositories::assignments::find(state.db(), course_id, assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    let tasks = repositories::tasks::list_for_assignment(state.db(), course_id, assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tasks"))?;
    let mut submissions: Vec<Submission> = repositories::submissions::list_for_assignment_user(
        state.db(),
        course_id,
        assignment_id,
        user_id,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    let states = tasks
        .into_iter()
        .map(|task| {
            match submissions.iter().position(|submission| submission.task_id == task.id) {
                Some(index) => TaskSubmissionState::present(submissions.swap_remove(index)),
                None => TaskSubmissionState::absent(task.id),
            }
        })
        .collect();

    Ok(Json(states))
}

fn check_payload_kind(task: &Task, payload: &SubmissionPayload) -> Result<(), ApiError> {
    let matches = matches!(
        (&task.kind, payload),
        (TaskKind::Quiz, SubmissionPayload::Quiz { .. })
            | (TaskKind::FileSubmission, SubmissionPayload::File { .. })
    );
    if matches {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Submission payload does not match the task type".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::db::types::CourseRole;
    use crate::test_support::{self, TestContext};

    struct Fixture {
        course_id: String,
        assignment_id: String,
        teacher_token: String,
        student_id: String,
        student_token: String,
    }

    async fn setup(ctx: &TestContext, task_body: serde_json::Value) -> (Fixture, String) {
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

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{}/activities", course.id),
                Some(&teacher_token),
                Some(serde_json::json!({
                    "chapter_id": chapter["id"],
                    "title": "Homework",
                    "kind": "assignment"
                })),
            )
            .await;
        let activity = test_support::read_json(response).await;

        let response = ctx
            .request(
                "POST",
                &format!(
                    "/api/v1/courses/{}/activities/{}/assignment",
                    course.id,
                    activity["id"].as_str().unwrap()
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
                Some(task_body),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
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
                assignment_id,
                teacher_token,
                student_id: student.id.clone(),
                student_token,
            },
            task_id,
        )
    }

    fn quiz_task() -> serde_json::Value {
        serde_json::json!({
            "kind": "quiz",
            "max_grade": 10.0,
            "questions": [{
                "text": "Pick the even numbers",
                "answers": [
                    {"text": "2", "correct": true},
                    {"text": "3", "correct": false},
                    {"text": "4", "correct": true}
                ]
            }]
        })
    }

    fn file_task() -> serde_json::Value {
        serde_json::json!({"kind": "file_submission", "max_grade": 100.0})
    }

    async fn correct_quiz_payload(
        ctx: &TestContext,
        fixture: &Fixture,
    ) -> serde_json::Value {
        let response = ctx
            .request(
                "GET",
                &format!(
                    "/api/v1/courses/{}/assignments/{}/tasks",
                    fixture.course_id, fixture.assignment_id
                ),
                Some(&fixture.teacher_token),
                None,
            )
            .await;
        let tasks = test_support::read_json(response).await;
        let question = &tasks[0]["questions"][0];
        let correct_ids: Vec<&str> = question["answers"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|answer| answer["correct"] == true)
            .map(|answer| answer["id"].as_str().unwrap())
            .collect();
        serde_json::json!({
            "type": "quiz",
            "answers": [{
                "question_id": question["id"],
                "answer_ids": correct_ids
            }]
        })
    }

    #[tokio::test]
    async fn correct_quiz_submission_earns_max_grade() {
        let ctx = TestContext::new().await;
        let (fixture, task_id) = setup(&ctx, quiz_task()).await;
        let payload = correct_quiz_payload(&ctx, &fixture).await;

        let response = ctx
            .request(
                "PUT",
                &format!("/api/v1/courses/{}/submissions/tasks/{task_id}", fixture.course_id),
                Some(&fixture.student_token),
                Some(payload),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let submission = test_support::read_json(response).await;
        assert_eq!(submission["status"], "graded");
        assert_eq!(submission["grade"], 10.0);
    }

    #[tokio::test]
    async fn wrong_quiz_submission_scores_zero_and_locks() {
        let ctx = TestContext::new().await;
        let (fixture, task_id) = setup(&ctx, quiz_task()).await;
        let payload = correct_quiz_payload(&ctx, &fixture).await;
        let question_id = payload["answers"][0]["question_id"].clone();
        let partial = serde_json::json!({
            "type": "quiz",
            "answers": [{
                "question_id": question_id,
                "answer_ids": [payload["answers"][0]["answer_ids"][0]]
            }]
        });

        let uri = format!("/api/v1/courses/{}/submissions/tasks/{task_id}", fixture.course_id);
        let response =
            ctx.request("PUT", &uri, Some(&fixture.student_token), Some(partial.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let submission = test_support::read_json(response).await;
        assert_eq!(submission["grade"], 0.0);

        // Graded quiz payloads cannot be resubmitted.
        let response = ctx.request("PUT", &uri, Some(&fixture.student_token), Some(partial)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn file_submission_flow_grade_and_reupload() {
        let ctx = TestContext::new().await;
        let (fixture, task_id) = setup(&ctx, file_task()).await;

        let uri = format!("/api/v1/courses/{}/submissions/tasks/{task_id}", fixture.course_id);
        let response = ctx
            .request(
                "PUT",
                &uri,
                Some(&fixture.student_token),
                Some(serde_json::json!({"type": "file", "file_handle": "uploads/v1.pdf"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let submission = test_support::read_json(response).await;
        assert_eq!(submission["status"], "submitted");
        let submission_id = submission["id"].as_str().unwrap().to_string();

        let response = ctx
            .request(
                "POST",
                &format!(
                    "/api/v1/courses/{}/submissions/{submission_id}/grade",
                    fixture.course_id
                ),
                Some(&fixture.teacher_token),
                Some(serde_json::json!({"grade": 90.0, "feedback": "solid work"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let graded = test_support::read_json(response).await;
        assert_eq!(graded["status"], "graded");
        assert_eq!(graded["grade"], 90.0);

        // Grading does not close the submission; a new file replaces the
        // payload while the grade stands.
        let response = ctx
            .request(
                "PUT",
                &uri,
                Some(&fixture.student_token),
                Some(serde_json::json!({"type": "file", "file_handle": "uploads/v2.pdf"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let reuploaded = test_support::read_json(response).await;
        assert_eq!(reuploaded["payload"]["file_handle"], "uploads/v2.pdf");
        assert_eq!(reuploaded["status"], "graded");
        assert_eq!(reuploaded["grade"], 90.0);
    }

    #[tokio::test]
    async fn manual_grade_above_ceiling_is_rejected() {
        let ctx = TestContext::new().await;
        let (fixture, task_id) = setup(&ctx, file_task()).await;

        let uri = format!("/api/v1/courses/{}/submissions/tasks/{task_id}", fixture.course_id);
        let response = ctx
            .request(
                "PUT",
                &uri,
                Some(&fixture.student_token),
                Some(serde_json::json!({"type": "file", "file_handle": "uploads/v1.pdf"})),
            )
            .await;
        let submission = test_support::read_json(response).await;
        let submission_id = submission["id"].as_str().unwrap();

        let response = ctx
            .request(
                "POST",
                &format!(
                    "/api/v1/courses/{}/submissions/{submission_id}/grade",
                    fixture.course_id
                ),
                Some(&fixture.teacher_token),
                Some(serde_json::json!({"grade": 150.0})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn finalize_locks_further_edits() {
        let ctx = TestContext::new().await;
        let (fixture, task_id) = setup(&ctx, file_task()).await;

        let uri = format!("/api/v1/courses/{}/submissions/tasks/{task_id}", fixture.course_id);
        ctx.request(
            "PUT",
            &uri,
            Some(&fixture.student_token),
            Some(serde_json::json!({"type": "file", "file_handle": "uploads/v1.pdf"})),
        )
        .await;

        let response = ctx
            .request(
                "POST",
                &format!(
                    "/api/v1/courses/{}/assignments/{}/submissions/finalize",
                    fixture.course_id, fixture.assignment_id
                ),
                Some(&fixture.student_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = ctx
            .request(
                "PUT",
                &uri,
                Some(&fixture.student_token),
                Some(serde_json::json!({"type": "file", "file_handle": "uploads/v2.pdf"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn reject_clears_submissions_and_final_grade() {
        let ctx = TestContext::new().await;
        let (fixture, task_id) = setup(&ctx, file_task()).await;

        let uri = format!("/api/v1/courses/{}/submissions/tasks/{task_id}", fixture.course_id);
        let response = ctx
            .request(
                "PUT",
                &uri,
                Some(&fixture.student_token),
                Some(serde_json::json!({"type": "file", "file_handle": "uploads/v1.pdf"})),
            )
            .await;
        let submission = test_support::read_json(response).await;
        let submission_id = submission["id"].as_str().unwrap();

        ctx.request(
            "POST",
            &format!("/api/v1/courses/{}/submissions/{submission_id}/grade", fixture.course_id),
            Some(&fixture.teacher_token),
            Some(serde_json::json!({"grade": 90.0})),
        )
        .await;
        ctx.request(
            "POST",
            &format!(
                "/api/v1/courses/{}/assignments/{}/final-grade/{}",
                fixture.course_id, fixture.assignment_id, fixture.student_id
            ),
            Some(&fixture.teacher_token),
            None,
        )
        .await;

        let response = ctx
            .request(
                "DELETE",
                &format!(
                    "/api/v1/courses/{}/assignments/{}/submissions/{}",
                    fixture.course_id, fixture.assignment_id, fixture.student_id
                ),
                Some(&fixture.teacher_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = ctx
            .request(
                "GET",
                &format!(
                    "/api/v1/courses/{}/assignments/{}/submissions/me",
                    fixture.course_id, fixture.assignment_id
                ),
                Some(&fixture.student_token),
                None,
            )
            .await;
        let states = test_support::read_json(response).await;
        assert_eq!(states[0]["status"], "none");

        let response = ctx
            .request(
                "GET",
                &format!(
                    "/api/v1/courses/{}/assignments/{}/final-grade/{}",
                    fixture.course_id, fixture.assignment_id, fixture.student_id
                ),
                Some(&fixture.teacher_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn payload_kind_must_match_task() {
        let ctx = TestContext::new().await;
        let (fixture, task_id) = setup(&ctx, file_task()).await;

        let response = ctx
            .request(
                "PUT",
                &format!("/api/v1/courses/{}/submissions/tasks/{task_id}", fixture.course_id),
                Some(&fixture.student_token),
                Some(serde_json::json!({"type": "quiz", "answers": []})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
