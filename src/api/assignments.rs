use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_course_membership, require_course_role, CourseAccess, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Assignment, QuizAnswer, QuizQuestion};
use crate::db::types::{ActivityKind, CourseRole, TaskKind};
use crate::repositories;
use crate::schemas::assignment::{
    parse_due_at, AssignmentCreate, AssignmentResponse, AssignmentUpdate, FinalGradeResponse,
    QuizQuestionCreate, TaskCreate, TaskResponse, TaskUpdate, TaskUpdateResponse,
};
use crate::services::grading;

/// Hard ceiling on tasks per assignment.
const MAX_TASKS_PER_ASSIGNMENT: i64 = 10;

const GRADED_EDIT_ADVISORY: &str =
    "This assignment already has graded submissions; existing grades are kept as recorded";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:course_id/activities/:activity_id/assignment", post(create_assignment))
        .route(
            "/:course_id/assignments/:assignment_id",
            get(get_assignment).patch(update_assignment),
        )
        .route("/:course_id/assignments/:assignment_id/publish", post(publish_assignment))
        .route(
            "/:course_id/assignments/:assignment_id/tasks",
            get(list_tasks).post(create_task),
        )
        .route(
            "/:course_id/assignments/:assignment_id/tasks/:task_id",
            patch(update_task).delete(delete_task),
        )
        .route(
            "/:course_id/assignments/:assignment_id/final-grade/:user_id",
            get(get_final_grade).post(put_final_grade),
        )
}

async fn create_assignment(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, activity_id)): Path<(String, String)>,
    Json(payload): Json<AssignmentCreate>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let activity = repositories::activities::find(state.db(), &course_id, &activity_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load activity"))?
        .ok_or_else(|| ApiError::NotFound("Activity not found".to_string()))?;

    if activity.kind != ActivityKind::Assignment {
        return Err(ApiError::BadRequest(
            "Activity is not an assignment activity".to_string(),
        ));
    }

    let existing =
        repositories::assignments::find_by_activity(state.db(), &course_id, &activity_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check existing assignment"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Activity already has an assignment".to_string()));
    }

    let due_at = match &payload.due_at {
        Some(raw) => Some(parse_due_at(raw).map_err(ApiError::BadRequest)?),
        None => None,
    };

    let assignment = repositories::assignments::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        &course_id,
        &activity_id,
        payload.grading_type,
        due_at,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create assignment"))?;

    Ok((StatusCode::CREATED, Json(AssignmentResponse::from_db(assignment))))
}

async fn get_assignment(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let access = require_course_membership(&state, &user, &course_id).await?;
    let assignment =
        fetch_assignment_for(&state, &course_id, &assignment_id, &user, &access).await?;
    Ok(Json(AssignmentResponse::from_db(assignment)))
}

async fn update_assignment(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
    Json(payload): Json<AssignmentUpdate>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let due_at = if payload.clear_due_at {
        Some(None)
    } else {
        match &payload.due_at {
            Some(raw) => Some(Some(parse_due_at(raw).map_err(ApiError::BadRequest)?)),
            None => None,
        }
    };

    let assignment = repositories::assignments::update(
        state.db(),
        &course_id,
        &assignment_id,
        repositories::assignments::UpdateAssignment {
            grading_type: payload.grading_type,
            due_at,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update assignment"))?
    .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    Ok(Json(AssignmentResponse::from_db(assignment)))
}

async fn publish_assignment(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let assignment = repositories::assignments::find(state.db(), &course_id, &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    if assignment.published {
        return Err(ApiError::Conflict("Assignment is already published".to_string()));
    }

    let task_count =
        repositories::tasks::count_for_assignment(state.db(), &course_id, &assignment_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count tasks"))?;
    if task_count == 0 {
        return Err(ApiError::BadRequest(
            "Assignment needs at least one task before publishing".to_string(),
        ));
    }

    let assignment = repositories::assignments::publish(
        state.db(),
        &course_id,
        &assignment_id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to publish assignment"))?
    .ok_or_else(|| ApiError::Conflict("Assignment is already published".to_string()))?;

    Ok(Json(AssignmentResponse::from_db(assignment)))
}

async fn create_task(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
    Json(payload): Json<TaskCreate>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    payload.validate().map_err(ApiError::validation)?;

    repositories::assignments::find(state.db(), &course_id, &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    let task_count =
        repositories::tasks::count_for_assignment(state.db(), &course_id, &assignment_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count tasks"))?;
    if task_count >= MAX_TASKS_PER_ASSIGNMENT {
        return Err(ApiError::Conflict(format!(
            "Assignment already has the maximum of {MAX_TASKS_PER_ASSIGNMENT} tasks"
        )));
    }

    let questions = build_questions(payload.kind, payload.questions)?;

    let task = repositories::tasks::create(
        state.db(),
        repositories::tasks::CreateTask {
            id: &Uuid::new_v4().to_string(),
            course_id: &course_id,
            assignment_id: &assignment_id,
            kind: payload.kind,
            order_index: payload.order_index,
            max_grade: payload.max_grade,
            questions,
            reference_file: payload.reference_file,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create task"))?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from_db(task, true))))
}

async fn list_tasks(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id)): Path<(String, String)>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let access = require_course_membership(&state, &user, &course_id).await?;
    fetch_assignment_for(&state, &course_id, &assignment_id, &user, &access).await?;

    let reveal_answers = access.role == CourseRole::Teacher;
    let tasks = repositories::tasks::list_for_assignment(state.db(), &course_id, &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tasks"))?;

    Ok(Json(tasks.into_iter().map(|task| TaskResponse::from_db(task, reveal_answers)).collect()))
}

async fn update_task(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id, task_id)): Path<(String, String, String)>,
    Json(payload): Json<TaskUpdate>,
) -> Result<Json<TaskUpdateResponse>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    payload.validate().map_err(ApiError::validation)?;

    let existing = repositories::tasks::find(state.db(), &course_id, &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load task"))?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    if existing.assignment_id != assignment_id {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    let questions = match payload.questions {
        Some(questions) => Some(build_questions(existing.kind, questions)?),
        None => None,
    };
    let reference_file = if payload.clear_reference_file {
        Some(None)
    } else {
        payload.reference_file.map(Some)
    };

    let task = repositories::tasks::update(
        state.db(),
        &course_id,
        &task_id,
        repositories::tasks::UpdateTask {
            order_index: payload.order_index,
            max_grade: payload.max_grade,
            questions,
            reference_file,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update task"))?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    // Already-recorded grades are never rewritten by task edits; the teacher
    // is warned instead.
    let graded = repositories::submissions::count_graded_for_assignment(
        state.db(),
        &course_id,
        &assignment_id,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to count graded submissions"))?;
    let advisory = (graded > 0).then(|| GRADED_EDIT_ADVISORY.to_string());

    Ok(Json(TaskUpdateResponse { task: TaskResponse::from_db(task, true), advisory }))
}

async fn delete_task(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id, task_id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let existing = repositories::tasks::find(state.db(), &course_id, &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load task"))?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    if existing.assignment_id != assignment_id {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    let deleted = repositories::tasks::delete(state.db(), &course_id, &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete task"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Task not found".to_string()))
    }
}

async fn put_final_grade(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id, user_id)): Path<(String, String, String)>,
) -> Result<Json<FinalGradeResponse>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let assignment = repositories::assignments::find(state.db(), &course_id, &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    require_course_membership_of(&state, &course_id, &user_id).await?;

    let tasks = repositories::tasks::list_for_assignment(state.db(), &course_id, &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tasks"))?;
    let submissions = repositories::submissions::list_for_assignment_user(
        state.db(),
        &course_id,
        &assignment_id,
        &user_id,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    if tasks.is_empty() {
        return Err(ApiError::Conflict("Assignment has no tasks to grade".to_string()));
    }
    if submissions.is_empty() {
        return Err(ApiError::NotFound("No submissions to grade".to_string()));
    }

    let totals = grading::aggregate(&tasks, &submissions);

    let record = repositories::assignment_grades::upsert(
        state.db(),
        repositories::assignment_grades::UpsertGrade {
            id: &Uuid::new_v4().to_string(),
            course_id: &course_id,
            assignment_id: &assignment_id,
            user_id: &user_id,
            grade: totals.grade,
            max_grade: totals.max_grade,
            graded_by: &user.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store final grade"))?;

    Ok(Json(FinalGradeResponse::from_db(record, assignment.grading_type)))
}

async fn get_final_grade(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, assignment_id, user_id)): Path<(String, String, String)>,
) -> Result<Json<FinalGradeResponse>, ApiError> {
    let access = require_course_membership(&state, &user, &course_id).await?;
    if access.role != CourseRole::Teacher && user.id != user_id {
        return Err(ApiError::Forbidden("Students may only read their own final grade"));
    }

    let assignment = repositories::assignments::find(state.db(), &course_id, &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    let record =
        repositories::assignment_grades::find(state.db(), &course_id, &assignment_id, &user_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load final grade"))?
            .ok_or_else(|| ApiError::NotFound("Final grade not recorded".to_string()))?;

    Ok(Json(FinalGradeResponse::from_db(record, assignment.grading_type)))
}

/// Unpublished assignments stay invisible to students.
async fn fetch_assignment_for(
    state: &AppState,
    course_id: &str,
    assignment_id: &str,
    user: &crate::db::models::User,
    access: &CourseAccess,
) -> Result<Assignment, ApiError> {
    let assignment = repositories::assignments::find(state.db(), course_id, assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    let is_teacher = user.is_platform_admin || access.role == CourseRole::Teacher;
    if !assignment.published && !is_teacher {
        return Err(ApiError::NotFound("Assignment not found".to_string()));
    }

    Ok(assignment)
}

async fn require_course_membership_of(
    state: &AppState,
    course_id: &str,
    user_id: &str,
) -> Result<(), ApiError> {
    let membership = repositories::course_memberships::find(state.db(), course_id, user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch course membership"))?;
    if membership.is_none() {
        return Err(ApiError::NotFound("User is not a member of this course".to_string()));
    }
    Ok(())
}

fn build_questions(
    kind: TaskKind,
    questions: Vec<QuizQuestionCreate>,
) -> Result<Vec<QuizQuestion>, ApiError> {
    match kind {
        TaskKind::FileSubmission => {
            if !questions.is_empty() {
                return Err(ApiError::BadRequest(
                    "File submission tasks cannot carry quiz questions".to_string(),
                ));
            }
            Ok(Vec::new())
        }
        TaskKind::Quiz => {
            if questions.is_empty() {
                return Err(ApiError::BadRequest(
                    "Quiz tasks need at least one question".to_string(),
                ));
            }
            let mut built = Vec::with_capacity(questions.len());
            for question in questions {
                if !question.answers.iter().any(|answer| answer.correct) {
                    return Err(ApiError::BadRequest(
                        "Each quiz question needs at least one correct answer".to_string(),
                    ));
                }
                built.push(QuizQuestion {
                    id: Uuid::new_v4().to_string(),
                    text: question.text,
                    question_type: question.question_type,
                    answers: question
                        .answers
                        .into_iter()
                        .map(|answer| QuizAnswer {
                            id: Uuid::new_v4().to_string(),
                            text: answer.text,
                            correct: answer.correct,
                        })
                        .collect(),
                });
            }
            Ok(built)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::db::types::CourseRole;
    use crate::test_support::{self, TestContext};

    async fn setup_assignment(ctx: &TestContext) -> (String, String, String, String) {
        let (teacher, teacher_token) =
            ctx.insert_user_with_token("teacher", "teacher-pass-1", false).await;
        let course = ctx.create_course_with_teacher("phys", &teacher.id).await;

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
                    "title": "Homework 1",
                    "kind": "assignment"
                })),
            )
            .await;
        let activity = test_support::read_json(response).await;
        let activity_id = activity["id"].as_str().unwrap().to_string();

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{}/activities/{activity_id}/assignment", course.id),
                Some(&teacher_token),
                Some(serde_json::json!({"grading_type": "numeric"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let assignment = test_support::read_json(response).await;
        let assignment_id = assignment["id"].as_str().unwrap().to_string();

        (course.id.clone(), activity_id, assignment_id, teacher_token)
    }

    fn quiz_task_body(max_grade: f64) -> serde_json::Value {
        serde_json::json!({
            "kind": "quiz",
            "max_grade": max_grade,
            "questions": [{
                "text": "2 + 2?",
                "answers": [
                    {"text": "4", "correct": true},
                    {"text": "5", "correct": false}
                ]
            }]
        })
    }

    #[tokio::test]
    async fn assignment_requires_assignment_activity() {
        let ctx = TestContext::new().await;
        let (teacher, token) = ctx.insert_user_with_token("teacher", "teacher-pass-1", false).await;
        let course = ctx.create_course_with_teacher("chem", &teacher.id).await;

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{}/chapters", course.id),
                Some(&token),
                Some(serde_json::json!({"title": "Intro"})),
            )
            .await;
        let chapter = test_support::read_json(response).await;

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{}/activities", course.id),
                Some(&token),
                Some(serde_json::json!({
                    "chapter_id": chapter["id"],
                    "title": "A video",
                    "kind": "video"
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
                Some(&token),
                Some(serde_json::json!({"grading_type": "numeric"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn task_ceiling_is_enforced() {
        let ctx = TestContext::new().await;
        let (course_id, _, assignment_id, token) = setup_assignment(&ctx).await;

        for _ in 0..10 {
            let response = ctx
                .request(
                    "POST",
                    &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/tasks"),
                    Some(&token),
                    Some(quiz_task_body(5.0)),
                )
                .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/tasks"),
                Some(&token),
                Some(quiz_task_body(5.0)),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn publish_requires_tasks_and_is_one_way() {
        let ctx = TestContext::new().await;
        let (course_id, _, assignment_id, token) = setup_assignment(&ctx).await;

        let publish_uri =
            format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/publish");

        let response = ctx.request("POST", &publish_uri, Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/tasks"),
                Some(&token),
                Some(quiz_task_body(10.0)),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = ctx.request("POST", &publish_uri, Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["published"], true);

        let response = ctx.request("POST", &publish_uri, Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unpublished_assignment_hidden_from_students() {
        let ctx = TestContext::new().await;
        let (course_id, _, assignment_id, _token) = setup_assignment(&ctx).await;

        let (student, student_token) =
            ctx.insert_user_with_token("student", "student-pass-1", false).await;
        ctx.add_member(&course_id, &student.id, CourseRole::Student).await;

        let response = ctx
            .request(
                "GET",
                &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}"),
                Some(&student_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn students_do_not_see_answer_key() {
        let ctx = TestContext::new().await;
        let (course_id, _, assignment_id, token) = setup_assignment(&ctx).await;

        let response = ctx
            .request(
                "POST",
                &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/tasks"),
                Some(&token),
                Some(quiz_task_body(10.0)),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        ctx.request(
            "POST",
            &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/publish"),
            Some(&token),
            None,
        )
        .await;

        let (student, student_token) =
            ctx.insert_user_with_token("student", "student-pass-1", false).await;
        ctx.add_member(&course_id, &student.id, CourseRole::Student).await;

        let response = ctx
            .request(
                "GET",
                &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/tasks"),
                Some(&student_token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let tasks = test_support::read_json(response).await;
        let answer = &tasks[0]["questions"][0]["answers"][0];
        assert!(answer.get("correct").is_none());

        let response = ctx
            .request(
                "GET",
                &format!("/api/v1/courses/{course_id}/assignments/{assignment_id}/tasks"),
                Some(&token),
                None,
            )
            .await;
        let tasks = test_support::read_json(response).await;
        assert_eq!(tasks[0]["questions"][0]["answers"][0]["correct"], true);
    }
}
