use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Submission, SubmissionPayload};
use crate::db::types::SubmissionStatus;

/// A submission body is the payload union itself, tagged by task kind.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionSubmit {
    #[serde(flatten)]
    pub(crate) payload: SubmissionPayload,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) assignment_id: String,
    pub(crate) task_id: String,
    pub(crate) user_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) payload: SubmissionPayload,
    pub(crate) grade: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) locked: bool,
    pub(crate) submitted_at: String,
    pub(crate) graded_at: Option<String>,
}

impl SubmissionResponse {
    pub(crate) fn from_db(submission: Submission) -> Self {
        Self {
            id: submission.id,
            course_id: submission.course_id,
            assignment_id: submission.assignment_id,
            task_id: submission.task_id,
            user_id: submission.user_id,
            status: submission.status,
            payload: submission.payload.0,
            grade: submission.grade,
            feedback: submission.feedback,
            locked: submission.locked,
            submitted_at: format_primitive(submission.submitted_at),
            graded_at: submission.graded_at.map(format_primitive),
        }
    }
}

/// Per-task view for an assignment. A task the student never submitted for
/// reports status "none" and no submission body.
#[derive(Debug, Serialize)]
pub(crate) struct TaskSubmissionState {
    pub(crate) task_id: String,
    pub(crate) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) submission: Option<SubmissionResponse>,
}

impl TaskSubmissionState {
    pub(crate) fn absent(task_id: String) -> Self {
        Self { task_id, status: "none".to_string(), submission: None }
    }

    pub(crate) fn present(submission: Submission) -> Self {
        let status = match submission.status {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Late => "late",
            SubmissionStatus::Graded => "graded",
        };
        Self {
            task_id: submission.task_id.clone(),
            status: status.to_string(),
            submission: Some(SubmissionResponse::from_db(submission)),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeSubmissionRequest {
    #[validate(range(min = 0.0, message = "grade must be non-negative"))]
    pub(crate) grade: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}
