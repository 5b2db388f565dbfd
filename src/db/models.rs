use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    ActivityKind, CourseRole, GradingType, MembershipStatus, QuestionType, RunStatus,
    SubmissionStatus, TaskKind,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) is_platform_admin: bool,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Course {
    pub(crate) id: String,
    pub(crate) slug: String,
    pub(crate) title: String,
    pub(crate) is_active: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CourseMembership {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) user_id: String,
    pub(crate) role: CourseRole,
    pub(crate) status: MembershipStatus,
    pub(crate) joined_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CourseInviteCode {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) role: CourseRole,
    pub(crate) code_hash: String,
    pub(crate) is_active: bool,
    pub(crate) usage_count: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Chapter {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Activity {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) chapter_id: String,
    pub(crate) title: String,
    pub(crate) kind: ActivityKind,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) activity_id: String,
    pub(crate) grading_type: GradingType,
    pub(crate) published: bool,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) due_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Task {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) assignment_id: String,
    pub(crate) kind: TaskKind,
    pub(crate) order_index: i32,
    pub(crate) max_grade: f64,
    pub(crate) questions: Json<Vec<QuizQuestion>>,
    pub(crate) reference_file: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuizQuestion {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) answers: Vec<QuizAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuizAnswer {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) correct: bool,
}

/// Task-type-specific submission content, tagged by task kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum SubmissionPayload {
    Quiz { answers: Vec<QuestionSelection> },
    File { file_handle: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuestionSelection {
    pub(crate) question_id: String,
    pub(crate) answer_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) assignment_id: String,
    pub(crate) task_id: String,
    pub(crate) user_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) payload: Json<SubmissionPayload>,
    pub(crate) grade: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) locked: bool,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AssignmentGrade {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) assignment_id: String,
    pub(crate) user_id: String,
    pub(crate) grade: f64,
    pub(crate) max_grade: f64,
    pub(crate) graded_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CourseRun {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) user_id: String,
    pub(crate) status: RunStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct RunStep {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) run_id: String,
    pub(crate) activity_id: String,
    pub(crate) complete: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
