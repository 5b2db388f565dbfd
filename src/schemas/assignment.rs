use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime};
use validator::Validate;

use crate::core::time::{format_primitive, to_primitive_utc};
use crate::db::models::{Assignment, AssignmentGrade, QuizAnswer, QuizQuestion, Task};
use crate::db::types::{GradingType, QuestionType, TaskKind};

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentCreate {
    #[serde(alias = "gradingType")]
    pub(crate) grading_type: GradingType,
    #[serde(default)]
    #[serde(alias = "dueAt")]
    pub(crate) due_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentUpdate {
    #[serde(default)]
    #[serde(alias = "gradingType")]
    pub(crate) grading_type: Option<GradingType>,
    #[serde(default)]
    #[serde(alias = "dueAt")]
    pub(crate) due_at: Option<String>,
    #[serde(default)]
    #[serde(alias = "clearDueAt")]
    pub(crate) clear_due_at: bool,
}

pub(crate) fn parse_due_at(value: &str) -> Result<PrimitiveDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map(to_primitive_utc)
        .map_err(|_| "due_at must be an RFC 3339 timestamp".to_string())
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) activity_id: String,
    pub(crate) grading_type: GradingType,
    pub(crate) published: bool,
    pub(crate) published_at: Option<String>,
    pub(crate) due_at: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl AssignmentResponse {
    pub(crate) fn from_db(assignment: Assignment) -> Self {
        Self {
            id: assignment.id,
            course_id: assignment.course_id,
            activity_id: assignment.activity_id,
            grading_type: assignment.grading_type,
            published: assignment.published,
            published_at: assignment.published_at.map(format_primitive),
            due_at: assignment.due_at.map(format_primitive),
            created_at: format_primitive(assignment.created_at),
            updated_at: format_primitive(assignment.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct QuizAnswerCreate {
    #[validate(length(min = 1, message = "answer text must not be empty"))]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) correct: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuizQuestionCreate {
    #[validate(length(min = 1, message = "question text must not be empty"))]
    pub(crate) text: String,
    #[serde(default = "default_question_type")]
    #[serde(alias = "questionType")]
    pub(crate) question_type: QuestionType,
    #[validate(length(min = 1, message = "a question needs at least one answer"))]
    #[validate(nested)]
    pub(crate) answers: Vec<QuizAnswerCreate>,
}

fn default_question_type() -> QuestionType {
    QuestionType::MultipleChoice
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TaskCreate {
    pub(crate) kind: TaskKind,
    #[serde(default)]
    #[serde(alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: i32,
    #[serde(alias = "maxGrade")]
    #[validate(range(exclusive_min = 0.0, message = "max_grade must be positive"))]
    pub(crate) max_grade: f64,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<QuizQuestionCreate>,
    #[serde(default)]
    #[serde(alias = "referenceFile")]
    pub(crate) reference_file: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TaskUpdate {
    #[serde(default)]
    #[serde(alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: Option<i32>,
    #[serde(default)]
    #[serde(alias = "maxGrade")]
    #[validate(range(exclusive_min = 0.0, message = "max_grade must be positive"))]
    pub(crate) max_grade: Option<f64>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Option<Vec<QuizQuestionCreate>>,
    #[serde(default)]
    #[serde(alias = "referenceFile")]
    pub(crate) reference_file: Option<String>,
    #[serde(default)]
    #[serde(alias = "clearReferenceFile")]
    pub(crate) clear_reference_file: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizAnswerView {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizQuestionView {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) answers: Vec<QuizAnswerView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) assignment_id: String,
    pub(crate) kind: TaskKind,
    pub(crate) order_index: i32,
    pub(crate) max_grade: f64,
    pub(crate) questions: Vec<QuizQuestionView>,
    pub(crate) reference_file: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl TaskResponse {
    /// Students get the quiz without the answer key; teachers see it whole.
    pub(crate) fn from_db(task: Task, reveal_answers: bool) -> Self {
        let questions = task
            .questions
            .0
            .into_iter()
            .map(|question| question_view(question, reveal_answers))
            .collect();
        Self {
            id: task.id,
            course_id: task.course_id,
            assignment_id: task.assignment_id,
            kind: task.kind,
            order_index: task.order_index,
            max_grade: task.max_grade,
            questions,
            reference_file: task.reference_file,
            created_at: format_primitive(task.created_at),
            updated_at: format_primitive(task.updated_at),
        }
    }
}

fn question_view(question: QuizQuestion, reveal_answers: bool) -> QuizQuestionView {
    QuizQuestionView {
        id: question.id,
        text: question.text,
        question_type: question.question_type,
        answers: question
            .answers
            .into_iter()
            .map(|answer| answer_view(answer, reveal_answers))
            .collect(),
    }
}

fn answer_view(answer: QuizAnswer, reveal_answers: bool) -> QuizAnswerView {
    QuizAnswerView {
        id: answer.id,
        text: answer.text,
        correct: reveal_answers.then_some(answer.correct),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskUpdateResponse {
    #[serde(flatten)]
    pub(crate) task: TaskResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) advisory: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FinalGradeResponse {
    pub(crate) assignment_id: String,
    pub(crate) user_id: String,
    pub(crate) grade: f64,
    pub(crate) max_grade: f64,
    pub(crate) display: String,
    pub(crate) graded_by: String,
    pub(crate) updated_at: String,
}

impl FinalGradeResponse {
    pub(crate) fn from_db(record: AssignmentGrade, grading_type: GradingType) -> Self {
        let display =
            crate::services::grading::display_grade(grading_type, record.grade, record.max_grade);
        Self {
            assignment_id: record.assignment_id,
            user_id: record.user_id,
            grade: record.grade,
            max_grade: record.max_grade,
            display,
            graded_by: record.graded_by,
            updated_at: format_primitive(record.updated_at),
        }
    }
}
