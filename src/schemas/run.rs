use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::{CourseRun, RunStep};
use crate::db::types::RunStatus;
use crate::services::completion::RunProgress;

#[derive(Debug, Serialize)]
pub(crate) struct RunStepResponse {
    pub(crate) activity_id: String,
    pub(crate) complete: bool,
    pub(crate) completed_at: Option<String>,
}

impl RunStepResponse {
    pub(crate) fn from_db(step: RunStep) -> Self {
        Self {
            activity_id: step.activity_id,
            complete: step.complete,
            completed_at: step.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RunResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) user_id: String,
    pub(crate) status: RunStatus,
    pub(crate) started_at: String,
    pub(crate) completed_at: Option<String>,
    pub(crate) progress: RunProgress,
    pub(crate) steps: Vec<RunStepResponse>,
}

impl RunResponse {
    pub(crate) fn from_db(run: CourseRun, progress: RunProgress, steps: Vec<RunStep>) -> Self {
        Self {
            id: run.id,
            course_id: run.course_id,
            user_id: run.user_id,
            status: run.status,
            started_at: format_primitive(run.started_at),
            completed_at: run.completed_at.map(format_primitive),
            progress,
            steps: steps.into_iter().map(RunStepResponse::from_db).collect(),
        }
    }
}
