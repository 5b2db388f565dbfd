use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Activity, Chapter, Course, CourseInviteCode, CourseMembership};
use crate::db::types::{ActivityKind, CourseRole, MembershipStatus};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CourseCreate {
    #[validate(length(min = 1, max = 64, message = "slug must be 1-64 characters"))]
    pub(crate) slug: String,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CourseResponse {
    pub(crate) id: String,
    pub(crate) slug: String,
    pub(crate) title: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: String,
}

impl CourseResponse {
    pub(crate) fn from_db(course: Course) -> Self {
        Self {
            id: course.id,
            slug: course.slug,
            title: course.title,
            is_active: course.is_active,
            created_at: format_primitive(course.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ChapterCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    #[serde(alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChapterResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) order_index: i32,
    pub(crate) created_at: String,
}

impl ChapterResponse {
    pub(crate) fn from_db(chapter: Chapter) -> Self {
        Self {
            id: chapter.id,
            course_id: chapter.course_id,
            title: chapter.title,
            order_index: chapter.order_index,
            created_at: format_primitive(chapter.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ActivityCreate {
    #[serde(alias = "chapterId")]
    pub(crate) chapter_id: String,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    pub(crate) kind: ActivityKind,
    #[serde(default)]
    #[serde(alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ActivityUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    #[serde(alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ActivityResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) chapter_id: String,
    pub(crate) title: String,
    pub(crate) kind: ActivityKind,
    pub(crate) order_index: i32,
    pub(crate) created_at: String,
}

impl ActivityResponse {
    pub(crate) fn from_db(activity: Activity) -> Self {
        Self {
            id: activity.id,
            course_id: activity.course_id,
            chapter_id: activity.chapter_id,
            title: activity.title,
            kind: activity.kind,
            order_index: activity.order_index,
            created_at: format_primitive(activity.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChapterWithActivities {
    #[serde(flatten)]
    pub(crate) chapter: ChapterResponse,
    pub(crate) activities: Vec<ActivityResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CourseStructureResponse {
    #[serde(flatten)]
    pub(crate) course: CourseResponse,
    pub(crate) chapters: Vec<ChapterWithActivities>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JoinCourseRequest {
    #[serde(alias = "inviteCode")]
    pub(crate) invite_code: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct MembershipResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) user_id: String,
    pub(crate) role: CourseRole,
    pub(crate) status: MembershipStatus,
    pub(crate) joined_at: String,
}

impl MembershipResponse {
    pub(crate) fn from_db(membership: CourseMembership) -> Self {
        Self {
            id: membership.id,
            course_id: membership.course_id,
            user_id: membership.user_id,
            role: membership.role,
            status: membership.status,
            joined_at: format_primitive(membership.joined_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InviteCodeCreate {
    pub(crate) role: CourseRole,
}

/// The plaintext code is returned once, at creation. Listings only carry
/// metadata since the code itself is stored hashed.
#[derive(Debug, Serialize)]
pub(crate) struct InviteCodeResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) role: CourseRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) usage_count: i64,
    pub(crate) created_at: String,
}

impl InviteCodeResponse {
    pub(crate) fn from_db(invite: CourseInviteCode, code: Option<String>) -> Self {
        Self {
            id: invite.id,
            course_id: invite.course_id,
            role: invite.role,
            code,
            is_active: invite.is_active,
            usage_count: invite.usage_count,
            created_at: format_primitive(invite.created_at),
        }
    }
}
