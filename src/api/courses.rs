use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_course_membership, require_course_role, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::CourseRole;
use crate::repositories;
use crate::schemas::course::{
    ActivityCreate, ActivityResponse, ActivityUpdate, ChapterCreate, ChapterResponse,
    ChapterWithActivities,
    CourseCreate, CourseResponse, CourseStructureResponse, InviteCodeCreate, InviteCodeResponse,
    JoinCourseRequest, MembershipResponse,
};
use crate::services::invite_codes;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_course))
        .route("/my", get(list_courses))
        .route("/join", post(join_course))
        .route("/:course_id", get(course_structure))
        .route("/:course_id/members", get(list_members))
        .route("/:course_id/invite-codes", get(list_invite_codes).post(create_invite_code))
        .route("/:course_id/invite-codes/:invite_id", delete(deactivate_invite_code))
        .route("/:course_id/chapters", post(create_chapter))
        .route("/:course_id/activities", post(create_activity))
        .route(
            "/:course_id/activities/:activity_id",
            patch(update_activity).delete(delete_activity),
        )
}

async fn create_course(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<CourseCreate>,
) -> Result<(StatusCode, Json<CourseResponse>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let existing = repositories::courses::exists_by_slug(state.db(), &payload.slug)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check course slug"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Course with this slug already exists".to_string()));
    }

    let now = primitive_now_utc();
    let course = repositories::courses::create(
        state.db(),
        repositories::courses::CreateCourse {
            id: &Uuid::new_v4().to_string(),
            slug: &payload.slug,
            title: &payload.title,
            created_by: &user.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create course"))?;

    // The creator starts as the course's first teacher.
    repositories::course_memberships::upsert(
        state.db(),
        &Uuid::new_v4().to_string(),
        &course.id,
        &user.id,
        CourseRole::Teacher,
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create teacher membership"))?;

    Ok((StatusCode::CREATED, Json(CourseResponse::from_db(course))))
}

async fn list_courses(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseResponse>>, ApiError> {
    let courses = repositories::courses::list_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list courses"))?;

    Ok(Json(courses.into_iter().map(CourseResponse::from_db).collect()))
}

async fn course_structure(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseStructureResponse>, ApiError> {
    require_course_membership(&state, &user, &course_id).await?;

    let course = repositories::courses::find_by_id(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load course"))?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let chapters = repositories::chapters::list_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list chapters"))?;
    let activities = repositories::activities::list_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list activities"))?;

    let chapters = chapters
        .into_iter()
        .map(|chapter| {
            let chapter_activities = activities
                .iter()
                .filter(|activity| activity.chapter_id == chapter.id)
                .cloned()
                .map(ActivityResponse::from_db)
                .collect();
            ChapterWithActivities {
                chapter: ChapterResponse::from_db(chapter),
                activities: chapter_activities,
            }
        })
        .collect();

    Ok(Json(CourseStructureResponse { course: CourseResponse::from_db(course), chapters }))
}

async fn list_members(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<MembershipResponse>>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let memberships = repositories::course_memberships::list_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list course members"))?;

    Ok(Json(memberships.into_iter().map(MembershipResponse::from_db).collect()))
}

async fn join_course(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<JoinCourseRequest>,
) -> Result<(StatusCode, Json<MembershipResponse>), ApiError> {
    let code_hash = invite_codes::hash_invite_code(payload.invite_code.trim());
    let invite = repositories::course_invites::find_active_by_hash(state.db(), &code_hash)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to look up invite code"))?
        .ok_or_else(|| ApiError::NotFound("Invite code is invalid or inactive".to_string()))?;

    let now = primitive_now_utc();
    let membership = repositories::course_memberships::upsert(
        state.db(),
        &Uuid::new_v4().to_string(),
        &invite.course_id,
        &user.id,
        invite.role,
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create membership"))?;

    repositories::course_invites::record_use(state.db(), &invite.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to record invite use"))?;

    Ok((StatusCode::CREATED, Json(MembershipResponse::from_db(membership))))
}

async fn create_invite_code(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(payload): Json<InviteCodeCreate>,
) -> Result<(StatusCode, Json<InviteCodeResponse>), ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let course = repositories::courses::find_by_id(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load course"))?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    let code = invite_codes::generate_invite_code(&course.slug, payload.role);
    let code_hash = invite_codes::hash_invite_code(&code);

    let invite = repositories::course_invites::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        &course_id,
        payload.role,
        &code_hash,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create invite code"))?;

    Ok((StatusCode::CREATED, Json(InviteCodeResponse::from_db(invite, Some(code)))))
}

async fn list_invite_codes(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<InviteCodeResponse>>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let invites = repositories::course_invites::list_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list invite codes"))?;

    Ok(Json(invites.into_iter().map(|invite| InviteCodeResponse::from_db(invite, None)).collect()))
}

async fn deactivate_invite_code(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, invite_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let deactivated =
        repositories::course_invites::deactivate(state.db(), &course_id, &invite_id, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to deactivate invite code"))?;

    if deactivated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Invite code not found".to_string()))
    }
}

async fn create_chapter(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(payload): Json<ChapterCreate>,
) -> Result<(StatusCode, Json<ChapterResponse>), ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    payload.validate().map_err(ApiError::validation)?;

    let chapter = repositories::chapters::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        &course_id,
        &payload.title,
        payload.order_index,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create chapter"))?;

    Ok((StatusCode::CREATED, Json(ChapterResponse::from_db(chapter))))
}

async fn create_activity(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(payload): Json<ActivityCreate>,
) -> Result<(StatusCode, Json<ActivityResponse>), ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    payload.validate().map_err(ApiError::validation)?;

    repositories::chapters::find(state.db(), &course_id, &payload.chapter_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load chapter"))?
        .ok_or_else(|| ApiError::NotFound("Chapter not found".to_string()))?;

    let activity = repositories::activities::create(
        state.db(),
        repositories::activities::CreateActivity {
            id: &Uuid::new_v4().to_string(),
            course_id: &course_id,
            chapter_id: &payload.chapter_id,
            title: &payload.title,
            kind: payload.kind,
            order_index: payload.order_index,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create activity"))?;

    Ok((StatusCode::CREATED, Json(ActivityResponse::from_db(activity))))
}

async fn update_activity(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, activity_id)): Path<(String, String)>,
    Json(payload): Json<ActivityUpdate>,
) -> Result<Json<ActivityResponse>, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;
    payload.validate().map_err(ApiError::validation)?;

    let activity = repositories::activities::update(
        state.db(),
        &course_id,
        &activity_id,
        repositories::activities::UpdateActivity {
            title: payload.title.as_deref(),
            order_index: payload.order_index,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update activity"))?
    .ok_or_else(|| ApiError::NotFound("Activity not found".to_string()))?;

    Ok(Json(ActivityResponse::from_db(activity)))
}

/// Removing an activity takes its assignment, submissions and completion
/// steps with it.
async fn delete_activity(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((course_id, activity_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    require_course_role(&state, &user, &course_id, CourseRole::Teacher).await?;

    let deleted = repositories::activities::delete(state.db(), &course_id, &activity_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete activity"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Activity not found".to_string()))
    }
}
