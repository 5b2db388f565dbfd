pub(crate) mod activities;
pub(crate) mod assignment_grades;
pub(crate) mod assignments;
pub(crate) mod chapters;
pub(crate) mod course_invites;
pub(crate) mod course_memberships;
pub(crate) mod courses;
pub(crate) mod runs;
pub(crate) mod submissions;
pub(crate) mod tasks;
pub(crate) mod users;
