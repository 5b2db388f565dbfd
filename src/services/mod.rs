pub(crate) mod completion;
pub(crate) mod grading;
pub(crate) mod invite_codes;
