//! Stack and resource status groups.

pub const DELETE_COMPLETE: &str = "DELETE_COMPLETE";
pub const DELETE_FAILED: &str = "DELETE_FAILED";
pub const UPDATE_IN_PROGRESS: &str = "UPDATE_IN_PROGRESS";

/// Terminal statuses that end a wait successfully.
pub const SUCCESS: &[&str] = &["CREATE_COMPLETE", "UPDATE_COMPLETE", DELETE_COMPLETE];

/// Statuses that keep a wait going.
pub const IN_PROGRESS: &[&str] = &[
    "CREATE_IN_PROGRESS",
    "ROLLBACK_IN_PROGRESS",
    "DELETE_IN_PROGRESS",
    UPDATE_IN_PROGRESS,
    "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
    "UPDATE_ROLLBACK_IN_PROGRESS",
    "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
];

/// Statuses from which an update may be started.
pub const STABLE: &[&str] = &[
    "CREATE_COMPLETE",
    "ROLLBACK_COMPLETE",
    "UPDATE_COMPLETE",
    "UPDATE_ROLLBACK_COMPLETE",
];

/// Resource statuses that carry a failure reason.
pub const FAILING_RESOURCE: &[&str] = &["CREATE_FAILED", "UPDATE_FAILED", DELETE_FAILED];

pub fn is_success(status: &str) -> bool {
    SUCCESS.contains(&status)
}

pub fn is_in_progress(status: &str) -> bool {
    IN_PROGRESS.contains(&status)
}

pub fn is_stable(status: &str) -> bool {
    STABLE.contains(&status)
}

pub fn is_failing_resource(status: &str) -> bool {
    FAILING_RESOURCE.contains(&status)
}
