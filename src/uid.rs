use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a holder in log messages and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(u64);

/// Handle returned by `follow`, pass it back to `unfollow` to remove the follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FollowerId(u64);

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

impl HolderId {
    pub(crate) fn next() -> HolderId {
        HolderId(next_uid())
    }
}

impl FollowerId {
    pub(crate) fn next() -> FollowerId {
        FollowerId(next_uid())
    }
}

impl Display for HolderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
