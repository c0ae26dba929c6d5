//! Classification of unauthorized answers

use request::{Attempt, RequestKind};

/// What to do with a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Park the request behind a renewal (starting one if none is running).
    Renew,
    /// Surface the 401 directly; this kind of request never renews.
    Exempt,
    /// Already replayed once after a renewal; give up.
    Exhausted,
}

pub fn classify_unauthorized(kind: RequestKind, attempt: Attempt) -> Recovery {
    if !kind.may_trigger_renewal() {
        return Recovery::Exempt;
    }
    if attempt.is_replay() {
        return Recovery::Exhausted;
    }
    Recovery::Renew
}
