#![forbid(unsafe_code)]

//! Cancellation of async handler tasks.
//!
//! The engine holds one [`CancellationSource`] per async task, tagged with
//! the task's [`TaskId`]. The worker and the handler body (through
//! [`Handler::cancellable`]) see it as a [`CancellationToken`]. A task is
//! cancelled at most once, and the token remembers why:
//!
//! | [`CancelReason`] | Raised by |
//! |---|---|
//! | `Superseded` | a newer async event under [`SupersedePolicy::CancelPrevious`] |
//! | `Disposed` | [`Session::dispose`] or dropping the session |
//! | `Dropped` | the engine releasing a task handle it no longer tracks |
//!
//! Cancellation is cooperative. The worker checks the token around every
//! pull from the handler's stream and never delivers an item produced
//! after it. Long handler steps can poll [`CancellationToken::is_cancelled`]
//! or pace themselves with [`CancellationToken::sleep`], which returns
//! early once the task is cancelled.
//!
//! [`Handler::cancellable`]: crate::handler::Handler::cancellable
//! [`SupersedePolicy::CancelPrevious`]: crate::config::SupersedePolicy::CancelPrevious
//! [`Session::dispose`]: crate::Session::dispose
//!
//! # Example
//!
//! ```
//! use rebind_runtime::cancellation::{CancelReason, CancellationSource};
//! use std::time::Duration;
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//!
//! let worker = std::thread::spawn(move || {
//!     while !token.sleep(Duration::from_millis(5)) {}
//!     token.reason()
//! });
//!
//! assert!(source.cancel(CancelReason::Disposed));
//! assert_eq!(worker.join().unwrap(), Some(CancelReason::Disposed));
//! ```

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use web_time::Duration;

use crate::task::TaskId;

/// Why an async task was stopped before its stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// A newer async event replaced it.
    Superseded,
    /// The session was disposed.
    Disposed,
    /// The engine let go of the task handle.
    Dropped,
}

struct TaskState {
    task: Option<TaskId>,
    reason: Mutex<Option<CancelReason>>,
    cancelled: Condvar,
}

impl TaskState {
    fn reason(&self) -> MutexGuard<'_, Option<CancelReason>> {
        self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Engine-side handle that cancels one task.
///
/// Dropping the source does not cancel; the engine cancels explicitly so a
/// run-to-completion task outlives its bookkeeping.
pub struct CancellationSource {
    state: Arc<TaskState>,
}

/// Thread-safe, cloneable view of one task's cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TaskState>,
}

impl CancellationSource {
    /// A source not tied to any engine task.
    #[must_use]
    pub fn new() -> Self {
        Self::tagged(None)
    }

    pub(crate) fn for_task(task: TaskId) -> Self {
        Self::tagged(Some(task))
    }

    fn tagged(task: Option<TaskId>) -> Self {
        Self {
            state: Arc::new(TaskState {
                task,
                reason: Mutex::new(None),
                cancelled: Condvar::new(),
            }),
        }
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            state: Arc::clone(&self.state),
        }
    }

    /// Cancel for `reason` and wake every sleeping token. Returns `false`
    /// if the task was already cancelled; the first reason is kept.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut current = self.state.reason();
        if current.is_some() {
            return false;
        }
        *current = Some(reason);
        self.state.cancelled.notify_all();
        true
    }

    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        *self.state.reason()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("task", &self.state.task)
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// A token whose task is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        CancellationSource::new().token()
    }

    /// The async task this token belongs to, if any.
    #[must_use]
    pub fn task(&self) -> Option<TaskId> {
        self.state.task
    }

    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        *self.state.reason()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Sleep up to `duration`, returning early if the task is cancelled.
    /// Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let reason = self.state.reason();
        let (reason, _) = self
            .state
            .cancelled
            .wait_timeout_while(reason, duration, |reason| reason.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        reason.is_some()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("task", &self.state.task)
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn cancel_reaches_every_token() {
        let source = CancellationSource::for_task(3);
        let a = source.token();
        let b = a.clone();
        assert!(!a.is_cancelled());
        assert!(source.cancel(CancelReason::Superseded));
        assert_eq!(a.reason(), Some(CancelReason::Superseded));
        assert!(b.is_cancelled());
        assert_eq!(b.task(), Some(3));
    }

    #[test]
    fn first_reason_wins() {
        let source = CancellationSource::new();
        assert!(source.cancel(CancelReason::Superseded));
        assert!(!source.cancel(CancelReason::Disposed));
        assert_eq!(source.reason(), Some(CancelReason::Superseded));
    }

    #[test]
    fn dropping_source_does_not_cancel() {
        let source = CancellationSource::new();
        let token = source.token();
        drop(source);
        assert!(!token.is_cancelled());
        assert_eq!(token.task(), None);
    }

    #[test]
    fn never_token_sleeps_full_duration() {
        let token = CancellationToken::never();
        let start = web_time::Instant::now();
        assert!(!token.sleep(Duration::from_millis(5)));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let source = CancellationSource::for_task(8);
        let token = source.token();
        let sleeper = thread::spawn(move || token.sleep(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        source.cancel(CancelReason::Disposed);
        assert!(sleeper.join().unwrap());
    }

    #[test]
    fn sleep_after_cancel_returns_immediately() {
        let source = CancellationSource::default();
        source.cancel(CancelReason::Dropped);
        assert!(source.token().sleep(Duration::from_secs(10)));
    }
}
