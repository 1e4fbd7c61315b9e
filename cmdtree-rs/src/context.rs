//! Cooperative cancellation for command actions.
//!
//! A [`Context`] is a cloneable handle that can be canceled once, with a
//! [`Cause`]. Canceling never interrupts anything by itself: actions that
//! spawn their own work observe the handle through [`Context::is_cancelled`]
//! or by awaiting [`Context::cancelled`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why a [`Context`] was canceled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// Canceled without an error, e.g. because the dispatch finished cleanly.
    Canceled,

    /// Canceled because of the error with this description.
    Failed(String),
}

impl Cause {
    /// The cause recorded when a dispatch call returns `result`.
    pub fn from_result<T, E: fmt::Display>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Cause::Canceled,
            Err(e) => Cause::Failed(e.to_string()),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Canceled => write!(f, "context canceled"),
            Cause::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

/// Cancellable execution handle.
///
/// Wraps a [`CancellationToken`] and remembers the [`Cause`] it was
/// canceled with. Handles made by [`Context::child`] are canceled along with
/// their parent and report the parent's cause unless they were canceled
/// first.
///
/// # Example
///
/// ```
/// use cmdtree::{Cause, Context};
///
/// let parent = Context::new();
/// let child = parent.child();
/// parent.cancel(Cause::Failed("shutting down".into()));
///
/// assert!(child.is_cancelled());
/// assert_eq!(child.cause(), Some(Cause::Failed("shutting down".into())));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    token: CancellationToken,
    cause: Arc<OnceLock<Cause>>,
    parent: Option<Box<Context>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new handle canceled together with this one (but not vice versa).
    pub fn child(&self) -> Context {
        Context {
            token: self.token.child_token(),
            cause: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Cancel this handle and its children. Returns `false` if it was
    /// already canceled, in which case the original cause is kept.
    pub fn cancel(&self, cause: Cause) -> bool {
        if self.token.is_cancelled() || self.cause.set(cause).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cause(&self) -> Option<Cause> {
        if !self.token.is_cancelled() {
            return None;
        }
        match self.cause.get() {
            Some(cause) => Some(cause.clone()),
            None => self.parent.as_ref().and_then(|p| p.cause()),
        }
    }

    /// Wait until the handle is canceled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The underlying token, e.g. for `tokio::select!`.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether two handles share the same state.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cause", &self.cause())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_one_shot() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());
        assert!(ctx.cancel(Cause::Failed("first".into())));
        assert!(!ctx.cancel(Cause::Canceled));
        assert_eq!(ctx.cause(), Some(Cause::Failed("first".into())));
    }

    #[test]
    fn test_child_of_canceled_parent_starts_canceled() {
        let parent = Context::new();
        parent.cancel(Cause::Canceled);
        let child = parent.child();
        assert_eq!(child.cause(), Some(Cause::Canceled));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel(Cause::Canceled);
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_cause_from_result() {
        let ok: Result<(), String> = Ok(());
        assert_eq!(Cause::from_result(&ok), Cause::Canceled);
        let err: Result<(), String> = Err("boom".into());
        assert_eq!(Cause::from_result(&err), Cause::Failed("boom".into()));
        assert_eq!(Cause::Canceled.to_string(), "context canceled");
    }

    #[test]
    fn test_child_keeps_its_own_cause() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel(Cause::Failed("child".into()));
        parent.cancel(Cause::Canceled);
        assert_eq!(child.cause(), Some(Cause::Failed("child".into())));
        assert_eq!(parent.cause(), Some(Cause::Canceled));
        assert!(!parent.child().same_as(&parent.child()));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let ctx = Context::new();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        ctx.cancel(Cause::Canceled);
        task.await.unwrap();
    }
}
