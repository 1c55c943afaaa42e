#![forbid(unsafe_code)]

//! Cooperative cancellation tokens for scheduled work.
//!
//! A [`CancelToken`] is a cheap handle that queued work carries along with
//! it. The scheduler checks the token immediately before a task runs; a
//! cancelled token means the task is skipped. Work that has already started
//! is never interrupted.
//!
//! - **Explicit cancellation**: only the companion [`CancelController`] can
//!   cancel a token. Dropping the controller does not cancel anything.
//! - **Scoped cancellation**: [`CancelToken::child`] derives a token that is
//!   cancelled whenever any ancestor is, so a directive can hand per-binding
//!   tokens out of one scope token and tear them all down at once.
//!
//! # Example
//!
//! ```
//! use pathwire_core::cancel::CancelToken;
//!
//! let (token, ctrl) = CancelToken::new();
//! let (child, _child_ctrl) = token.child();
//! assert!(!child.is_cancelled());
//!
//! ctrl.cancel();
//! assert!(token.is_cancelled());
//! assert!(child.is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// ─── Token ID generation ─────────────────────────────────────────────────────

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

fn next_token_id() -> u64 {
    NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Metrics counters ────────────────────────────────────────────────────────

/// Total number of token cancellations observed.
static CANCELLATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total cancellation count (for diagnostics).
#[must_use]
pub fn cancellations_total() -> u64 {
    CANCELLATIONS_TOTAL.load(Ordering::Relaxed)
}

// ─── Inner shared state ──────────────────────────────────────────────────────

#[derive(Debug)]
struct TokenInner {
    id: u64,
    cancelled: AtomicBool,
    parent: Option<Arc<TokenInner>>,
}

impl TokenInner {
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }
}

// ─── CancelToken ─────────────────────────────────────────────────────────────

/// Cancellation token handle.
///
/// Cheaply cloneable. All clones observe the same cancellation state.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a root token and the controller that cancels it.
    #[must_use]
    pub fn new() -> (Self, CancelController) {
        Self::new_inner(None)
    }

    /// Derive a child token. Cancelling this token (or any ancestor) also
    /// cancels the child; cancelling the child leaves the parent live.
    #[must_use]
    pub fn child(&self) -> (Self, CancelController) {
        Self::new_inner(Some(Arc::clone(&self.inner)))
    }

    fn new_inner(parent: Option<Arc<TokenInner>>) -> (Self, CancelController) {
        let inner = Arc::new(TokenInner {
            id: next_token_id(),
            cancelled: AtomicBool::new(false),
            parent,
        });
        let token = Self {
            inner: Arc::clone(&inner),
        };
        (token, CancelController { inner })
    }

    /// Unique identifier for this token (for logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Check if this token (or any ancestor) has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Return `Err` if the token has been cancelled.
    ///
    /// Intended for use at yield points inside long-running tasks:
    /// ```ignore
    /// token.check()?;
    /// ```
    pub fn check(&self) -> Result<(), CancelError> {
        if self.is_cancelled() {
            return Err(CancelError::Cancelled { token: self.id() });
        }
        Ok(())
    }
}

// ─── CancelController ────────────────────────────────────────────────────────

/// Control handle for a [`CancelToken`].
///
/// Held by the owner of the token to trigger cancellation.
#[derive(Debug)]
pub struct CancelController {
    inner: Arc<TokenInner>,
}

impl CancelController {
    /// Cancel the associated token and every token derived from it.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::Release);
        if !was_cancelled {
            CANCELLATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(token = self.inner.id, "cancel token cancelled");
        }
    }

    /// Whether this controller's own token has been cancelled.
    ///
    /// Ancestor cancellation is not reflected here; ask the token.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// A fresh token handle bound to this controller.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ─── CancelError ─────────────────────────────────────────────────────────────

/// Error returned by [`CancelToken::check`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// The token was explicitly cancelled.
    #[error("token {token} cancelled")]
    Cancelled {
        /// Id of the token that was checked.
        token: u64,
    },
}

// ─── Tests ───────────────────────────────────────────────────────────────────
