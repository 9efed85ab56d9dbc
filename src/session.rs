//! Session state contracts: the access token store and the session-end listener.
//!
//! [`SessionStore`] is the single source of truth for the current [`AccessToken`]. It performs
//! no I/O and knows nothing about requests in flight, which keeps the orchestrator and the
//! refresh coordinator testable in isolation. [`SessionListener`] is how the host (usually the
//! UI layer) learns that the session ended and it should navigate to an unauthenticated
//! entry point.

pub mod memory;
pub mod token;

pub use memory::MemorySessionStore;
pub use token::AccessToken;

// self
use crate::{_prelude::*, error::RefreshFailure};

/// Storage contract for the current access token.
///
/// Implementations must replace the stored value atomically: a concurrent `get` observes
/// either the previous token or the new one, never a mix.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Returns the current token, if any.
	fn get(&self) -> Option<AccessToken>;

	/// Replaces the stored token.
	fn set(&self, token: AccessToken);

	/// Removes the stored token.
	fn clear(&self);
}

/// Reason the client abandoned the current session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
	/// The refresh operation failed; every waiter received the same failure.
	RefreshFailed(RefreshFailure),
	/// A direct call to the refresh endpoint was rejected with 401.
	RefreshRejected,
	/// A call still answered 401 after one refresh-and-retry cycle.
	AuthExpired,
	/// The host asked to sign out.
	LoggedOut,
}
impl SessionEnd {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			SessionEnd::RefreshFailed(_) => "refresh_failed",
			SessionEnd::RefreshRejected => "refresh_rejected",
			SessionEnd::AuthExpired => "auth_expired",
			SessionEnd::LoggedOut => "logged_out",
		}
	}
}
impl Display for SessionEnd {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Host hook notified when the session ends.
///
/// Navigation is left to the implementation; the client only reports the reason.
pub trait SessionListener
where
	Self: Send + Sync,
{
	/// Called once per terminated session.
	fn on_session_end(&self, reason: &SessionEnd);
}

/// Listener that ignores every signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSessionListener;
impl SessionListener for NoopSessionListener {
	fn on_session_end(&self, _reason: &SessionEnd) {}
}
