//! Thread-safe in-memory [`SessionStore`] implementation.

// self
use crate::{
	_prelude::*,
	session::{AccessToken, SessionStore},
};

/// Volatile token slot; the whole `Option` is swapped under one write lock.
#[derive(Debug, Default)]
pub struct MemorySessionStore(RwLock<Option<AccessToken>>);
impl MemorySessionStore {
	/// Creates a store seeded with `token`.
	pub fn with_token(token: impl Into<AccessToken>) -> Self {
		Self(RwLock::new(Some(token.into())))
	}
}
impl SessionStore for MemorySessionStore {
	fn get(&self) -> Option<AccessToken> {
		self.0.read().clone()
	}

	fn set(&self, token: AccessToken) {
		*self.0.write() = Some(token);
	}

	fn clear(&self) {
		self.0.write().take();
	}
}
