//! Single-flight session refresh.
//!
//! [`RefreshCoordinator`] owns one slot for "the refresh operation currently in flight". The
//! first caller that needs a new access token creates the operation and stores a shared
//! handle in the slot inside the same synchronous critical section, before anything is
//! awaited; every later caller clones that handle, so N concurrent 401s cost exactly one
//! `POST /auth/refresh` and all N observe its single result. The operation writes the new
//! token to the [`SessionStore`] (or clears it on failure), releases the slot, and only then
//! yields its result, so a settled operation is never reused.
//!
//! The handle is a [`Shared`] future: dropping one waiter does not cancel the refresh for the
//! others, because every remaining clone keeps driving it.
//!
//! A failed operation is remembered together with the token it was meant to replace. A call
//! rejected while still carrying that token receives the same failure instead of starting a
//! second refresh, so a failure ends the session exactly once.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::task::{Context, Poll};
// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	api::ApiDescriptor,
	client::dispatch,
	error::RefreshFailure,
	obs::{self, CallKind, CallOutcome, CallSpan, trace_event},
	request::RequestDescriptor,
	session::{AccessToken, SessionEnd, SessionListener, SessionStore},
	transport::HttpTransport,
};

type RefreshResult = Result<AccessToken, RefreshFailure>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;
type ListenerCell = Arc<RwLock<Arc<dyn SessionListener>>>;

#[derive(Default)]
struct RefreshSlot {
	next_generation: u64,
	active: Option<ActiveRefresh>,
	last_failure: Option<SettledFailure>,
}

struct SettledFailure {
	replaced: AccessToken,
	failure: RefreshFailure,
}

struct ActiveRefresh {
	generation: u64,
	operation: SharedRefresh,
}

/// Awaitable handle on a refresh result.
///
/// Handles obtained while an operation is in flight all resolve to that operation's result.
#[must_use = "a refresh handle does nothing unless awaited"]
pub struct RefreshHandle(HandleState);
enum HandleState {
	Ready(Option<RefreshResult>),
	Shared(SharedRefresh),
}
impl RefreshHandle {
	/// Returns `true` when the handle waits on a shared network operation.
	pub fn is_shared(&self) -> bool {
		matches!(self.0, HandleState::Shared(_))
	}
}
impl Future for RefreshHandle {
	type Output = RefreshResult;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match &mut self.get_mut().0 {
			HandleState::Ready(result) =>
				Poll::Ready(result.take().unwrap_or(Err(RefreshFailure::MissingToken))),
			HandleState::Shared(operation) => Pin::new(operation).poll(cx),
		}
	}
}
impl Debug for RefreshHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = if self.is_shared() { "shared" } else { "ready" };

		f.debug_tuple("RefreshHandle").field(&state).finish()
	}
}

/// Coordinates refresh calls so at most one is in flight at any time.
pub struct RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	session: Arc<dyn SessionStore>,
	listener: ListenerCell,
	descriptor: Arc<ApiDescriptor>,
	metrics: Arc<RefreshMetrics>,
	slot: Arc<Mutex<RefreshSlot>>,
}
impl<T> RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a coordinator writing to `session` and reporting to `listener`.
	pub fn new(
		transport: Arc<T>,
		session: Arc<dyn SessionStore>,
		listener: Arc<dyn SessionListener>,
		descriptor: Arc<ApiDescriptor>,
	) -> Self {
		Self {
			transport,
			session,
			listener: Arc::new(RwLock::new(listener)),
			descriptor,
			metrics: Default::default(),
			slot: Default::default(),
		}
	}

	/// Returns the refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Replaces the hook notified when the session ends.
	///
	/// Every client clone sharing this coordinator observes the new listener.
	pub fn set_listener(&self, listener: Arc<dyn SessionListener>) {
		*self.listener.write() = listener;
	}

	/// Returns `true` while a refresh operation is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.slot.lock().active.is_some()
	}

	/// Joins the in-flight refresh, or starts one when none is active.
	pub fn refresh(&self) -> RefreshHandle {
		let mut slot = self.slot.lock();

		self.join_or_start(&mut slot)
	}

	/// Refresh entry point for a call that was rejected while carrying `stale`.
	///
	/// When no operation is in flight and the store already holds a different token, another
	/// caller finished a refresh after `stale` was sent; that token is handed back without a
	/// new network call. When the last refresh failed while replacing `stale`, its failure is
	/// handed back instead.
	pub fn recover(&self, stale: Option<&AccessToken>) -> RefreshHandle {
		let mut slot = self.slot.lock();

		if slot.active.is_none() {
			match self.session.get() {
				Some(current) if Some(&current) != stale => {
					self.metrics.record_reuse();

					return RefreshHandle(HandleState::Ready(Some(Ok(current))));
				},
				Some(_) => {},
				None => {
					let settled = slot
						.last_failure
						.as_ref()
						.filter(|settled| Some(&settled.replaced) == stale)
						.map(|settled| settled.failure.clone());

					if let Some(failure) = settled {
						return RefreshHandle(HandleState::Ready(Some(Err(failure))));
					}
				},
			}
		}

		self.join_or_start(&mut slot)
	}

	/// Stores a token obtained outside the refresh flow (e.g. sign-in).
	pub fn establish(&self, token: AccessToken) {
		self.slot.lock().last_failure = None;
		self.session.set(token);
	}

	/// Clears the session and notifies the listener.
	pub fn abandon(&self, reason: SessionEnd) {
		self.session.clear();
		end_session(&self.listener, &reason);
	}

	fn join_or_start(&self, slot: &mut RefreshSlot) -> RefreshHandle {
		if let Some(active) = slot.active.as_ref() {
			self.metrics.record_join();

			return RefreshHandle(HandleState::Shared(active.operation.clone()));
		}

		let generation = slot.next_generation;

		slot.next_generation = slot.next_generation.wrapping_add(1);

		let operation = self.start(generation, self.session.get());

		slot.active = Some(ActiveRefresh { generation, operation: operation.clone() });

		RefreshHandle(HandleState::Shared(operation))
	}

	fn start(&self, generation: u64, replacing: Option<AccessToken>) -> SharedRefresh {
		const KIND: CallKind = CallKind::Refresh;

		let transport = self.transport.clone();
		let session = self.session.clone();
		let listener = self.listener.clone();
		let descriptor = self.descriptor.clone();
		let metrics = self.metrics.clone();
		let slot = self.slot.clone();
		let span = CallSpan::new(KIND, "refresh");

		async move {
			obs::record_call_outcome(KIND, CallOutcome::Attempt);
			metrics.record_attempt();

			let result = span.instrument(fetch_token(transport.as_ref(), &descriptor)).await;

			match &result {
				Ok(token) => {
					session.set(token.clone());
					metrics.record_success();
					obs::record_call_outcome(KIND, CallOutcome::Success);
				},
				Err(_) => {
					session.clear();
					metrics.record_failure();
					obs::record_call_outcome(KIND, CallOutcome::Failure);
				},
			}

			settle(&slot, generation, replacing, &result);

			if let Err(failure) = &result {
				end_session(&listener, &SessionEnd::RefreshFailed(failure.clone()));
			}

			result
		}
		.boxed()
		.shared()
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("refreshing", &self.is_refreshing())
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn settle(
	slot: &Mutex<RefreshSlot>,
	generation: u64,
	replacing: Option<AccessToken>,
	result: &RefreshResult,
) {
	let mut slot = slot.lock();

	if slot.active.as_ref().is_some_and(|active| active.generation == generation) {
		slot.active = None;
	}

	slot.last_failure = match (result, replacing) {
		(Err(failure), Some(replaced)) =>
			Some(SettledFailure { replaced, failure: failure.clone() }),
		_ => None,
	};
}

fn end_session(listener: &RwLock<Arc<dyn SessionListener>>, reason: &SessionEnd) {
	// Cloned out so the listener may swap itself without deadlocking.
	let listener = listener.read().clone();

	obs::record_session_end(reason.as_str());
	trace_event!(reason = reason.as_str(), "session ended");
	listener.on_session_end(reason);
}

async fn fetch_token<T>(transport: &T, descriptor: &ApiDescriptor) -> RefreshResult
where
	T: ?Sized + HttpTransport,
{
	let request = RequestDescriptor::post(descriptor.refresh_path.as_str());
	let outbound = dispatch::assemble(descriptor, &request, None)
		.map_err(|e| RefreshFailure::Transport { message: e.to_string() })?;
	let response = transport.send(outbound).await?;

	if !response.status.is_success() {
		return Err(RefreshFailure::Status { status: response.status.as_u16() });
	}

	extract_token(&response.body, &descriptor.access_token_field)
		.ok_or(RefreshFailure::MissingToken)
}

/// Reads the token from `field`, falling back to `access_token`, at the top level or under
/// a `data` envelope.
fn extract_token(body: &[u8], field: &str) -> Option<AccessToken> {
	let payload = serde_json::from_slice::<Value>(body).ok()?;
	let scopes = [Some(&payload), payload.get("data")];

	scopes.into_iter().flatten().find_map(|scope| {
		[field, "access_token"]
			.into_iter()
			.find_map(|name| scope.get(name)?.as_str().filter(|token| !token.is_empty()))
			.map(AccessToken::new)
	})
}
