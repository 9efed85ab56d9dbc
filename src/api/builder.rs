// self
use crate::{
	_prelude::*,
	api::{ApiDescriptor, SuccessBodyPolicy},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ApiDescriptorError {
	/// Only HTTP(S) base URLs are supported.
	#[error("The base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Base URL that failed validation.
		url: String,
	},
	/// Plain HTTP is limited to loopback hosts unless explicitly allowed.
	#[error("The base URL must use HTTPS for non-loopback hosts: {url}.")]
	InsecureBaseUrl {
		/// Base URL that failed validation.
		url: String,
	},
	/// Query strings and fragments belong to individual requests.
	#[error("The base URL must not carry a query or fragment: {url}.")]
	BaseUrlHasQuery {
		/// Base URL that failed validation.
		url: String,
	},
	/// Endpoint paths must be absolute.
	#[error("The {endpoint} path must start with `/`: {path}.")]
	InvalidPath {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
	},
	/// Deadlines must be strictly positive.
	#[error("The request timeout must be positive.")]
	NonPositiveTimeout,
	/// The refresh response field name cannot be blank.
	#[error("The access token field name must not be empty.")]
	EmptyAccessTokenField,
}

/// Builder for [`ApiDescriptor`] values.
#[derive(Debug)]
pub struct ApiDescriptorBuilder {
	/// Base URL every request path is appended to.
	pub base_url: Url,
	/// Refresh endpoint path.
	pub refresh_path: String,
	/// Session probe endpoint path.
	pub session_probe_path: String,
	/// Per-call deadline.
	pub timeout: Duration,
	/// JSON field holding the access token in refresh responses.
	pub access_token_field: String,
	/// Treatment of unparseable success bodies.
	pub success_body_policy: SuccessBodyPolicy,
	/// Permits plain HTTP for non-loopback hosts.
	pub allow_insecure_http: bool,
}
impl ApiDescriptorBuilder {
	/// Creates a new builder seeded with the provided base URL and defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			refresh_path: ApiDescriptor::DEFAULT_REFRESH_PATH.into(),
			session_probe_path: ApiDescriptor::DEFAULT_SESSION_PROBE_PATH.into(),
			timeout: ApiDescriptor::DEFAULT_TIMEOUT,
			access_token_field: ApiDescriptor::DEFAULT_ACCESS_TOKEN_FIELD.into(),
			success_body_policy: SuccessBodyPolicy::default(),
			allow_insecure_http: false,
		}
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the session probe endpoint path.
	pub fn session_probe_path(mut self, path: impl Into<String>) -> Self {
		self.session_probe_path = path.into();

		self
	}

	/// Overrides the per-call deadline (defaults to 10 seconds).
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the refresh response field carrying the access token.
	pub fn access_token_field(mut self, field: impl Into<String>) -> Self {
		self.access_token_field = field.into();

		self
	}

	/// Overrides the success body policy.
	pub fn success_body_policy(mut self, policy: SuccessBodyPolicy) -> Self {
		self.success_body_policy = policy;

		self
	}

	/// Allows plain HTTP base URLs on any host.
	pub fn allow_insecure_http(mut self, allow: bool) -> Self {
		self.allow_insecure_http = allow;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ApiDescriptor, ApiDescriptorError> {
		validate_base_url(&self.base_url, self.allow_insecure_http)?;
		validate_path("refresh", &self.refresh_path)?;
		validate_path("session probe", &self.session_probe_path)?;

		if !self.timeout.is_positive() {
			return Err(ApiDescriptorError::NonPositiveTimeout);
		}
		if self.access_token_field.trim().is_empty() {
			return Err(ApiDescriptorError::EmptyAccessTokenField);
		}

		Ok(ApiDescriptor {
			base_url: self.base_url,
			refresh_path: self.refresh_path,
			session_probe_path: self.session_probe_path,
			timeout: self.timeout,
			access_token_field: self.access_token_field,
			success_body_policy: self.success_body_policy,
		})
	}
}

fn validate_base_url(url: &Url, allow_insecure_http: bool) -> Result<(), ApiDescriptorError> {
	match url.scheme() {
		"https" => {},
		"http" if allow_insecure_http || is_loopback(url) => {},
		"http" => return Err(ApiDescriptorError::InsecureBaseUrl { url: url.to_string() }),
		_ => return Err(ApiDescriptorError::UnsupportedScheme { url: url.to_string() }),
	}

	if url.query().is_some() || url.fragment().is_some() {
		return Err(ApiDescriptorError::BaseUrlHasQuery { url: url.to_string() });
	}

	Ok(())
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

fn validate_path(endpoint: &'static str, path: &str) -> Result<(), ApiDescriptorError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(ApiDescriptorError::InvalidPath { endpoint, path: path.to_owned() })
	}
}
