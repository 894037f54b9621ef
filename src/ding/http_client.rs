//! handles outbound http requests to record prometheus meters
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use super::DingError;

/// header carrying the access token for the v1.0 api
pub const ACCESS_TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

#[derive(Debug, Clone)]
/// prometheus meters for the outbound http client
struct Metrics {
	/// total number of http requests
	http_requests: IntCounterVec,
	/// total number of failed http requests
	http_requests_failed: IntCounterVec,
	/// time spent by http requests
	http_request_duration: HistogramVec,
}

impl Metrics {
	/// construct and register prometheus meters
	pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		use prometheus::{exponential_buckets, histogram_opts, opts};

		let http_requests = IntCounterVec::new(
			opts!("requests_total", "total number of http requests")
				.namespace("alertding")
				.subsystem("http_client"),
			&["host"],
		)?;
		registry.register(Box::new(http_requests.clone()))?;

		let http_requests_failed = IntCounterVec::new(
			opts!("requests_failed", "number of failed http requests")
				.namespace("alertding")
				.subsystem("http_client"),
			&["host", "status_code"],
		)?;
		registry.register(Box::new(http_requests_failed.clone()))?;

		let http_request_duration = HistogramVec::new(
			histogram_opts!(
				"request_duration_seconds",
				"total time of a http request in seconds",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("alertding")
			.subsystem("http_client"),
			&["host"],
		)?;
		registry.register(Box::new(http_request_duration.clone()))?;

		Ok(Self { http_requests, http_requests_failed, http_request_duration })
	}
}

#[derive(Debug, Clone)]
/// Shared http client for the dingtalk api and robot webhooks. Doesn't retry,
/// failed requests are reported to the caller.
pub struct Client {
	/// http client
	client: reqwest::Client,
	/// prometheus meters for http requests
	metrics: Metrics,
}

impl Client {
	/// construct http client
	///
	/// * `timeout` - upper bound for every request
	///
	/// * `registry` - where the http meters get registered
	pub fn new(timeout: Duration, registry: &Registry) -> Result<Self> {
		Ok(Self {
			client: reqwest::Client::builder()
				.timeout(timeout)
				.build()
				.context("failed to build reqwest client")?,
			metrics: Metrics::new(registry).context("failed to register prometheus meters")?,
		})
	}

	/// POST `body` as json to `url`
	///
	/// * `access_token` - sent in the [ACCESS_TOKEN_HEADER] header if present
	pub async fn post_json<B: Serialize + ?Sized>(
		&self,
		url: &Url,
		access_token: Option<&str>,
		body: &B,
	) -> Result<Response, DingError> {
		let host = url.host_str().unwrap_or_default();

		let _timer = self.metrics.http_request_duration.with_label_values(&[host]).start_timer();
		self.metrics.http_requests.with_label_values(&[host]).inc();

		let mut request = self.client.post(url.clone()).json(body);
		if let Some(token) = access_token {
			request = request.header(ACCESS_TOKEN_HEADER, token);
		}

		let response = match request.send().await {
			Ok(response) => response,
			Err(err) => {
				self.metrics.http_requests_failed.with_label_values(&[host, ""]).inc();
				return Err(err.into());
			}
		};

		let status = response.status();
		if !status.is_success() {
			self.metrics.http_requests_failed.with_label_values(&[host, status.as_str()]).inc();
		}

		let body = response.bytes().await?;

		Ok(Response { status, body })
	}
}

#[derive(Debug, Clone)]
/// buffered http response
pub struct Response {
	/// http status code
	pub status: StatusCode,
	/// raw response body
	pub body: Bytes,
}

#[derive(Debug, Default, Deserialize)]
/// error body of the v1.0 api
struct ApiErrorBody {
	#[serde(default)]
	code: String,
	#[serde(default)]
	message: String,
}

impl Response {
	/// decode json body
	pub fn json<T: DeserializeOwned>(&self) -> Result<T, DingError> {
		Ok(serde_json::from_slice(&self.body)?)
	}

	/// body as (lossy) utf-8
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// turn a non success response of the v1.0 api into [DingError::Api]
	pub fn api_error(&self) -> DingError {
		let ApiErrorBody { code, message } = self.json().unwrap_or_else(|_| ApiErrorBody {
			code: String::new(),
			message: self.text(),
		});

		DingError::Api { status: self.status.as_u16(), code, message }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn response(status: u16, body: &'static str) -> Response {
		Response { status: StatusCode::from_u16(status).unwrap(), body: Bytes::from(body) }
	}

	#[test]
	fn api_error_from_json_body() {
		let err = response(400, r#"{"code":"invalidClientId","message":"bad app key"}"#).api_error();

		match err {
			DingError::Api { status, code, message } => {
				assert_eq!(status, 400);
				assert_eq!(code, "invalidClientId");
				assert_eq!(message, "bad app key");
			}
			other => panic!("unexpected error {other:?}"),
		}
	}

	#[test]
	fn api_error_from_plain_body() {
		let err = response(502, "bad gateway").api_error();

		match err {
			DingError::Api { status, code, message } => {
				assert_eq!(status, 502);
				assert!(code.is_empty());
				assert_eq!(message, "bad gateway");
			}
			other => panic!("unexpected error {other:?}"),
		}
	}

	#[test]
	fn meters_register_once_per_registry() {
		let registry = Registry::new();

		assert!(Client::new(Duration::from_secs(1), &registry).is_ok());
		assert!(Client::new(Duration::from_secs(1), &registry).is_err());
	}
}
