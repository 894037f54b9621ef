//! errors returned by the dingtalk clients

use thiserror::Error;

/// Error of a single call against the dingtalk open api or a robot webhook.
///
/// Delivery failures are never propagated to the alert source, they end up in
/// logs, metrics and the per alert reports.
#[derive(Error, Debug)]
pub enum DingError {
	/// the request couldn't be sent or the response couldn't be read
	#[error("http request failed: {0}")]
	Http(#[from] reqwest::Error),
	/// an endpoint url couldn't be built from the configured base url
	#[error("invalid endpoint url: {0}")]
	Url(#[from] url::ParseError),
	/// the v1.0 api answered with a non success status code
	#[error("api answered {status}: {code} {message}")]
	Api {
		/// http status code
		status: u16,
		/// dingtalk error code, e.g. `invalidClientId`
		code: String,
		/// human readable error message
		message: String,
	},
	/// the legacy api or a robot webhook answered with a non zero `errcode`
	#[error("errcode {errcode}: {errmsg}")]
	ErrCode {
		/// dingtalk error code
		errcode: i64,
		/// dingtalk error message
		errmsg: String,
	},
	/// the token endpoint handed out an empty access token
	#[error("{0} access token is empty, check app key and app secret")]
	MissingToken(&'static str),
	/// the phone lookup succeeded but didn't contain a user id
	#[error("no user id for mobile {0}")]
	EmptyUserId(String),
	/// the robot refused to deliver to some of the given users
	#[error("robot rejected user ids {0:?}")]
	InvalidRecipients(Vec<String>),
	/// there is no webhook configured under this name
	#[error("no webhook configured for {0:?}")]
	UnknownWebhook(String),
	/// there is no conversation configured under this name
	#[error("no conversation configured for {0:?}")]
	UnknownConversation(String),
	/// response body couldn't be decoded
	#[error("undecodable response: {0}")]
	Decode(#[from] serde_json::Error),
}

impl DingError {
	/// short label for prometheus meters
	pub fn kind(&self) -> &'static str {
		match self {
			DingError::Http(_) => "http",
			DingError::Url(_) => "url",
			DingError::Api { .. } => "api",
			DingError::ErrCode { .. } => "errcode",
			DingError::MissingToken(_) => "missing_token",
			DingError::EmptyUserId(_) => "empty_user_id",
			DingError::InvalidRecipients(_) => "invalid_recipients",
			DingError::UnknownWebhook(_) => "unknown_webhook",
			DingError::UnknownConversation(_) => "unknown_conversation",
			DingError::Decode(_) => "decode",
		}
	}
}
