//! data structures for deserializing incoming alerts
use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull};

/// labels starting with this prefix are internal to prometheus and never shown
pub const INTERNAL_LABEL_PREFIX: &str = "__";
/// label selecting the recipient group for direct messages
pub const GROUP_LABEL: &str = "alert_group";
/// label selecting the group robot webhook
pub const WEBHOOK_LABEL: &str = "alert_ding";
/// label selecting the internal conversation
pub const CONVERSATION_LABEL: &str = "alert_conversation";
/// annotation grafana fills with the values of the alert expression
pub const VALUE_STRING_ANNOTATION: &str = "__value_string__";
/// placeholder for missing alert name, instance and summary
const NULL: &str = "null";

/// first number following `value=`
static VALUE_PATTERN: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::expect_used)]
	Regex::new(r"value=(\d+\.\d+|\d+)").expect("valid value pattern")
});

/// Request body of the webhook receiver: either an alertmanager notification
/// carrying a list of alerts, or a bare alert.
#[derive(Clone, Debug)]
pub enum Payload {
	Batch(Data),
	Single(Alert),
}

impl Payload {
	/// decode a request body, bodies with an `alerts` key are batches
	pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
		if value.get("alerts").is_some() {
			Ok(Self::Batch(serde_json::from_value(value)?))
		} else {
			Ok(Self::Single(serde_json::from_value(value)?))
		}
	}

	pub fn into_alerts(self) -> Vec<Alert> {
		match self {
			Payload::Batch(data) => data.alerts,
			Payload::Single(alert) => vec![alert],
		}
	}
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// notification sent by the alertmanager webhook receiver
pub struct Data {
	pub version: Option<String>,
	pub group_key: Option<String>,
	pub receiver: Option<String>,
	pub status: Option<String>,
	pub alerts: Vec<Alert>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub group_labels: IndexMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub common_labels: IndexMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub common_annotations: IndexMap<String, String>,
	#[serde(rename = "externalURL")]
	pub external_url: Option<String>,
}

impl fmt::Display for Data {
	/// envelope fields of the notification, without the alerts
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"receiver {}, group {}, status {}, from {}",
			self.receiver.as_deref().unwrap_or(NULL),
			self.group_key.as_deref().unwrap_or(NULL),
			self.status.as_deref().unwrap_or(NULL),
			self.external_url.as_deref().unwrap_or(NULL),
		)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
/// alert status, everything but `firing` counts as resolved
pub enum Status {
	Firing,
	Resolved,
}

impl Default for Status {
	fn default() -> Self {
		Status::Firing
	}
}

impl From<String> for Status {
	fn from(status: String) -> Self {
		if status == "firing" {
			Status::Firing
		} else {
			Status::Resolved
		}
	}
}

impl Serialize for Status {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Firing => "firing",
			Status::Resolved => "resolved",
		}
	}
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// a single alert, every field is optional
pub struct Alert {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub status: Status,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub labels: IndexMap<String, String>,
	pub annotations: Option<IndexMap<String, String>>,
	#[serde(rename = "generatorURL")]
	pub generator_url: Option<String>,
	pub starts_at: Option<String>,
	pub ends_at: Option<String>,
	/// legacy location of the instance, alertmanager puts it into the labels
	pub instance: Option<String>,
	pub fingerprint: Option<String>,
}

impl Alert {
	pub fn label(&self, key: &str) -> Option<&str> {
		self.labels.get(key).map(String::as_str)
	}

	/// the annotations, if there are any
	fn annotations(&self) -> Option<&IndexMap<String, String>> {
		self.annotations.as_ref().filter(|annotations| !annotations.is_empty())
	}

	pub fn alertname(&self) -> &str {
		self.label("alertname").unwrap_or(NULL)
	}

	/// `instance` label, falls back to a top level `instance` field
	pub fn instance(&self) -> &str {
		self.label("instance").or(self.instance.as_deref()).unwrap_or(NULL)
	}

	/// `summary` annotation, empty without annotations
	pub fn summary(&self) -> &str {
		match self.annotations() {
			Some(annotations) => annotations.get("summary").map_or(NULL, String::as_str),
			None => "",
		}
	}

	/// `__value_string__` annotation
	pub fn details(&self) -> &str {
		self.annotations()
			.and_then(|annotations| annotations.get(VALUE_STRING_ANNOTATION))
			.map_or("", String::as_str)
	}

	/// the value that triggered the alert, empty if the details don't contain one
	pub fn value(&self) -> &str {
		extract_value(self.details()).unwrap_or("")
	}

	pub fn starts_at(&self) -> &str {
		self.starts_at.as_deref().unwrap_or("")
	}

	pub fn ends_at(&self) -> &str {
		self.ends_at.as_deref().unwrap_or("")
	}

	/// labels shown to humans, in the order they were received
	pub fn display_labels(&self) -> impl Iterator<Item = (&str, &str)> {
		self.labels
			.iter()
			.filter(|(key, _)| !key.starts_with(INTERNAL_LABEL_PREFIX))
			.map(|(key, value)| (key.as_str(), value.as_str()))
	}
}

/// first number following `value=` in `text`
pub fn extract_value(text: &str) -> Option<&str> {
	VALUE_PATTERN.captures(text).and_then(|captures| captures.get(1)).map(|value| value.as_str())
}
