//! links attached to alert messages
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::alert::Alert;

/// everything except unreserved characters and `/`
const QUERY_ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~').remove(b'/');

#[derive(Debug, Clone, Default)]
/// where silences are created and graphs are viewed
pub struct LinkSettings {
	/// external alertmanager url
	pub alertmanager_url: String,
	/// grafana url reachable by the message recipients
	pub grafana_url: String,
	/// prefix of grafana generator urls, replaced by `grafana_url`
	pub grafana_prefix: String,
	/// prometheus url reachable by the message recipients
	pub prometheus_url: String,
	/// prefix of prometheus generator urls, replaced by `prometheus_url`
	pub prometheus_prefix: String,
}

impl LinkSettings {
	/// alertmanager link creating a silence matching all display labels
	pub fn silence_link(&self, alert: &Alert) -> String {
		let filter = silence_filter(alert.display_labels());

		format!(
			"{}/#silences/new?filter={}",
			self.alertmanager_url.trim_end_matches('/'),
			utf8_percent_encode(&filter, QUERY_ESCAPE_SET)
		)
	}

	/// Rewrite the generator url of an alert into a link recipients can open.
	/// Grafana urls are tried first, urls matching neither prefix are kept.
	pub fn graph_link(&self, generator_url: Option<&str>) -> String {
		let generator_url = match generator_url {
			Some(url) => url,
			None => return String::new(),
		};

		replace_prefix(generator_url, &self.grafana_prefix, &self.grafana_url)
			.or_else(|| replace_prefix(generator_url, &self.prometheus_prefix, &self.prometheus_url))
			.unwrap_or_else(|| generator_url.to_owned())
	}
}

/// alertmanager matcher list, e.g. `{alertname="HighCPU",instance="host1"}`
pub fn silence_filter<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
	let matchers: Vec<_> = labels.into_iter().map(|(key, value)| format!("{key}=\"{value}\"")).collect();

	format!("{{{}}}", matchers.join(","))
}

/// an empty prefix never matches
fn replace_prefix(url: &str, prefix: &str, replacement: &str) -> Option<String> {
	if prefix.is_empty() {
		return None;
	}

	url.strip_prefix(prefix).map(|rest| format!("{replacement}{rest}"))
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn settings() -> LinkSettings {
		LinkSettings {
			alertmanager_url: "http://alertmanager.example.com/".to_owned(),
			grafana_url: "https://grafana.example.com".to_owned(),
			grafana_prefix: "http://grafana:3000".to_owned(),
			prometheus_url: "https://prometheus.example.com".to_owned(),
			prometheus_prefix: "http://prometheus:9090".to_owned(),
		}
	}

	#[test]
	fn silence_filter_format() {
		assert_eq!(silence_filter([("alertname", "HighCPU"), ("job", "node")]), r#"{alertname="HighCPU",job="node"}"#);
		assert_eq!(silence_filter(Vec::new()), "{}");
	}

	#[test]
	fn silence_link_encodes_display_labels() {
		let alert: Alert = serde_json::from_value(json!({
			"labels": { "alertname": "HighCPU", "__name__": "node_cpu", "instance": "host 1" },
		}))
		.unwrap();

		assert_eq!(
			settings().silence_link(&alert),
			"http://alertmanager.example.com/#silences/new?filter=%7Balertname%3D%22HighCPU%22%2Cinstance%3D%22host%201%22%7D"
		);
	}

	#[test]
	fn silence_link_joins_alertmanager_url_with_one_slash() {
		let alert: Alert = serde_json::from_value(json!({ "labels": { "alertname": "HighCPU" } })).unwrap();
		let bare = LinkSettings { alertmanager_url: "http://alertmanager.example.com".to_owned(), ..settings() };

		assert_eq!(bare.silence_link(&alert), settings().silence_link(&alert));
		assert!(bare.silence_link(&alert).starts_with("http://alertmanager.example.com/#silences/new?filter="));
	}

	#[test]
	fn grafana_generator_url() {
		assert_eq!(
			settings().graph_link(Some("http://grafana:3000/alerting/grafana/abc/view")),
			"https://grafana.example.com/alerting/grafana/abc/view"
		);
	}

	#[test]
	fn prometheus_generator_url() {
		assert_eq!(
			settings().graph_link(Some("http://prometheus:9090/graph?g0.expr=up")),
			"https://prometheus.example.com/graph?g0.expr=up"
		);
	}

	#[test]
	fn other_generator_urls_pass_through() {
		assert_eq!(settings().graph_link(Some("http://elsewhere/graph")), "http://elsewhere/graph");
		// prefixes only match at the start
		assert_eq!(
			settings().graph_link(Some("http://proxy/?to=http://grafana:3000/x")),
			"http://proxy/?to=http://grafana:3000/x"
		);
		assert_eq!(settings().graph_link(None), "");
	}

	#[test]
	fn empty_prefix_never_matches() {
		let settings = LinkSettings { grafana_prefix: String::new(), ..settings() };

		assert_eq!(settings.graph_link(Some("http://elsewhere/graph")), "http://elsewhere/graph");
	}
}
