use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use clap::{Arg, Command};
use config::Config;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use url::Url;

use crate::{
	alert_renderer::Templates,
	alertmanager_webhook_receiver::AlertReceiverSettings,
	ding::{ApiSettings, Credentials, Recipient},
	links::LinkSettings,
	log::LogSettings,
	telemetry_endpoint::TelemetryEndpointSettings,
};

/// recipient group used for alerts without `alert_group` label
const DEFAULT_GROUP: &str = "default";
/// webhook used for alerts without `alert_ding` label
const DEFAULT_WEBHOOK: &str = "消息测试群";

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	#[serde(rename = "appKey")]
	pub app_key: String,
	#[serde(rename = "appSecret")]
	pub app_secret: String,
	#[serde(rename = "robotAppKey")]
	pub robot_app_key: String,
	#[serde(rename = "robotAppSecret")]
	pub robot_app_secret: String,
	/// recipient group name to recipients of direct messages
	pub single_groups: HashMap<String, Vec<Recipient>>,
	/// webhook name to group robot webhook url
	pub webhooks: HashMap<String, Url>,
	/// conversation name to open conversation id
	#[serde(default)]
	pub conversations: HashMap<String, String>,
	#[serde(rename = "alertmanagerURL")]
	pub alertmanager_url: String,
	#[serde(rename = "grafanaURL")]
	pub grafana_url: String,
	#[serde(rename = "grafanaPrefix")]
	pub grafana_prefix: String,
	#[serde(rename = "prometheusURL")]
	pub prometheus_url: String,
	#[serde(rename = "prometheusPrefix")]
	pub prometheus_prefix: String,
	#[serde(rename = "defaultGroup", default = "default_group")]
	pub default_group: String,
	#[serde(rename = "defaultWebhook", default = "default_webhook")]
	pub default_webhook: String,
	#[serde(rename = "defaultConversation", default)]
	pub default_conversation: Option<String>,
	#[serde(default)]
	pub receiver: AlertReceiverSettings,
	#[serde(default)]
	pub telemetry_endpoint: Option<TelemetryEndpointSettings>,
	#[serde(default)]
	pub api: ApiSettings,
	#[serde(default)]
	pub templates: Option<Templates>,
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	#[serde(default = "default_request_timeout")]
	pub request_timeout: Duration,
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	#[serde(default = "default_token_refresh_margin")]
	pub token_refresh_margin: Duration,
	#[serde(default)]
	pub log: LogSettings,
}

impl Settings {
	/// parse command line arguments and load the config file they point to
	pub fn load() -> Result<Self> {
		let opts = Command::new(clap::crate_name!())
			.version(clap::crate_version!())
			.about(clap::crate_description!())
			.author(clap::crate_authors!())
			.args([
				Arg::new("config")
					.help("path of config file")
					.takes_value(true)
					.short('c')
					.long("config")
					.default_value("./ding.json"),
				Arg::new("level")
					.help("log level")
					.possible_values(["Error", "Warn", "Info", "Debug", "Trace"])
					.ignore_case(true)
					.takes_value(true)
					.long("log"),
			])
			.get_matches();

		let config_path = opts.value_of("config").context("no config path")?;

		let mut settings = Self::from_file(config_path)?;

		if let Some(level) = opts.value_of("level") {
			settings.log.level = level.to_string();
		}

		Ok(settings)
	}

	/// load settings from a config file, the format is picked by extension
	pub fn from_file(path: &str) -> Result<Self> {
		Config::builder()
			.add_source(config::File::with_name(path))
			.build()
			.context(format!("can't load config {path}"))?
			.try_deserialize()
			.context(format!("invalid config {path}"))
	}

	pub fn app_credentials(&self) -> Credentials {
		Credentials { app_key: self.app_key.clone(), app_secret: self.app_secret.clone() }
	}

	pub fn robot_credentials(&self) -> Credentials {
		Credentials { app_key: self.robot_app_key.clone(), app_secret: self.robot_app_secret.clone() }
	}

	pub fn links(&self) -> LinkSettings {
		LinkSettings {
			alertmanager_url: self.alertmanager_url.clone(),
			grafana_url: self.grafana_url.clone(),
			grafana_prefix: self.grafana_prefix.clone(),
			prometheus_url: self.prometheus_url.clone(),
			prometheus_prefix: self.prometheus_prefix.clone(),
		}
	}
}

fn default_group() -> String {
	DEFAULT_GROUP.to_owned()
}

fn default_webhook() -> String {
	DEFAULT_WEBHOOK.to_owned()
}

fn default_request_timeout() -> Duration {
	Duration::from_secs(10)
}

fn default_token_refresh_margin() -> Duration {
	Duration::from_secs(300)
}
