use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
	filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
	EnvFilter,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
	pub level: String,
	/// write a daily rotated log file into this directory
	pub directory: Option<PathBuf>,
	/// file name prefix of the rotated log files
	pub file_prefix: String,
}

impl Default for LogSettings {
	fn default() -> Self {
		Self { level: "info".to_owned(), directory: None, file_prefix: "ding.log".to_owned() }
	}
}

/// Install the global subscriber. The returned guard flushes the log file and
/// must be kept alive until the process exits.
pub fn setup_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
	let level = tracing::Level::from_str(settings.level.as_str())
		.context(format!("invalid log level {}", settings.level))?;

	let filter_layer = EnvFilter::default()
		.add_directive(LevelFilter::from_level(level).into())
		.add_directive("hyper=warn".parse()?)
		.add_directive("reqwest=warn".parse()?);

	let (file_layer, guard) = match &settings.directory {
		Some(directory) => {
			let appender = tracing_appender::rolling::daily(directory, &settings.file_prefix);
			let (writer, guard) = tracing_appender::non_blocking(appender);

			(Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
		}
		None => (None, None),
	};

	let registry = tracing_subscriber::registry().with(filter_layer).with(fmt::layer()).with(file_layer);

	#[cfg(feature = "console")]
	let registry = registry.with(console_subscriber::spawn());

	registry.try_init().context("failed to install tracing subscriber")?;

	Ok(guard)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_level_is_rejected() {
		let settings = LogSettings { level: "loud".to_owned(), ..LogSettings::default() };

		assert!(setup_logging(&settings).is_err());
	}

	#[test]
	fn partial_settings_get_defaults() {
		let settings: LogSettings = serde_json::from_str(r#"{"level": "debug"}"#).unwrap();

		assert_eq!(settings.level, "debug");
		assert_eq!(settings.file_prefix, "ding.log");
		assert!(settings.directory.is_none());
	}
}
