//! prometheus alertmanager receiver that forwards alerts to dingtalk
//!
//! Features:
//! - direct robot messages to recipient groups selected by the `alert_group` label
//! - action cards posted to group robot webhooks selected by the `alert_ding` label
//! - text messages to org conversations selected by the `alert_conversation` label
//! - configurable tera templates and prometheus metrics

use std::{process, sync::Arc};

use anyhow::Context;
use settings::Settings;
use thiserror::Error;

use crate::{
	alertmanager_webhook_receiver::State,
	ding::{Client, DingError, Session},
};

mod alert;
mod alert_renderer;
mod alertmanager_webhook_receiver;
mod ding;
mod links;
mod log;
mod message;
mod settings;
mod telemetry_endpoint;
#[cfg(test)]
mod test_support;

/// exit code if the config file is missing or invalid
const EXIT_CONFIG: i32 = 300;

#[derive(Debug, Error)]
/// errors which abort the startup, each one maps to its own exit code
enum StartupError {
	#[error("invalid configuration: {0:#}")]
	Config(anyhow::Error),
	#[error("failed to fetch access token: {0}")]
	Token(DingError),
	#[error("access token is empty: {0}")]
	MissingToken(DingError),
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl StartupError {
	fn exit_code(&self) -> i32 {
		match self {
			StartupError::Config(_) => EXIT_CONFIG,
			StartupError::Token(_) => 400,
			StartupError::MissingToken(_) => 500,
			StartupError::Other(_) => 1,
		}
	}
}

impl From<DingError> for StartupError {
	fn from(err: DingError) -> Self {
		match err {
			DingError::MissingToken(_) => StartupError::MissingToken(err),
			err => StartupError::Token(err),
		}
	}
}

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() {
	setup_panic_handler();

	let settings = match Settings::load() {
		Ok(settings) => settings,
		Err(err) => {
			eprintln!("{}", StartupError::Config(err));
			process::exit(EXIT_CONFIG);
		}
	};

	let guard = match log::setup_logging(&settings.log) {
		Ok(guard) => guard,
		Err(err) => {
			eprintln!("{}", StartupError::Config(err));
			process::exit(EXIT_CONFIG);
		}
	};

	let code = match run(settings).await {
		Ok(()) => 0,
		Err(err) => {
			tracing::error!("{err}");
			err.exit_code()
		}
	};

	drop(guard);
	process::exit(code);
}

async fn run(settings: Settings) -> Result<(), StartupError> {
	let registry = prometheus::default_registry().clone();

	let http = Client::new(settings.request_timeout, &registry).context("failed to construct http client")?;

	let session = Arc::new(
		Session::connect(
			http.clone(),
			settings.api.clone(),
			settings.app_credentials(),
			settings.robot_credentials(),
		)
		.await?,
	);

	tokio::spawn(Arc::clone(&session).run_refresh(settings.token_refresh_margin));

	let state = Arc::new(State::new(&settings, session, http, &registry).map_err(StartupError::Config)?);

	if let Some(telemetry) = settings.telemetry_endpoint.clone() {
		let registry = registry.clone();
		tokio::spawn(async move {
			if let Err(err) = telemetry_endpoint::run_telemetry_endpoint(&telemetry, registry).await {
				tracing::error!("{err:#}");
			}
		});
	}

	alertmanager_webhook_receiver::run_receiver(&settings.receiver, state).await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes() {
		assert_eq!(StartupError::Config(anyhow::anyhow!("bad")).exit_code(), 300);
		assert_eq!(StartupError::from(DingError::ErrCode { errcode: 40001, errmsg: "bad".into() }).exit_code(), 400);
		assert_eq!(StartupError::from(DingError::MissingToken("app")).exit_code(), 500);
		assert_eq!(StartupError::Other(anyhow::anyhow!("crash")).exit_code(), 1);
	}
}
