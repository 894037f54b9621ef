//! Renders alerts into dingtalk messages via tera templates.
//!
//! Alerts are received from [alertmanager_webhook_receiver](crate::alertmanager_webhook_receiver),
//! the rendered title and text are wrapped into the message payloads of
//! [message](crate::message).

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tera::Tera;

use crate::{
	alert::{Alert, Status},
	links::LinkSettings,
	message::{Card, FormattedAlert},
};

const FIRING_TITLE: &str = "[FIRING] {{ alertname }} \n\n alerts firing";
const FIRING_TEXT: &str = "[FIRING][**{{ alertname }}**]({{ graph_link }}) (实例：{{ instance }}) \n\n **alerts firing** \n\n  \n\n 当前值为{{ value }} \n\n **描述信息:** {{ summary }} \n\n **告警时间:** {{ starts_at }} \n\n **告警详情:** {{ details }}";
const RESOLVED_TITLE: &str = "[RESOLVED] [{{ alertname }}已恢复]({{ graph_link }}) \n\n alerts resolved";
const RESOLVED_TEXT: &str = "[RESOLVED] [**{{ alertname }}已恢复**]({{ graph_link }}) \n\n **alerts resolved** \n\n (实例：{{ instance }}) \n\n  **当前值为{{ value }}** \n\n **Description:** {{ summary }} \n\n **告警时间:** {{ starts_at }} \n\n **恢复时间:** {{ ends_at }} \n\n **Details:** {{ details }}";

#[derive(Debug, Clone, Deserialize)]
/// template files replacing the built in templates
pub struct Templates {
	pub firing: Template,
	pub resolved: Template,
}

#[derive(Debug, Clone, Deserialize)]
/// paths of the title and text template for one alert status
pub struct Template {
	pub title: String,
	pub text: String,
}

#[derive(Debug, Serialize)]
/// variables available in templates
struct MessageContext<'a> {
	status: &'static str,
	alertname: &'a str,
	instance: &'a str,
	value: &'a str,
	summary: &'a str,
	details: &'a str,
	starts_at: &'a str,
	ends_at: &'a str,
	graph_link: &'a str,
	silence_link: &'a str,
	labels: IndexMap<&'a str, &'a str>,
}

/// Alert renderer
pub struct AlertRenderer {
	tera: Tera,
	links: LinkSettings,
}

impl AlertRenderer {
	/// Return new renderer
	///
	/// * `templates` - template files overriding the built in ones
	pub fn new(links: LinkSettings, templates: Option<&Templates>) -> Result<Self> {
		let mut tera = Tera::default();

		tera.add_raw_templates(vec![
			("firing.title", FIRING_TITLE),
			("firing.text", FIRING_TEXT),
			("resolved.title", RESOLVED_TITLE),
			("resolved.text", RESOLVED_TEXT),
		])
		.context("could not load built in templates")?;

		if let Some(templates) = templates {
			for (status, template) in [("firing", &templates.firing), ("resolved", &templates.resolved)] {
				tera.add_template_file(&template.title, Some(format!("{status}.title").as_str()))
					.context(format!("could not load {status} title template {}", template.title))?;
				tera.add_template_file(&template.text, Some(format!("{status}.text").as_str()))
					.context(format!("could not load {status} text template {}", template.text))?;
			}
		}

		Ok(Self { tera, links })
	}

	/// Render an alert. Never fails: if a template can't be rendered the
	/// message carries the render error instead.
	pub fn render(&self, alert: &Alert) -> FormattedAlert {
		let silence_link = self.links.silence_link(alert);
		let graph_link = self.links.graph_link(alert.generator_url.as_deref());

		let context = MessageContext {
			status: alert.status.as_str(),
			alertname: alert.alertname(),
			instance: alert.instance(),
			value: alert.value(),
			summary: alert.summary(),
			details: alert.details(),
			starts_at: alert.starts_at(),
			ends_at: alert.ends_at(),
			graph_link: &graph_link,
			silence_link: &silence_link,
			labels: alert.display_labels().collect(),
		};

		let (title, text) = match self.render_parts(alert.status, &context) {
			Ok(parts) => parts,
			Err(err) => {
				tracing::error!("failed to render alert {}: {err:?}", alert.alertname());

				(
					format!("[{}] {}", alert.status.as_str().to_uppercase(), alert.alertname()),
					format!("failed to render alert:\n{err:#?}"),
				)
			}
		};

		FormattedAlert::new(alert.status, Card { title, text, silence_link, graph_link })
	}

	/// render title and text template of `status`
	fn render_parts(&self, status: Status, context: &MessageContext<'_>) -> tera::Result<(String, String)> {
		let context = tera::Context::from_serialize(context)?;
		let status = status.as_str();

		Ok((
			self.tera.render(&format!("{status}.title"), &context)?,
			self.tera.render(&format!("{status}.text"), &context)?,
		))
	}
}
