//! Here we expose prometheus metrics about alertding
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use axum::{
	body::Body,
	extract::Extension,
	http::{header::CONTENT_TYPE, Response, StatusCode},
	routing::get,
	Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryEndpointSettings {
	pub bind_address: IpAddr,
	pub port: u16,
}

impl TelemetryEndpointSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

async fn metrics_handler(Extension(registry): Extension<Registry>) -> Result<Response<Body>, StatusCode> {
	let mut buffer = vec![];
	let encoder = TextEncoder::new();

	encoder.encode(&registry.gather(), &mut buffer).map_err(|err| {
		tracing::error!("failed to encode metrics: {err}");
		StatusCode::INTERNAL_SERVER_ERROR
	})?;

	Response::builder()
		.status(StatusCode::OK)
		.header(CONTENT_TYPE, encoder.format_type())
		.body(Body::from(buffer))
		.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn router(registry: Registry) -> Router {
	Router::new().route("/metrics", get(metrics_handler)).layer(Extension(registry))
}

pub async fn run_telemetry_endpoint(settings: &TelemetryEndpointSettings, registry: Registry) -> Result<()> {
	axum::Server::bind(&settings.to_socket_addr())
		.serve(router(registry).into_make_service())
		.await
		.context("telemetry endpoint crashed")?;

	Ok(())
}
