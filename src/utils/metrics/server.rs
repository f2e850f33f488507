//! Metrics server module
//!
//! This module provides an HTTP server to expose Prometheus metrics for scraping.

use actix_web::middleware::{Compress, DefaultHeaders, NormalizePath};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
	services::{access::NodeAccessService, blockchain::NodeTransport},
	utils::metrics::{gather_metrics, update_access_metrics},
};

pub type AccessServiceData<T> = web::Data<Arc<NodeAccessService<T>>>;

/// Metrics endpoint handler
async fn metrics_handler<T: NodeTransport + 'static>(service: AccessServiceData<T>) -> impl Responder {
	// Refresh gauges from the live service state
	update_access_metrics(service.get_ref());

	match gather_metrics() {
		Ok(buffer) => HttpResponse::Ok()
			.content_type("text/plain; version=0.0.4; charset=utf-8")
			.body(buffer),
		Err(e) => {
			error!("Error gathering metrics: {}", e);
			HttpResponse::InternalServerError().finish()
		}
	}
}

/// Resolves the address to bind, listening on all interfaces inside Docker
fn resolve_bind_address(bind_address: &str, in_docker: bool) -> String {
	if !in_docker {
		return bind_address.to_string();
	}
	match bind_address.split(':').nth(1) {
		Some(port) => format!("0.0.0.0:{}", port),
		None => "0.0.0.0:8081".to_string(),
	}
}

// Create metrics server
pub fn create_metrics_server<T: NodeTransport + 'static>(
	bind_address: String,
	service: Arc<NodeAccessService<T>>,
) -> std::io::Result<actix_web::dev::Server> {
	let in_docker = std::env::var("IN_DOCKER").unwrap_or_default() == "true";
	let actual_bind_address = resolve_bind_address(&bind_address, in_docker);

	info!(
		"Starting metrics server on {} (actual bind: {})",
		bind_address, actual_bind_address
	);

	Ok(HttpServer::new(move || {
		App::new()
			.wrap(Compress::default())
			.wrap(NormalizePath::trim())
			.wrap(DefaultHeaders::new())
			.app_data(web::Data::new(service.clone()))
			.route("/metrics", web::get().to(metrics_handler::<T>))
	})
	.workers(2)
	.bind(actual_bind_address)?
	.shutdown_timeout(5)
	.run())
}
