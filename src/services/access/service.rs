//! Node access service implementation.
//!
//! A live call flows through the deduplicator first. The call that actually
//! reaches the network picks the fastest healthy endpoint, records its lifecycle
//! in telemetry, reports its outcome to the health registry and fails over to
//! untried endpoints on retryable errors until its deadline runs out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
	models::{
		AccessConfig, CallConfig, CallTags, EndpointSnapshot, EventBatch, Insight,
		ObserverStatus, Recommendation, SubscriptionId,
	},
	services::{
		access::error::AccessError,
		blockchain::{EvmClient, NodeTransport},
		dedup::{call_key, DedupStats, RequestDeduplicator},
		health::EndpointHealthRegistry,
		observer::{EventObserver, ObserverError},
		recommender::OptimizationRecommender,
		telemetry::{CallStats, PerformanceReport, TelemetryEngine, TelemetryExport},
	},
	utils::{constants::DEDUP_STATS_RETENTION, supervisor::TaskSupervisor},
};

type CallOutcome = Result<Value, AccessError>;

/// Aggregates and current insights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
	pub stats: CallStats,
	pub insights: Vec<Insight>,
}

/// Registered event subscription
///
/// Dropping the handle keeps the subscription alive; call
/// [`SubscriptionHandle::unsubscribe`] to stop it.
pub struct SubscriptionHandle<T> {
	id: SubscriptionId,
	observer: EventObserver<T>,
}

impl<T: NodeTransport + 'static> SubscriptionHandle<T> {
	pub fn id(&self) -> SubscriptionId {
		self.id
	}

	/// Removes the subscription
	///
	/// # Returns
	/// * `false` - The subscription was already gone, e.g. after shutdown
	pub async fn unsubscribe(self) -> bool {
		self.observer.unsubscribe(self.id).await
	}
}

/// The part of a call that reaches the network
///
/// Owns its collaborators so the work can outlive the caller that started it.
struct Dispatcher<T> {
	client: EvmClient<T>,
	registry: Arc<EndpointHealthRegistry>,
	telemetry: Arc<TelemetryEngine>,
	call: CallConfig,
}

impl<T> Clone for Dispatcher<T> {
	fn clone(&self) -> Self {
		Self {
			client: self.client.clone(),
			registry: Arc::clone(&self.registry),
			telemetry: Arc::clone(&self.telemetry),
			call: self.call.clone(),
		}
	}
}

impl<T: NodeTransport + 'static> Dispatcher<T> {
	async fn dispatch(self, method: String, params: Value, tags: CallTags) -> CallOutcome {
		let started = Instant::now();
		let deadline = self.call.deadline();
		let mut endpoint = self.registry.select_fastest_healthy();
		let id = self.telemetry.start_call(&endpoint, &method, &params, tags);
		let mut tried: Vec<String> = Vec::new();

		let outcome = loop {
			let remaining = deadline.saturating_sub(started.elapsed());
			if remaining.is_zero() {
				break Err(AccessError::DeadlineExceeded(deadline));
			}

			tried.push(endpoint.clone());
			let error = match self
				.client
				.request_with_timeout(
					&endpoint,
					&method,
					Some(params.clone()),
					self.call.timeout().min(remaining),
				)
				.await
			{
				Ok(value) => {
					self.registry.report_success(&endpoint);
					break Ok(value);
				}
				Err(error) => error,
			};

			if error.is_endpoint_fault() {
				self.registry.report_failure(&endpoint, &error.to_string());
			}

			if started.elapsed() >= deadline {
				warn!(
					method = %method,
					endpoint = %endpoint,
					attempts = tried.len(),
					"Call deadline exceeded"
				);
				break Err(AccessError::DeadlineExceeded(deadline));
			}

			if !error.is_retryable() || tried.len() >= self.call.max_attempts as usize {
				break Err(error.into());
			}

			let Some(next) = self.registry.select_excluding(&tried) else {
				break Err(error.into());
			};

			warn!(
				method = %method,
				failed = %endpoint,
				next = %next,
				error = %error,
				"Call failed, failing over"
			);
			tokio::time::sleep(
				self.call
					.retry_delay()
					.min(deadline.saturating_sub(started.elapsed())),
			)
			.await;
			self.telemetry.record_retry(id, &next);
			endpoint = next;
		};

		self.telemetry
			.finish_call(id, outcome.as_ref().err().map(AccessError::kind));
		outcome
	}
}

/// Resilient access to a pool of EVM JSON-RPC endpoints
pub struct NodeAccessService<T> {
	dispatcher: Dispatcher<T>,
	dedup: Arc<RequestDeduplicator<CallOutcome>>,
	observer: EventObserver<T>,
	recommender: Arc<OptimizationRecommender>,
	supervisor: Arc<TaskSupervisor>,
	config: AccessConfig,
}

impl<T: NodeTransport + 'static> NodeAccessService<T> {
	/// Builds the service and its components from a validated configuration
	///
	/// No background task runs until [`NodeAccessService::start`].
	///
	/// # Arguments
	/// * `config` - Endpoints and every component's settings
	/// * `transport` - Transport shared by live calls, probes and the observer
	///
	/// # Errors
	/// * `AccessError::NoEndpoints` - The endpoint list is empty
	/// * `AccessError::InvalidConfig` - A component rejected its settings
	pub fn new(config: AccessConfig, transport: Arc<T>) -> Result<Self, AccessError> {
		if config.endpoints.is_empty() {
			return Err(AccessError::NoEndpoints);
		}

		let registry = Arc::new(
			EndpointHealthRegistry::new(&config.endpoints, config.health.clone())
				.map_err(|e| AccessError::InvalidConfig(e.to_string()))?,
		);
		let telemetry = Arc::new(TelemetryEngine::new(config.telemetry.clone()));
		let supervisor = Arc::new(TaskSupervisor::new());
		let client = EvmClient::new(transport, config.call.timeout());

		let observer = EventObserver::new(
			client.clone(),
			Arc::clone(&registry),
			Arc::clone(&telemetry),
			Arc::clone(&supervisor),
			config.observer.clone(),
		)
		.map_err(|e| AccessError::InvalidConfig(e.to_string()))?;

		let recommender = Arc::new(OptimizationRecommender::new(
			Arc::clone(&telemetry),
			config.recommender.clone(),
			config.call.clone(),
		));

		Ok(Self {
			dispatcher: Dispatcher {
				client,
				registry,
				telemetry,
				call: config.call.clone(),
			},
			dedup: Arc::new(RequestDeduplicator::new(config.dedup.window())),
			observer,
			recommender,
			supervisor,
			config,
		})
	}

	pub fn config(&self) -> &AccessConfig {
		&self.config
	}

	pub fn registry(&self) -> &Arc<EndpointHealthRegistry> {
		&self.dispatcher.registry
	}

	pub fn telemetry(&self) -> &Arc<TelemetryEngine> {
		&self.dispatcher.telemetry
	}

	pub fn recommender(&self) -> &Arc<OptimizationRecommender> {
		&self.recommender
	}

	pub fn supervisor(&self) -> &Arc<TaskSupervisor> {
		&self.supervisor
	}

	/// Starts health probing, the telemetry sweep and the recommender
	///
	/// Each runs as a named supervised task; the first probe runs immediately.
	pub fn start(&self) {
		let registry = Arc::clone(&self.dispatcher.registry);
		let transport = Arc::clone(self.dispatcher.client.transport());
		self.supervisor.spawn_periodic(
			"health-probe",
			self.config.health.probe_interval(),
			move || {
				let registry = Arc::clone(&registry);
				let transport = Arc::clone(&transport);
				async move {
					registry.probe_all(transport.as_ref()).await;
				}
			},
		);

		let telemetry = Arc::clone(&self.dispatcher.telemetry);
		let dedup = Arc::clone(&self.dedup);
		self.supervisor.spawn_periodic(
			"telemetry-sweep",
			self.config.telemetry.sweep_interval(),
			move || {
				let fired = telemetry.sweep();
				if !fired.is_empty() {
					debug!(insights = fired.len(), "Telemetry sweep raised insights");
				}
				dedup.cleanup_stats(DEDUP_STATS_RETENTION);
				async {}
			},
		);

		let recommender = Arc::clone(&self.recommender);
		self.supervisor.spawn_periodic(
			"recommender",
			self.config.recommender.interval(),
			move || {
				recommender.analyze();
				async {}
			},
		);

		info!(
			endpoints = self.dispatcher.registry.len(),
			"Node access service started"
		);
	}

	/// Performs one JSON-RPC call
	///
	/// Concurrent calls with the same method and params share one network
	/// request and all receive its outcome. The request runs on its own task,
	/// so it completes and is recorded in telemetry even if every caller
	/// stops waiting for it.
	///
	/// # Arguments
	/// * `method` - JSON-RPC method name
	/// * `params` - Positional params, usually a JSON array
	/// * `tags` - Attribution recorded in telemetry
	///
	/// # Returns
	/// * `Ok(Value)` - The `result` of the response
	/// * `Err(AccessError)` - The failure of the last attempt, or the deadline
	pub async fn call(&self, method: &str, params: Value, tags: CallTags) -> CallOutcome {
		let key = call_key(method, &params);
		let dispatcher = self.dispatcher.clone();
		let method = method.to_string();
		let work = async move {
			tokio::spawn(dispatcher.dispatch(method, params, tags))
				.await
				.unwrap_or_else(|e| Err(AccessError::Aborted(e.to_string())))
		};
		self.dedup.execute(&key, work).await
	}

	/// Registers a callback for a contract event
	///
	/// # Arguments
	/// * `address` - Contract address, hex encoded
	/// * `event` - Event signature, e.g. `Transfer(address,address,uint256)`
	/// * `callback` - Invoked with every batch of new logs, never on the polling task
	pub async fn subscribe<F>(
		&self,
		address: &str,
		event: &str,
		callback: F,
	) -> Result<SubscriptionHandle<T>, ObserverError>
	where
		F: Fn(EventBatch) + Send + Sync + 'static,
	{
		let id = self
			.observer
			.subscribe(address, event, Arc::new(callback))
			.await?;
		Ok(SubscriptionHandle {
			id,
			observer: self.observer.clone(),
		})
	}

	/// Probes every endpoint now instead of waiting for the next interval
	pub async fn probe_health(&self) -> Vec<EndpointSnapshot> {
		self.dispatcher
			.registry
			.probe_all(self.dispatcher.client.transport().as_ref())
			.await
	}

	pub fn get_health_snapshot(&self) -> Vec<EndpointSnapshot> {
		self.dispatcher.registry.snapshot()
	}

	pub fn get_telemetry_snapshot(&self) -> TelemetrySnapshot {
		TelemetrySnapshot {
			stats: self.dispatcher.telemetry.stats(),
			insights: self.dispatcher.telemetry.insights(),
		}
	}

	/// Retained recommendations, oldest first
	pub fn get_recommendations(&self) -> Vec<Recommendation> {
		self.recommender.recommendations()
	}

	pub fn telemetry_report(&self) -> PerformanceReport {
		self.dispatcher.telemetry.report()
	}

	pub fn telemetry_export(&self) -> TelemetryExport {
		self.dispatcher.telemetry.export()
	}

	pub fn observer_status(&self) -> ObserverStatus {
		self.observer.status()
	}

	pub fn dedup_stats(&self) -> DedupStats {
		self.dedup.stats()
	}

	/// Stops the observer, then every background task
	pub async fn shutdown(&self) {
		self.observer.shutdown().await;
		self.supervisor.shutdown().await;
		info!("Node access service stopped");
	}
}
