//! Event observer service implementation.
//!
//! Subscriptions sharing a contract address and event are grouped; each group is
//! one supervised background task, so a stalled group never delays another.
//! Callbacks run on a per-subscriber dispatcher task fed by an unbounded channel,
//! which keeps delivery ordered without ever blocking a polling loop.

use alloy::{
	primitives::{Address, B256},
	rpc::types::Log,
};
use backon::{ConstantBuilder, Retryable};
use serde_json::{json, Value};
use std::{
	collections::HashMap,
	future::Future,
	str::FromStr,
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc, Mutex, RwLock,
	},
	time::Duration,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::{
	models::{
		CallTags, EventBatch, EventLog, EventSignature, GroupStatus, LogQuery, ObserverConfig,
		ObserverMode, ObserverStatus, SubscriptionId,
	},
	services::{
		blockchain::{EvmClient, EvmClientTrait, NodeTransport, TransportError},
		health::EndpointHealthRegistry,
		observer::error::ObserverError,
		telemetry::TelemetryEngine,
	},
	utils::{
		constants::OBSERVER_SOURCE,
		supervisor::TaskSupervisor,
		sync::{lock, read, write},
	},
};

/// Receives every batch of decoded logs for one subscription
pub type EventCallback = Arc<dyn Fn(EventBatch) + Send + Sync>;

type GroupKey = (Address, B256);

struct InstalledFilter {
	id: String,
	endpoint: String,
}

#[derive(Default)]
struct GroupState {
	filter: Option<InstalledFilter>,
	last_polled_block: Option<u64>,
	endpoint: Option<String>,
}

/// Subscribers of one (address, event) pair and their shared progress
struct SubscriptionGroup {
	address: Address,
	signature: EventSignature,
	task_name: String,
	subscribers: RwLock<HashMap<SubscriptionId, UnboundedSender<EventBatch>>>,
	state: Mutex<GroupState>,
}

impl SubscriptionGroup {
	fn new(address: Address, signature: EventSignature, sequence: u64) -> Self {
		Self {
			task_name: format!("observer:group:{}:{}:{}", sequence, address, signature),
			address,
			signature,
			subscribers: RwLock::new(HashMap::new()),
			state: Mutex::new(GroupState::default()),
		}
	}

	fn query(&self) -> LogQuery {
		LogQuery::new(self.address, self.signature.topic0())
	}

	fn last_polled_block(&self) -> Option<u64> {
		lock(&self.state).last_polled_block
	}

	/// Moves the block cursor forward; never backwards
	fn advance(&self, block: u64) {
		let mut state = lock(&self.state);
		state.last_polled_block = Some(state.last_polled_block.map_or(block, |last| last.max(block)));
	}

	fn status(&self) -> GroupStatus {
		let subscribers = read(&self.subscribers).len();
		let state = lock(&self.state);
		GroupStatus {
			address: self.address,
			event: self.signature.canonical().to_string(),
			subscribers,
			last_polled_block: state.last_polled_block,
			has_filter: state.filter.is_some(),
			endpoint: state.endpoint.clone(),
		}
	}
}

struct ObserverInner<T> {
	client: EvmClient<T>,
	registry: Arc<EndpointHealthRegistry>,
	telemetry: Arc<TelemetryEngine>,
	supervisor: Arc<TaskSupervisor>,
	config: ObserverConfig,
	probe_query: LogQuery,
	mode: RwLock<ObserverMode>,
	/// Endpoint the filter capability was resolved against
	active_endpoint: Mutex<Option<String>>,
	probe_lock: tokio::sync::Mutex<()>,
	groups: Mutex<HashMap<GroupKey, Arc<SubscriptionGroup>>>,
	subscriptions: Mutex<HashMap<SubscriptionId, GroupKey>>,
	group_sequence: AtomicU64,
	stopped: AtomicBool,
}

/// Background service delivering contract events to registered callbacks
pub struct EventObserver<T> {
	inner: Arc<ObserverInner<T>>,
}

impl<T> Clone for EventObserver<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: NodeTransport + 'static> EventObserver<T> {
	/// Creates an observer with no subscriptions and an unresolved mode
	///
	/// # Errors
	/// Fails when the configured capability probe address or event is invalid.
	pub fn new(
		client: EvmClient<T>,
		registry: Arc<EndpointHealthRegistry>,
		telemetry: Arc<TelemetryEngine>,
		supervisor: Arc<TaskSupervisor>,
		config: ObserverConfig,
	) -> Result<Self, ObserverError> {
		let probe_address = parse_address(&config.probe_address)?;
		let probe_event = EventSignature::parse(&config.probe_event)?;

		Ok(Self {
			inner: Arc::new(ObserverInner {
				client,
				registry,
				telemetry,
				supervisor,
				probe_query: LogQuery::new(probe_address, probe_event.topic0()),
				config,
				mode: RwLock::new(ObserverMode::Unknown),
				active_endpoint: Mutex::new(None),
				probe_lock: tokio::sync::Mutex::new(()),
				groups: Mutex::new(HashMap::new()),
				subscriptions: Mutex::new(HashMap::new()),
				group_sequence: AtomicU64::new(0),
				stopped: AtomicBool::new(false),
			}),
		})
	}

	pub fn mode(&self) -> ObserverMode {
		self.inner.mode()
	}

	/// Registers interest in a contract event
	///
	/// The first registration resolves the observation mode. Each new
	/// (address, event) pair starts its own background task.
	///
	/// # Arguments
	/// * `address` - Contract address, hex encoded
	/// * `event` - Event signature, e.g. `Transfer(address,address,uint256)`
	/// * `callback` - Invoked with every batch of new logs
	///
	/// # Returns
	/// * `Result<SubscriptionId, ObserverError>` - Handle for [`EventObserver::unsubscribe`]
	pub async fn subscribe(
		&self,
		address: &str,
		event: &str,
		callback: EventCallback,
	) -> Result<SubscriptionId, ObserverError> {
		if self.inner.stopped.load(Ordering::Acquire) {
			return Err(ObserverError::Stopped);
		}
		let address = parse_address(address)?;
		let signature = EventSignature::parse(event)?;

		self.inner.resolve_mode().await;

		let id = SubscriptionId::new();
		let (sender, receiver) = mpsc::unbounded_channel();
		if !self
			.inner
			.supervisor
			.spawn(format!("observer:dispatch:{}", id), deliver(receiver, callback))
		{
			return Err(ObserverError::Stopped);
		}

		let key = (address, signature.topic0());
		let created = {
			let mut groups = lock(&self.inner.groups);
			let mut created = None;
			let group = groups.entry(key).or_insert_with(|| {
				let sequence = self.inner.group_sequence.fetch_add(1, Ordering::Relaxed);
				let group = Arc::new(SubscriptionGroup::new(address, signature.clone(), sequence));
				created = Some(Arc::clone(&group));
				group
			});
			write(&group.subscribers).insert(id, sender);
			created
		};
		lock(&self.inner.subscriptions).insert(id, key);

		if let Some(group) = created {
			self.inner.spawn_group(group);
		}

		info!(
			subscription = %id,
			address = %address,
			event = %signature,
			mode = ?self.mode(),
			"Subscription registered"
		);
		Ok(id)
	}

	/// Removes a subscription
	///
	/// Removing the last subscriber of a group stops its task and releases its
	/// server-side filter.
	///
	/// # Returns
	/// * `true` - The subscription existed
	pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let Some(key) = lock(&self.inner.subscriptions).remove(&id) else {
			return false;
		};

		let emptied = {
			let mut groups = lock(&self.inner.groups);
			let Some(group) = groups.get(&key).cloned() else {
				return true;
			};
			let remaining = {
				let mut subscribers = write(&group.subscribers);
				subscribers.remove(&id);
				subscribers.len()
			};
			if remaining == 0 {
				groups.remove(&key);
				Some(group)
			} else {
				None
			}
		};

		info!(subscription = %id, "Subscription removed");

		if let Some(group) = emptied {
			self.inner.supervisor.cancel_and_wait(&group.task_name).await;
			self.inner.release_filter(&group).await;
			info!(
				address = %group.address,
				event = %group.signature,
				"Last subscriber left, observation stopped"
			);
		}
		true
	}

	pub fn subscription_count(&self) -> usize {
		lock(&self.inner.subscriptions).len()
	}

	pub fn status(&self) -> ObserverStatus {
		let subscriptions = self.subscription_count();
		let mut groups: Vec<GroupStatus> = lock(&self.inner.groups)
			.values()
			.map(|group| group.status())
			.collect();
		groups.sort_by(|a, b| (a.address, &a.event).cmp(&(b.address, &b.event)));

		ObserverStatus {
			mode: self.mode(),
			is_active: !groups.is_empty() && !self.inner.stopped.load(Ordering::Acquire),
			subscriptions,
			groups,
		}
	}

	/// Stops every group, releases filters and drops all subscribers
	pub async fn shutdown(&self) {
		if self.inner.stopped.swap(true, Ordering::AcqRel) {
			return;
		}

		let groups: Vec<Arc<SubscriptionGroup>> = lock(&self.inner.groups)
			.drain()
			.map(|(_, group)| group)
			.collect();
		lock(&self.inner.subscriptions).clear();

		for group in groups {
			self.inner.supervisor.cancel_and_wait(&group.task_name).await;
			write(&group.subscribers).clear();
			self.inner.release_filter(&group).await;
		}
		info!("Event observer stopped");
	}
}

impl<T: NodeTransport + 'static> ObserverInner<T> {
	fn mode(&self) -> ObserverMode {
		*read(&self.mode)
	}

	/// Probes filter support once; later callers reuse the outcome
	async fn resolve_mode(&self) -> ObserverMode {
		let _probe = self.probe_lock.lock().await;
		let current = self.mode();
		if current != ObserverMode::Unknown {
			return current;
		}

		let endpoint = self.registry.select_fastest_healthy();
		let query = &self.probe_query;
		let outcome = self
			.tracked(
				&endpoint,
				"eth_newFilter",
				query.to_params(),
				self.client.new_filter(&endpoint, query),
			)
			.await;

		let mode = match outcome {
			Ok(filter_id) => {
				if let Err(e) = self
					.tracked(
						&endpoint,
						"eth_uninstallFilter",
						json!([filter_id]),
						self.client.uninstall_filter(&endpoint, &filter_id),
					)
					.await
				{
					debug!(endpoint = %endpoint, error = %e, "Failed to release probe filter");
				}
				info!(endpoint = %endpoint, "Endpoint supports log filters, using filter mode");
				*lock(&self.active_endpoint) = Some(endpoint);
				ObserverMode::Filter
			}
			Err(TransportError::UnsupportedMethod(message)) => {
				info!(endpoint = %endpoint, reason = %message, "Log filters unsupported, using polling mode");
				ObserverMode::Polling
			}
			Err(e) => {
				warn!(endpoint = %endpoint, error = %e, "Filter probe failed, defaulting to polling mode");
				ObserverMode::Polling
			}
		};

		*write(&self.mode) = mode;
		mode
	}

	/// Permanently switches from filter mode to polling mode
	fn downgrade(&self, endpoint: &str, error: &TransportError) {
		{
			let mut mode = write(&self.mode);
			if *mode != ObserverMode::Filter {
				return;
			}
			*mode = ObserverMode::Polling;
		}
		warn!(endpoint = %endpoint, error = %error, "Downgrading event observer to polling mode");
		if error.is_connection_level() {
			self.registry
				.demote(endpoint, &format!("filter polling failed: {}", error));
		}
	}

	fn spawn_group(self: &Arc<Self>, group: Arc<SubscriptionGroup>) {
		let inner = Arc::clone(self);
		let name = group.task_name.clone();
		self.supervisor.spawn(name, async move {
			loop {
				inner.tick(&group).await;
				tokio::time::sleep(inner.tick_period()).await;
			}
		});
	}

	fn tick_period(&self) -> Duration {
		match self.mode() {
			ObserverMode::Filter => self.config.filter_poll_interval(),
			ObserverMode::Unknown | ObserverMode::Polling => self.config.block_poll_interval(),
		}
	}

	async fn tick(&self, group: &SubscriptionGroup) {
		match self.mode() {
			ObserverMode::Filter => self.filter_tick(group).await,
			ObserverMode::Unknown | ObserverMode::Polling => self.polling_tick(group).await,
		}
	}

	async fn filter_tick(&self, group: &SubscriptionGroup) {
		let endpoint = lock(&self.active_endpoint)
			.get_or_insert_with(|| self.registry.select_fastest_healthy())
			.clone();

		let installed = lock(&group.state)
			.filter
			.as_ref()
			.filter(|filter| filter.endpoint == endpoint)
			.map(|filter| filter.id.clone());
		let filter_id = match installed {
			Some(id) => id,
			None => match self.install_filter(group, &endpoint).await {
				Ok(id) => id,
				Err(e) => return self.filter_failed(group, &endpoint, e),
			},
		};

		let changes = self
			.tracked(
				&endpoint,
				"eth_getFilterChanges",
				json!([filter_id]),
				self.client.get_filter_changes(&endpoint, &filter_id),
			)
			.await;

		match changes {
			Ok(logs) => {
				if let Some(highest) = self.dispatch(group, &logs) {
					group.advance(highest);
				}
			}
			Err(TransportError::FilterNotFound(_)) => {
				debug!(
					endpoint = %endpoint,
					address = %group.address,
					"Filter expired on the node, recreating"
				);
				lock(&group.state).filter = None;
				if let Err(e) = self.install_filter(group, &endpoint).await {
					self.filter_failed(group, &endpoint, e);
				}
			}
			Err(e) => self.filter_failed(group, &endpoint, e),
		}
	}

	fn filter_failed(&self, group: &SubscriptionGroup, endpoint: &str, error: TransportError) {
		if error.is_connection_level() || matches!(error, TransportError::UnsupportedMethod(_)) {
			self.downgrade(endpoint, &error);
		} else {
			warn!(
				endpoint = %endpoint,
				address = %group.address,
				error = %error,
				"Filter poll failed, retrying next tick"
			);
		}
	}

	/// Installs the group's filter and anchors its block cursor at the head
	async fn install_filter(
		&self,
		group: &SubscriptionGroup,
		endpoint: &str,
	) -> Result<String, TransportError> {
		let query = group.query();
		let filter_id = self
			.tracked(
				endpoint,
				"eth_newFilter",
				query.to_params(),
				self.client.new_filter(endpoint, &query),
			)
			.await?;

		if group.last_polled_block().is_none() {
			match self
				.tracked(
					endpoint,
					"eth_blockNumber",
					json!([]),
					self.client.block_number(endpoint),
				)
				.await
			{
				Ok(head) => group.advance(head),
				Err(e) => debug!(endpoint = %endpoint, error = %e, "Could not anchor filter at head"),
			}
		}

		let mut state = lock(&group.state);
		state.filter = Some(InstalledFilter {
			id: filter_id.clone(),
			endpoint: endpoint.to_string(),
		});
		state.endpoint = Some(endpoint.to_string());
		debug!(endpoint = %endpoint, filter = %filter_id, address = %group.address, "Filter installed");
		Ok(filter_id)
	}

	/// Uninstalls the group's filter, if any; failures are only logged
	async fn release_filter(&self, group: &SubscriptionGroup) {
		let Some(filter) = lock(&group.state).filter.take() else {
			return;
		};
		let released = self
			.tracked(
				&filter.endpoint,
				"eth_uninstallFilter",
				json!([filter.id]),
				self.client.uninstall_filter(&filter.endpoint, &filter.id),
			)
			.await;
		match released {
			Ok(_) => debug!(endpoint = %filter.endpoint, filter = %filter.id, "Filter released"),
			Err(e) => debug!(endpoint = %filter.endpoint, error = %e, "Failed to release filter"),
		}
	}

	async fn polling_tick(&self, group: &SubscriptionGroup) {
		self.release_filter(group).await;

		let endpoint = self.registry.select_next_healthy();
		lock(&group.state).endpoint = Some(endpoint.clone());

		let head = match self
			.tracked(
				&endpoint,
				"eth_blockNumber",
				json!([]),
				self.client.block_number(&endpoint),
			)
			.await
		{
			Ok(head) => head,
			Err(e) => {
				warn!(endpoint = %endpoint, error = %e, "Failed to fetch chain head, retrying next tick");
				return;
			}
		};

		let Some(last) = group.last_polled_block() else {
			group.advance(head);
			debug!(address = %group.address, head, "Block cursor initialised at chain head");
			return;
		};
		if head <= last {
			return;
		}

		let target = head.min(last.saturating_add(self.config.max_blocks_per_tick));
		let batch_size = self.config.batch_size.max(1);
		let mut from = last + 1;
		while from <= target {
			if from > last + 1 {
				tokio::time::sleep(self.config.batch_pause()).await;
			}
			let to = target.min(from.saturating_add(batch_size - 1));

			match self.fetch_range(group, &endpoint, from, to).await {
				Ok(logs) => {
					self.dispatch(group, &logs);
					group.advance(to);
				}
				Err(e) => {
					warn!(
						endpoint = %endpoint,
						address = %group.address,
						from,
						to,
						error = %e,
						"Log range failed, retrying next tick"
					);
					return;
				}
			}
			from = to + 1;
		}

		if target < head {
			debug!(address = %group.address, behind = head - target, "Catching up on later ticks");
		}
	}

	/// Fetches one log range, waiting and retrying once when rate limited
	async fn fetch_range(
		&self,
		group: &SubscriptionGroup,
		endpoint: &str,
		from: u64,
		to: u64,
	) -> Result<Vec<Log>, TransportError> {
		let query = group.query().with_range(from, to);

		let query = &query;
		let this = self;
		(|| async move {
			this.tracked(
				endpoint,
				"eth_getLogs",
				query.to_params(),
				this.client.get_logs(endpoint, query),
			)
			.await
		})
		.retry(
			ConstantBuilder::default()
				.with_delay(self.config.rate_limit_backoff())
				.with_max_times(1),
		)
		.sleep(tokio::time::sleep)
		.when(TransportError::is_rate_limited)
		.notify(|error: &TransportError, delay: Duration| {
			warn!(
				endpoint = %endpoint,
				from,
				to,
				error = %error,
				"Rate limited, retrying in {:?}",
				delay
			);
		})
		.await
	}

	/// Decodes logs and queues them for every subscriber
	///
	/// # Returns
	/// * `Option<u64>` - Highest block number among the logs
	fn dispatch(&self, group: &SubscriptionGroup, logs: &[Log]) -> Option<u64> {
		if logs.is_empty() {
			return None;
		}

		let mut events: Vec<EventLog> = logs
			.iter()
			.map(|log| EventLog::from_rpc_log(&group.signature, log))
			.collect();
		events.sort_by_key(|event| (event.block_number, event.log_index));
		let highest = events.iter().filter_map(|event| event.block_number).max();

		let subscribers = read(&group.subscribers);
		debug!(
			address = %group.address,
			event = %group.signature,
			logs = events.len(),
			subscribers = subscribers.len(),
			"Dispatching events"
		);
		for (id, sender) in subscribers.iter() {
			let batch = EventBatch {
				subscription_id: *id,
				address: group.address,
				event: group.signature.canonical().to_string(),
				logs: events.clone(),
			};
			if sender.send(batch).is_err() {
				debug!(subscription = %id, "Subscriber dispatcher has stopped");
			}
		}
		highest
	}

	/// Runs an observer RPC while recording it in telemetry and the registry
	async fn tracked<R, F>(
		&self,
		endpoint: &str,
		method: &str,
		params: Value,
		call: F,
	) -> Result<R, TransportError>
	where
		F: Future<Output = Result<R, TransportError>>,
	{
		let id = self
			.telemetry
			.start_call(endpoint, method, &params, CallTags::source(OBSERVER_SOURCE));
		let result = call.await;
		match &result {
			Ok(_) => {
				self.telemetry.finish_call(id, None);
				self.registry.report_success(endpoint);
			}
			Err(e) => {
				self.telemetry.finish_call(id, Some(e.kind()));
				if e.is_endpoint_fault() {
					self.registry.report_failure(endpoint, &e.to_string());
				}
			}
		}
		result
	}
}

async fn deliver(mut receiver: UnboundedReceiver<EventBatch>, callback: EventCallback) {
	while let Some(batch) = receiver.recv().await {
		callback(batch);
	}
}

fn parse_address(address: &str) -> Result<Address, ObserverError> {
	Address::from_str(address.trim()).map_err(|_| ObserverError::InvalidAddress(address.to_string()))
}
