//! Background task supervision.
//!
//! Every periodic behavior of the access layer (health probes, telemetry and
//! recommender sweeps, per-group event polling) runs as a named task owned by a
//! single [`TaskSupervisor`]. Tasks can be cancelled individually by name, and
//! all of them stop when the supervisor shuts down.

use std::{collections::HashMap, future::Future, sync::Mutex, time::Duration};
use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::utils::sync::lock;

/// Owner of the application's background tasks
pub struct TaskSupervisor {
	tasks: Mutex<HashMap<String, JoinHandle<()>>>,
	shutdown_tx: watch::Sender<bool>,
	grace_period: Duration,
}

impl Default for TaskSupervisor {
	fn default() -> Self {
		Self::new()
	}
}

impl TaskSupervisor {
	pub fn new() -> Self {
		let (shutdown_tx, _) = watch::channel(false);
		Self {
			tasks: Mutex::new(HashMap::new()),
			shutdown_tx,
			grace_period: Duration::from_secs(5),
		}
	}

	/// Overrides how long `shutdown` waits for tasks before aborting them
	pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
		self.grace_period = grace_period;
		self
	}

	/// Receiver that flips to `true` when shutdown starts
	pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
		self.shutdown_tx.subscribe()
	}

	pub fn is_shutting_down(&self) -> bool {
		*self.shutdown_tx.borrow()
	}

	/// Spawns a named task that stops when the supervisor shuts down
	///
	/// A running task with the same name is aborted and replaced. Returns `false`
	/// without spawning when shutdown has already started.
	pub fn spawn<F>(&self, name: impl Into<String>, task: F) -> bool
	where
		F: Future<Output = ()> + Send + 'static,
	{
		if self.is_shutting_down() {
			return false;
		}

		let name = name.into();
		let mut shutdown = self.shutdown_signal();
		let handle = tokio::spawn(async move {
			tokio::select! {
				_ = task => {}
				_ = shutdown.wait_for(|stopping| *stopping) => {}
			}
		});

		let mut tasks = lock(&self.tasks);
		tasks.retain(|_, handle| !handle.is_finished());
		if let Some(previous) = tasks.insert(name.clone(), handle) {
			warn!(task = %name, "Replacing running task");
			previous.abort();
		}
		debug!(task = %name, "Task spawned");
		true
	}

	/// Spawns a named task that runs `tick` every `period`, starting immediately
	///
	/// Ticks never overlap: a slow tick delays the next one instead of queueing.
	pub fn spawn_periodic<F, Fut>(&self, name: impl Into<String>, period: Duration, mut tick: F) -> bool
	where
		F: FnMut() -> Fut + Send + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		self.spawn(name, async move {
			let mut ticker = interval(period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			loop {
				ticker.tick().await;
				tick().await;
			}
		})
	}

	/// Aborts a task by name
	///
	/// # Returns
	/// * `true` - A task with that name existed
	pub fn cancel(&self, name: &str) -> bool {
		match lock(&self.tasks).remove(name) {
			Some(handle) => {
				handle.abort();
				debug!(task = %name, "Task cancelled");
				true
			}
			None => false,
		}
	}

	/// Aborts a task by name and waits until it has stopped
	pub async fn cancel_and_wait(&self, name: &str) -> bool {
		let handle = lock(&self.tasks).remove(name);
		match handle {
			Some(handle) => {
				handle.abort();
				let _ = handle.await;
				debug!(task = %name, "Task cancelled");
				true
			}
			None => false,
		}
	}

	pub fn is_running(&self, name: &str) -> bool {
		lock(&self.tasks)
			.get(name)
			.is_some_and(|handle| !handle.is_finished())
	}

	/// Names of tasks that are still running, sorted
	pub fn task_names(&self) -> Vec<String> {
		let mut names: Vec<String> = lock(&self.tasks)
			.iter()
			.filter(|(_, handle)| !handle.is_finished())
			.map(|(name, _)| name.clone())
			.collect();
		names.sort();
		names
	}

	/// Signals every task to stop and waits for them
	///
	/// Tasks still running after the grace period are aborted.
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(true);

		let handles: Vec<(String, JoinHandle<()>)> = lock(&self.tasks).drain().collect();
		info!(tasks = handles.len(), "Stopping background tasks");

		for (name, mut handle) in handles {
			if tokio::time::timeout(self.grace_period, &mut handle)
				.await
				.is_err()
			{
				warn!(task = %name, "Task did not stop in time, aborting");
				handle.abort();
			}
		}
	}
}
