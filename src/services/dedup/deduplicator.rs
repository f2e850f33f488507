use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
	collections::HashMap,
	future::Future,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

use crate::utils::sync::lock;

/// Canonical deduplication key: the method followed by the compact JSON params
pub fn call_key(method: &str, params: &Value) -> String {
	format!("{}:{}", method, params)
}

/// Request tallies for one call key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStats {
	/// Calls issued with this key, joined or not
	pub requests: u64,
	/// Calls that attached to an existing in-flight operation
	pub joins: u64,
	pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
	pub in_flight: usize,
	pub keys: HashMap<String, KeyStats>,
}

struct PendingCall<O: Clone> {
	id: u64,
	future: Shared<BoxFuture<'static, O>>,
	created_at: Instant,
	join_count: u64,
}

type PendingMap<O> = Arc<Mutex<HashMap<String, PendingCall<O>>>>;

/// Shares one in-flight operation between concurrent callers with the same key
///
/// Entries are removed when the operation settles. Entries older than the window
/// are purged before every `execute`, finished or not, so a stalled operation
/// cannot pin a key forever. Deduplication is not a cache: once an operation
/// settles, the next call with the same key runs again.
pub struct RequestDeduplicator<O: Clone> {
	pending: PendingMap<O>,
	stats: Mutex<HashMap<String, KeyStats>>,
	next_id: AtomicU64,
	window: Duration,
}

impl<O> RequestDeduplicator<O>
where
	O: Clone + Send + Sync + 'static,
{
	pub fn new(window: Duration) -> Self {
		Self {
			pending: Arc::new(Mutex::new(HashMap::new())),
			stats: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(0),
			window,
		}
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	/// Runs `work`, or joins the in-flight operation already running for `key`
	///
	/// # Arguments
	/// * `key` - Identity of the call, usually built with [`call_key`]
	/// * `work` - Operation to start when nothing is in flight for `key`
	///
	/// # Returns
	/// * `O` - The outcome of whichever operation this caller attached to
	pub async fn execute<F>(&self, key: &str, work: F) -> O
	where
		F: Future<Output = O> + Send + 'static,
	{
		let (future, joined) = {
			let mut pending = lock(&self.pending);
			let now = Instant::now();
			let window = self.window;
			pending.retain(|stale_key, call| {
				let fresh = now.duration_since(call.created_at) < window;
				if !fresh {
					debug!(key = %stale_key, joins = call.join_count, "Purging expired pending call");
				}
				fresh
			});

			match pending.get_mut(key) {
				Some(call) => {
					call.join_count += 1;
					(call.future.clone(), true)
				}
				None => {
					let id = self.next_id.fetch_add(1, Ordering::Relaxed);
					let future = self.settling(key.to_string(), id, work);
					pending.insert(
						key.to_string(),
						PendingCall {
							id,
							future: future.clone(),
							created_at: now,
							join_count: 0,
						},
					);
					(future, false)
				}
			}
		};

		self.record(key, joined);
		if joined {
			debug!(key, "Joined in-flight call");
		}

		future.await
	}

	/// Wraps `work` so that it removes its own entry once settled
	fn settling<F>(&self, key: String, id: u64, work: F) -> Shared<BoxFuture<'static, O>>
	where
		F: Future<Output = O> + Send + 'static,
	{
		let pending = Arc::clone(&self.pending);
		async move {
			let output = work.await;
			let mut pending = lock(&pending);
			// A purged entry may already have been replaced by a newer call
			if pending.get(&key).is_some_and(|call| call.id == id) {
				pending.remove(&key);
			}
			output
		}
		.boxed()
		.shared()
	}

	fn record(&self, key: &str, joined: bool) {
		let mut stats = lock(&self.stats);
		let entry = stats.entry(key.to_string()).or_insert_with(|| KeyStats {
			requests: 0,
			joins: 0,
			last_seen: Utc::now(),
		});
		entry.requests += 1;
		if joined {
			entry.joins += 1;
		}
		entry.last_seen = Utc::now();
	}

	/// Number of operations currently in flight
	pub fn in_flight(&self) -> usize {
		lock(&self.pending).len()
	}

	pub fn stats(&self) -> DedupStats {
		DedupStats {
			in_flight: self.in_flight(),
			keys: lock(&self.stats).clone(),
		}
	}

	/// Drops per-key tallies not seen within `max_age`
	pub fn cleanup_stats(&self, max_age: Duration) {
		let Some(cutoff) = chrono::Duration::from_std(max_age)
			.ok()
			.and_then(|age| Utc::now().checked_sub_signed(age))
		else {
			return;
		};
		lock(&self.stats).retain(|_, stats| stats.last_seen >= cutoff);
	}
}
