//! Offline Sync Client Module
//!
//! This module wires the offline mutation queue, the background drain loop and
//! the cache/transport boundaries into one owned [`OfflineClient`].
//!
//! # Architecture
//!
//! - **`cache`** - normalized cache boundary and the in-memory reference cache
//! - **`transport`** - GraphQL transport boundary and the HTTP transport
//! - **`local_db`** - SQLite persistence of the queue
//! - **`offline`** - intercept, queue, identifier map, snapshots, fallback reads
//! - **`sync`** - replay executor, discard policy, network monitor, drain loop
//!
//! # Example
//!
//! ```rust,no_run
//! use xfsync::client::{MutationOutcome, OfflineClient};
//! use xfsync::client::offline::MutationContext;
//! use xfsync::shared::{Operation, SyncConfig};
//! use serde_json::json;
//!
//! # async fn run() -> xfsync::shared::error::Result<()> {
//! let config = SyncConfig::builder()
//!     .endpoint("https://api.example.com/graphql")
//!     .build()?;
//! let client = OfflineClient::builder(config).build().await?;
//!
//! let add = Operation::new("mutation AddTodo($name: String!) { addTodo(name: $name) { __typename id name } }")
//!     .with_variables(json!({"name": "milk"}));
//! if let MutationOutcome::Pending(pending) = client.mutate(add, MutationContext::new()).await? {
//!     println!("shown now: {}", pending.optimistic());
//!     println!("confirmed: {}", pending.committed().await?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod local_db;
pub mod offline;
pub mod sync;
pub mod transport;

use crate::client::cache::{MemoryCache, NormalizedCache};
use crate::client::local_db::LocalDatabase;
use crate::client::offline::id_map::IdMap;
use crate::client::offline::intercept::{Dispatched, MutationContext, MutationIntercept};
use crate::client::offline::queue::MutationQueue;
use crate::client::offline::retry::BackoffStrategy;
use crate::client::offline::{MutationEffect, QueryFallbackReader};
use crate::client::sync::{
    ConflictResolver, DiscardPolicy, HydrationGate, NetworkMonitor, NetworkStatus, ReplayExecutor, ReplayMetrics,
    SyncService, SyncState,
};
use crate::client::transport::{HttpTransport, Transport};
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::event::{QueueEvent, QueueEventBroadcast};
use crate::shared::graphql::Operation;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

/// A queued mutation awaiting the server
#[derive(Debug)]
pub struct PendingMutation {
    effect_id: Uuid,
    optimistic: Value,
    completion: oneshot::Receiver<Result<Value>>,
}

impl PendingMutation {
    /// Effect ID of the queued mutation
    pub fn effect_id(&self) -> Uuid {
        self.effect_id
    }

    /// Result returned at issuance
    pub fn optimistic(&self) -> &Value {
        &self.optimistic
    }

    /// Wait for the server to commit the mutation
    ///
    /// Resolves with the committed data, or with the error that made the queue
    /// discard the mutation. Dropping the future (or the `PendingMutation`)
    /// leaves the effect queued.
    pub async fn committed(self) -> Result<Value> {
        self.completion
            .await
            .map_err(|_| SyncError::storage("Mutation queue closed before the effect settled"))?
    }
}

/// Result of [`OfflineClient::mutate`]
#[derive(Debug)]
pub enum MutationOutcome {
    /// Sent directly and confirmed
    Completed(Value),
    /// Queued; the optimistic result is available now
    Pending(PendingMutation),
}

impl MutationOutcome {
    /// The result the caller sees right away
    pub fn immediate(&self) -> &Value {
        match self {
            Self::Completed(data) => data,
            Self::Pending(pending) => pending.optimistic(),
        }
    }
}

/// Builder for [`OfflineClient`]
pub struct OfflineClientBuilder {
    config: SyncConfig,
    cache: Option<Arc<dyn NormalizedCache>>,
    transport: Option<Arc<dyn Transport>>,
    database: Option<LocalDatabase>,
    resolver: Option<ConflictResolver>,
    backoff: Option<BackoffStrategy>,
    network_status: NetworkStatus,
}

impl OfflineClientBuilder {
    /// Cache to keep in sync (default: [`MemoryCache`])
    pub fn cache(mut self, cache: Arc<dyn NormalizedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Transport for the backend (default: [`HttpTransport`] for the configured endpoint)
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Queue store (default: the configured database path)
    pub fn database(mut self, database: LocalDatabase) -> Self {
        self.database = Some(database);
        self
    }

    /// Resolver for rejected conditional writes
    pub fn conflict_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Delay between transient failures (default: exponential from the config)
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Reachability at startup (default: online)
    pub fn network_status(mut self, status: NetworkStatus) -> Self {
        self.network_status = status;
        self
    }

    /// Open the store, load persisted state and start the drain loop
    pub async fn build(self) -> Result<OfflineClient> {
        let config = self.config;
        config.validate()?;

        let cache = self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };
        let database = match self.database {
            Some(database) => database,
            None => LocalDatabase::open(config.resolved_database_path()).await?,
        };

        let (events, _) = broadcast::channel(config.event_capacity);
        let queue = Arc::new(MutationQueue::new(database, cache.clone(), events.clone()));
        let intercept = Arc::new(MutationIntercept::new(
            transport.clone(),
            queue.clone(),
            config.offline_enabled,
        ));

        let gate = HydrationGate::new();
        let pending = queue.hydrate().await?;
        gate.open();

        let monitor = NetworkMonitor::new(self.network_status).with_events(events.clone());
        let executor = Arc::new(ReplayExecutor::new(intercept.clone(), queue.clone(), gate));

        let mut policy = DiscardPolicy::new(config.max_retries);
        if let Some(resolver) = self.resolver {
            policy = policy.with_resolver(resolver);
        }
        let backoff = self.backoff.unwrap_or(BackoffStrategy::Exponential {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
        });

        let mut service = SyncService::new(executor, policy, queue.clone(), monitor.clone(), backoff, events.clone());
        service.start();

        tracing::info!(
            "[Sync] Client ready for {} ({} effects pending, offline {})",
            config.endpoint,
            pending,
            if config.offline_enabled { "enabled" } else { "disabled" }
        );

        Ok(OfflineClient {
            fallback: QueryFallbackReader::new(cache.clone()),
            config,
            cache,
            transport,
            queue,
            intercept,
            monitor,
            events,
            service,
        })
    }
}

/// Owned offline-capable GraphQL client
///
/// Dropping the client stops the drain loop; queued effects stay on disk.
pub struct OfflineClient {
    config: SyncConfig,
    cache: Arc<dyn NormalizedCache>,
    transport: Arc<dyn Transport>,
    queue: Arc<MutationQueue>,
    intercept: Arc<MutationIntercept>,
    fallback: QueryFallbackReader,
    monitor: NetworkMonitor,
    events: QueueEventBroadcast,
    service: SyncService,
}

impl OfflineClient {
    /// Start building a client
    pub fn builder(config: SyncConfig) -> OfflineClientBuilder {
        OfflineClientBuilder {
            config,
            cache: None,
            transport: None,
            database: None,
            resolver: None,
            backoff: None,
            network_status: NetworkStatus::Online,
        }
    }

    /// Issue a mutation
    ///
    /// With offline support enabled the mutation is queued and the optimistic
    /// result (or a null skeleton of its top-level fields) is returned without
    /// network I/O. Otherwise it is sent and its result written to the cache.
    pub async fn mutate(&self, operation: Operation, context: MutationContext) -> Result<MutationOutcome> {
        let update = context.update_fn().cloned();
        let refetch = context.refetch_queries().to_vec();
        let forwarded = operation.clone();

        match self.intercept.dispatch(operation, context).await? {
            Dispatched::Queued {
                effect_id,
                result,
                completion,
            } => Ok(MutationOutcome::Pending(PendingMutation {
                effect_id,
                optimistic: result,
                completion,
            })),
            Dispatched::Forwarded(response) => {
                if !response.errors.is_empty() {
                    return Err(SyncError::graphql(response.errors));
                }
                let data = response.data.unwrap_or(Value::Null);
                self.queue.write_confirmed(&forwarded, &data, update.as_ref()).await?;
                for query in &refetch {
                    if let Err(e) = self.query(query.clone()).await {
                        tracing::warn!("[Sync] Refetch of {} failed: {}", query.cache_key(), e);
                    }
                }
                Ok(MutationOutcome::Completed(data))
            }
        }
    }

    /// Run a query
    ///
    /// Offline, or when the request fails at the network level, the result
    /// comes from the cache. Online results are written to the cache.
    pub async fn query(&self, query: Operation) -> Result<Value> {
        if !self.monitor.is_online() {
            return self.fallback.read(&query);
        }

        match self.transport.execute(&query).await {
            Ok(response) if response.errors.is_empty() => {
                let data = response.data.unwrap_or(Value::Null);
                self.queue.write_confirmed(&query, &data, None).await?;
                Ok(data)
            }
            Ok(response) => Err(SyncError::graphql(response.errors)),
            Err(SyncError::Network { message, .. }) => {
                tracing::debug!("[Sync] Query failed ({}), serving from cache", message);
                self.fallback.read(&query)
            }
            Err(e) => Err(e),
        }
    }

    /// Report reachability
    pub fn set_network_status(&self, status: NetworkStatus) -> bool {
        self.monitor.set_status(status)
    }

    /// Report the backend reachable or not
    pub fn set_online(&self, online: bool) -> bool {
        self.set_network_status(if online { NetworkStatus::Online } else { NetworkStatus::Offline })
    }

    /// Drain loop status
    pub async fn status(&self) -> SyncState {
        self.service.get_status().await
    }

    pub async fn metrics(&self) -> ReplayMetrics {
        self.service.metrics().await
    }

    /// Receive queue events
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Effects not yet committed or discarded
    pub async fn pending_count(&self) -> usize {
        self.queue.pending_count().await
    }

    /// Queued effects in replay order
    pub async fn pending_effects(&self) -> Vec<MutationEffect> {
        self.queue.effects().await
    }

    /// Current identifier map
    pub async fn id_map(&self) -> IdMap {
        self.queue.id_map().await
    }

    pub fn cache(&self) -> &Arc<dyn NormalizedCache> {
        &self.cache
    }

    pub fn network_monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stop the drain loop and close the store
    pub async fn shutdown(mut self) {
        self.service.stop();
        self.queue.database().close().await;
        tracing::info!("[Sync] Client shut down");
    }
}
