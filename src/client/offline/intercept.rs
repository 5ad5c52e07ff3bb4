//! # Mutation Intercept
//!
//! Entry point of every mutation. With offline support enabled a first
//! issuance never touches the network: it is queued and answered with its
//! optimistic result. Replays (flagged in the context) and every mutation with
//! offline support disabled go straight to the transport.

use crate::client::offline::effect::MutationEffect;
use crate::client::offline::queue::{Continuations, MutationQueue, UpdateFn};
use crate::client::cache::NormalizedCache;
use crate::client::transport::Transport;
use crate::shared::error::{Result, SyncError};
use crate::shared::graphql::{GraphQLResponse, Operation};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Optimistic response given directly or computed from the variables
#[derive(Clone)]
pub enum OptimisticResponse {
    /// Fixed response tree
    Value(Value),
    /// Function of the mutation variables, evaluated at enqueue time
    Computed(Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>),
}

impl OptimisticResponse {
    fn evaluate(&self, variables: &Map<String, Value>) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Computed(compute) => compute(variables),
        }
    }
}

/// Per-mutation options
#[derive(Clone, Default)]
pub struct MutationContext {
    optimistic: Option<OptimisticResponse>,
    update: Option<UpdateFn>,
    refetch_queries: Vec<Operation>,
    replay: bool,
}

impl MutationContext {
    /// Context with no options set
    pub fn new() -> Self {
        Self::default()
    }

    /// Result returned immediately and written to the cache while queued
    pub fn optimistic_response(mut self, response: Value) -> Self {
        self.optimistic = Some(OptimisticResponse::Value(response));
        self
    }

    /// Optimistic result computed from the variables
    pub fn optimistic_with<F>(mut self, compute: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.optimistic = Some(OptimisticResponse::Computed(Arc::new(compute)));
        self
    }

    /// Cache update run with the optimistic and committed results
    pub fn update<F>(mut self, update: F) -> Self
    where
        F: Fn(&dyn NormalizedCache, &Value) + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(update));
        self
    }

    /// Query re-run after the mutation commits
    pub fn refetch(mut self, query: Operation) -> Self {
        self.refetch_queries.push(query);
        self
    }

    /// Mark the issuance as a replay of a queued effect
    pub fn replay(mut self) -> Self {
        self.replay = true;
        self
    }

    /// Whether this issuance is a replay
    pub fn is_replay(&self) -> bool {
        self.replay
    }

    pub(crate) fn update_fn(&self) -> Option<&UpdateFn> {
        self.update.as_ref()
    }

    pub(crate) fn refetch_queries(&self) -> &[Operation] {
        &self.refetch_queries
    }
}

/// What the intercept did with a mutation
pub enum Dispatched {
    /// Queued; `result` is the immediate optimistic (or null skeleton) result
    Queued {
        effect_id: Uuid,
        result: Value,
        completion: oneshot::Receiver<Result<Value>>,
    },
    /// Sent to the transport
    Forwarded(GraphQLResponse),
}

/// Routes mutations to the queue or the transport
pub struct MutationIntercept {
    transport: Arc<dyn Transport>,
    queue: Arc<MutationQueue>,
    offline_enabled: bool,
}

impl MutationIntercept {
    pub fn new(transport: Arc<dyn Transport>, queue: Arc<MutationQueue>, offline_enabled: bool) -> Self {
        Self {
            transport,
            queue,
            offline_enabled,
        }
    }

    /// Transport used for forwarded operations
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether first issuances are queued
    pub fn offline_enabled(&self) -> bool {
        self.offline_enabled
    }

    /// Queue or forward a mutation
    pub async fn dispatch(&self, operation: Operation, context: MutationContext) -> Result<Dispatched> {
        if context.replay || !self.offline_enabled {
            let response = self.transport.execute(&operation).await?;
            return Ok(Dispatched::Forwarded(response));
        }

        if !operation.is_mutation() {
            return Err(SyncError::validation(
                "operation",
                format!("Only mutations can be queued, got a {}", operation.operation_type),
            ));
        }

        let optimistic = context.optimistic.map(|o| o.evaluate(&operation.variables));
        let mut effect = MutationEffect::new(operation).with_refetch_queries(context.refetch_queries);
        effect.optimistic_response = optimistic;

        let effect_id = effect.id;
        let result = effect.immediate_result();
        let (tx, rx) = oneshot::channel();
        self.queue
            .enqueue(
                effect,
                Continuations {
                    update: context.update,
                    completion: Some(tx),
                },
            )
            .await?;

        Ok(Dispatched::Queued {
            effect_id,
            result,
            completion: rx,
        })
    }
}
