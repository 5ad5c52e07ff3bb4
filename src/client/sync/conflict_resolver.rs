//! # Conflict and Discard Policy
//!
//! Decides what happens to a head effect whose replay failed. Rules apply in
//! order:
//!
//! 1. A rejected conditional write goes to the user-supplied
//!    [`ConflictResolver`]. It may discard the effect or return replacement
//!    variables to retry with. Anything else (unresolved, an error, a panic,
//!    or no resolver at all) discards. A retry-with counts against the same
//!    retry ceiling as transient failures.
//! 2. Any other GraphQL error discards.
//! 3. A client-side validation error discards.
//! 4. A transient failure retries as-is until the retry ceiling, a permanent
//!    one discards.
//!
//! There is no merging: resolution is one decision per failed mutation.

use crate::client::offline::effect::MutationEffect;
use crate::shared::error::{Result, SyncError};
use crate::shared::graphql::{GraphQLError, OperationType};
use crate::shared::config::DEFAULT_MAX_RETRIES;
use serde_json::{Map, Value};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What the resolver is told about a conflicting mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictResolutionInfo {
    /// Mutation document
    pub mutation: String,
    /// Field the backend reported the conflict on
    pub mutation_name: Option<String>,
    pub operation_type: OperationType,
    /// Variables as last sent
    pub variables: Map<String, Value>,
    /// Item currently stored on the server
    pub conflict_data: Option<Value>,
    /// Retries already attempted
    pub retry_count: u32,
}

/// Resolver verdict
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    /// Drop the mutation
    Discard,
    /// Send the mutation again with these variables
    RetryWith(Map<String, Value>),
    /// No decision; treated as a discard
    Unresolved,
}

/// User-supplied conflict resolver
pub type ConflictResolver = Arc<dyn Fn(&ConflictResolutionInfo) -> Result<ConflictResolution> + Send + Sync>;

/// Policy decision for a failed replay
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Discard,
    RetryAsIs,
    RetryWith(Map<String, Value>),
}

/// Field a conflict error points at, or the mutation's first top-level field
fn conflict_mutation_name(error: &GraphQLError, effect: &MutationEffect) -> Option<String> {
    error
        .path
        .first()
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| effect.operation.root_fields().into_iter().next())
}

#[derive(Clone)]
pub struct DiscardPolicy {
    resolver: Option<ConflictResolver>,
    max_retries: u32,
}

impl fmt::Debug for DiscardPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscardPolicy")
            .field("resolver", &self.resolver.is_some())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for DiscardPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl DiscardPolicy {
    /// Policy that retries transient failures `max_retries` times
    pub fn new(max_retries: u32) -> Self {
        Self {
            resolver: None,
            max_retries,
        }
    }

    /// Route conditional-write conflicts to `resolver`
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide the fate of `effect` after `error`
    ///
    /// `retry_count` is the number of retries already attempted, so the first
    /// failure passes 0 and an always-failing effect is attempted
    /// `max_retries + 1` times.
    pub fn decide(&self, error: &SyncError, effect: &MutationEffect, retry_count: u32) -> Decision {
        if let Some(conflict) = error.conflict() {
            return self.resolve_conflict(conflict, effect, retry_count);
        }

        if error.has_graphql_errors() {
            tracing::debug!("[Sync] Backend rejected {}: {}", effect.id, error);
            return Decision::Discard;
        }

        if error.is_client_validation() {
            return Decision::Discard;
        }

        if error.is_permanent() {
            return Decision::Discard;
        }
        if retry_count >= self.max_retries {
            tracing::warn!("[Sync] {} reached the retry ceiling ({})", effect.id, self.max_retries);
            return Decision::Discard;
        }
        Decision::RetryAsIs
    }

    fn resolve_conflict(&self, conflict: &GraphQLError, effect: &MutationEffect, retry_count: u32) -> Decision {
        let Some(resolver) = &self.resolver else {
            tracing::debug!("[Sync] Conflict on {} with no resolver", effect.id);
            return Decision::Discard;
        };

        let info = ConflictResolutionInfo {
            mutation: effect.operation.document.clone(),
            mutation_name: conflict_mutation_name(conflict, effect),
            operation_type: effect.operation.operation_type,
            variables: effect.operation.variables.clone(),
            conflict_data: conflict.data.clone(),
            retry_count,
        };

        match catch_unwind(AssertUnwindSafe(|| resolver(&info))) {
            Ok(Ok(ConflictResolution::RetryWith(_))) if retry_count >= self.max_retries => {
                tracing::warn!(
                    "[Sync] {} still conflicting at the retry ceiling ({})",
                    effect.id,
                    self.max_retries
                );
                Decision::Discard
            }
            Ok(Ok(ConflictResolution::RetryWith(variables))) => Decision::RetryWith(variables),
            Ok(Ok(ConflictResolution::Discard)) => Decision::Discard,
            Ok(Ok(ConflictResolution::Unresolved)) => Decision::Discard,
            Ok(Err(e)) => {
                tracing::warn!("[Sync] Conflict resolver failed for {}: {}", effect.id, e);
                Decision::Discard
            }
            Err(_) => {
                tracing::error!("[Sync] Conflict resolver panicked for {}", effect.id);
                Decision::Discard
            }
        }
    }

    /// Discard decision for external retry drivers
    ///
    /// Returns `true` to discard. On a retry-with decision the replacement
    /// variables are written into `effect`.
    pub fn should_discard(&self, error: &SyncError, effect: &mut MutationEffect, retry_count: u32) -> bool {
        match self.decide(error, effect, retry_count) {
            Decision::Discard => true,
            Decision::RetryAsIs => false,
            Decision::RetryWith(variables) => {
                effect.operation.variables = variables;
                false
            }
        }
    }
}
