//! Service and action contracts
//!
//! A contract pairs the schemas of a call shape: request/response for a
//! service, goal/feedback/result for an action. The binder validates and
//! encodes outgoing values and hands them to a [`CallTransport`]; it never
//! moves bytes itself. Each call yields a [`Pending`] handle that receives
//! exactly one terminal outcome, delivered through the [`Completer`] the
//! transport was given.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::codec::{Codec, CodecLimits};
use crate::error::{CallError, CodecError, RegistryError};
use crate::registry::SchemaRegistry;
use crate::schema::{Schema, SchemaKind};
use crate::value::Value;

/// Request/response pairing of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContract {
    pub name: String,
    pub request: String,
    pub response: String,
}

/// Goal/feedback/result triplet of an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContract {
    pub name: String,
    pub goal: String,
    pub feedback: String,
    pub result: String,
}

/// Bind a service contract; both schemas must be registered with matching kinds
pub fn bind_service(
    registry: &SchemaRegistry,
    name: &str,
    request: &str,
    response: &str,
) -> Result<ServiceContract, RegistryError> {
    require(registry, name, request, SchemaKind::ServiceRequest)?;
    require(registry, name, response, SchemaKind::ServiceResponse)?;
    Ok(ServiceContract {
        name: name.to_string(),
        request: request.to_string(),
        response: response.to_string(),
    })
}

/// Bind an action contract; all three schemas must be registered with matching kinds
pub fn bind_action(
    registry: &SchemaRegistry,
    name: &str,
    goal: &str,
    feedback: &str,
    result: &str,
) -> Result<ActionContract, RegistryError> {
    require(registry, name, goal, SchemaKind::ActionGoal)?;
    require(registry, name, feedback, SchemaKind::ActionFeedback)?;
    require(registry, name, result, SchemaKind::ActionResult)?;
    Ok(ActionContract {
        name: name.to_string(),
        goal: goal.to_string(),
        feedback: feedback.to_string(),
        result: result.to_string(),
    })
}

/// Bind `pkg/srv/Name` to `pkg/srv/Name_Request` and `pkg/srv/Name_Response`
pub fn bind_service_by_name(registry: &SchemaRegistry, name: &str) -> Result<ServiceContract, RegistryError> {
    bind_service(
        registry,
        name,
        &format!("{}{}", name, SchemaKind::ServiceRequest.suffix()),
        &format!("{}{}", name, SchemaKind::ServiceResponse.suffix()),
    )
}

/// Bind `pkg/action/Name` to its `_Goal`, `_Feedback` and `_Result` schemas
pub fn bind_action_by_name(registry: &SchemaRegistry, name: &str) -> Result<ActionContract, RegistryError> {
    bind_action(
        registry,
        name,
        &format!("{}{}", name, SchemaKind::ActionGoal.suffix()),
        &format!("{}{}", name, SchemaKind::ActionFeedback.suffix()),
        &format!("{}{}", name, SchemaKind::ActionResult.suffix()),
    )
}

fn require<'a>(
    registry: &'a SchemaRegistry,
    contract: &str,
    schema: &str,
    kind: SchemaKind,
) -> Result<&'a Schema, RegistryError> {
    let found = registry
        .lookup(schema)
        .ok_or_else(|| RegistryError::UnresolvedReference {
            from: contract.to_string(),
            target: schema.to_string(),
            suggestion: registry.search(schema, 1).first().map(|s| s.to_string()),
        })?;
    if found.kind != kind {
        return Err(RegistryError::KindMismatch {
            name: schema.to_string(),
            expected: kind.to_string(),
            actual: found.kind.to_string(),
        });
    }
    Ok(found)
}

// =============================================================================
// Pending
// =============================================================================

/// Handle to an outstanding call
///
/// Resolves exactly once: to the decoded response, a transport failure,
/// `Cancelled`, or `Abandoned` if the transport dropped the call. No timeout
/// is applied; wrap the future in one if a deadline is needed.
#[derive(Debug)]
pub struct Pending<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T, CallError>>,
    cancelled: bool,
    /// An outcome has been handed out; `rx` must not be touched again
    done: bool,
}

impl<T> Pending<T> {
    fn new(id: u64, rx: oneshot::Receiver<Result<T, CallError>>) -> Self {
        Self {
            id,
            rx,
            cancelled: false,
            done: false,
        }
    }

    /// Call id shared with the transport side
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Give up on the call
    ///
    /// If the transport already completed the call, that outcome is still
    /// delivered; otherwise the handle resolves to `Cancelled`.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.rx.close();
    }

    /// Take the outcome if it has arrived, without waiting
    ///
    /// Returns `None` while the call is outstanding and on every call after
    /// the outcome has been taken.
    pub fn try_outcome(&mut self) -> Option<Result<T, CallError>> {
        if self.done {
            return None;
        }
        let outcome = match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(self.closed_error()),
        };
        self.done = true;
        Some(outcome)
    }

    /// Whether the outcome has already been handed out
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn closed_error(&self) -> CallError {
        if self.cancelled {
            CallError::Cancelled
        } else {
            CallError::Abandoned
        }
    }
}

/// Once the outcome has been taken (by `try_outcome` or an earlier poll)
/// the future never resolves again.
impl<T> Future for Pending<T> {
    type Output = Result<T, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.done {
            return Poll::Pending;
        }
        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(_)) => Err(self.closed_error()),
            Poll::Pending => return Poll::Pending,
        };
        self.done = true;
        Poll::Ready(outcome)
    }
}

// =============================================================================
// Transport side
// =============================================================================

/// Delivers the outcome of one call; consumed on use
#[derive(Debug)]
pub struct Completer {
    id: u64,
    tx: oneshot::Sender<Result<Value, CallError>>,
    registry: Arc<SchemaRegistry>,
    response: String,
    limits: CodecLimits,
}

impl Completer {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the caller has cancelled or dropped its handle
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Decode the response bytes and deliver them
    ///
    /// Malformed bytes resolve the call to `CallError::Decode`. Returns
    /// whether the caller was still waiting.
    pub fn complete(self, response: &[u8]) -> bool {
        let outcome = decode_with(&self.registry, &self.response, response, self.limits)
            .map_err(CallError::Decode);
        self.deliver(outcome)
    }

    /// Resolve the call to a transport failure
    pub fn fail(self, reason: impl Into<String>) -> bool {
        let outcome = Err(CallError::Transport(reason.into()));
        self.deliver(outcome)
    }

    /// Resolve the call to `Cancelled`
    pub fn cancel(self) -> bool {
        self.deliver(Err(CallError::Cancelled))
    }

    fn deliver(self, outcome: Result<Value, CallError>) -> bool {
        let ok = outcome.is_ok();
        let delivered = self.tx.send(outcome).is_ok();
        debug!(call = self.id, ok, delivered, "call completed");
        delivered
    }
}

fn decode_with(
    registry: &SchemaRegistry,
    schema: &str,
    bytes: &[u8],
    limits: CodecLimits,
) -> Result<Value, CodecError> {
    let schema = registry.lookup(schema).ok_or_else(|| CodecError::UnresolvedSchema {
        path: String::new(),
        name: schema.to_string(),
    })?;
    Codec::new(registry).with_limits(limits).decode(bytes, schema)
}

/// An encoded service request awaiting transport
#[derive(Debug)]
pub struct OutboundCall {
    pub id: u64,
    pub service: String,
    pub request: Bytes,
    pub completer: Completer,
}

/// An encoded action goal awaiting transport
#[derive(Debug)]
pub struct OutboundGoal {
    pub id: u64,
    pub action: String,
    pub goal: Bytes,
    pub completer: GoalCompleter,
}

/// Transport side of an action: streams feedback, then completes once
#[derive(Debug)]
pub struct GoalCompleter {
    feedback_tx: mpsc::UnboundedSender<Value>,
    feedback: String,
    result: Completer,
}

impl GoalCompleter {
    pub fn id(&self) -> u64 {
        self.result.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.result.is_cancelled()
    }

    /// Decode one feedback message and forward it to the caller
    pub fn publish_feedback(&self, feedback: &[u8]) -> Result<(), CodecError> {
        let value = decode_with(&self.result.registry, &self.feedback, feedback, self.result.limits)?;
        // Caller may have dropped its feedback stream; that is not an error
        let _ = self.feedback_tx.send(value);
        Ok(())
    }

    pub fn complete(self, result: &[u8]) -> bool {
        self.result.complete(result)
    }

    pub fn fail(self, reason: impl Into<String>) -> bool {
        self.result.fail(reason)
    }

    pub fn cancel(self) -> bool {
        self.result.cancel()
    }
}

/// Caller side of an action
#[derive(Debug)]
pub struct GoalHandle {
    pub result: Pending<Value>,
    feedback_rx: mpsc::UnboundedReceiver<Value>,
}

impl GoalHandle {
    pub fn id(&self) -> u64 {
        self.result.id()
    }

    /// Next feedback message; `None` once the goal has finished
    pub async fn next_feedback(&mut self) -> Option<Value> {
        self.feedback_rx.recv().await
    }

    /// Feedback that has already arrived, without waiting
    pub fn try_feedback(&mut self) -> Option<Value> {
        self.feedback_rx.try_recv().ok()
    }
}

/// External collaborator that moves encoded calls and their responses
pub trait CallTransport: Send + Sync {
    fn submit(&self, call: OutboundCall);

    fn submit_goal(&self, goal: OutboundGoal) {
        goal.completer.fail("transport does not carry actions");
    }
}

// =============================================================================
// Binder
// =============================================================================

/// Binds contracts against a frozen registry and issues calls through a transport
pub struct ContractBinder {
    registry: Arc<SchemaRegistry>,
    transport: Arc<dyn CallTransport>,
    limits: CodecLimits,
    next_id: AtomicU64,
}

impl ContractBinder {
    pub fn new(registry: Arc<SchemaRegistry>, transport: Arc<dyn CallTransport>) -> Self {
        Self {
            registry,
            transport,
            limits: CodecLimits::default(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn bind_service(&self, name: &str, request: &str, response: &str) -> Result<ServiceContract, RegistryError> {
        bind_service(&self.registry, name, request, response)
    }

    pub fn bind_action(
        &self,
        name: &str,
        goal: &str,
        feedback: &str,
        result: &str,
    ) -> Result<ActionContract, RegistryError> {
        bind_action(&self.registry, name, goal, feedback, result)
    }

    /// Validate, encode and submit a service request
    pub fn invoke(&self, contract: &ServiceContract, request: &Value) -> Result<Pending<Value>, CodecError> {
        let payload = self.encode(&contract.request, request)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        debug!(call = id, service = %contract.name, bytes = payload.len(), "submitting call");
        self.transport.submit(OutboundCall {
            id,
            service: contract.name.clone(),
            request: payload,
            completer: self.completer(id, tx, &contract.response),
        });
        Ok(Pending::new(id, rx))
    }

    /// Validate, encode and submit an action goal
    pub fn send_goal(&self, contract: &ActionContract, goal: &Value) -> Result<GoalHandle, CodecError> {
        let payload = self.encode(&contract.goal, goal)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        debug!(call = id, action = %contract.name, bytes = payload.len(), "submitting goal");
        self.transport.submit_goal(OutboundGoal {
            id,
            action: contract.name.clone(),
            goal: payload,
            completer: GoalCompleter {
                feedback_tx,
                feedback: contract.feedback.clone(),
                result: self.completer(id, tx, &contract.result),
            },
        });
        Ok(GoalHandle {
            result: Pending::new(id, rx),
            feedback_rx,
        })
    }

    fn encode(&self, schema: &str, value: &Value) -> Result<Bytes, CodecError> {
        let schema = self
            .registry
            .lookup(schema)
            .ok_or_else(|| CodecError::UnresolvedSchema {
                path: String::new(),
                name: schema.to_string(),
            })?;
        Codec::new(self.registry.as_ref())
            .with_limits(self.limits)
            .encode(value, schema)
    }

    fn completer(&self, id: u64, tx: oneshot::Sender<Result<Value, CallError>>, response: &str) -> Completer {
        Completer {
            id,
            tx,
            registry: Arc::clone(&self.registry),
            response: response.to_string(),
            limits: self.limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register_batch(vec![
                Schema::new(
                    "amr/srv/Echo_Request",
                    SchemaKind::ServiceRequest,
                    vec![FieldDef::new("text", FieldType::String)],
                ),
                Schema::new(
                    "amr/srv/Echo_Response",
                    SchemaKind::ServiceResponse,
                    vec![FieldDef::new("text", FieldType::String)],
                ),
            ])
            .unwrap();
        registry
    }

    #[test]
    fn test_bind_service_by_name() {
        let registry = registry();
        let contract = bind_service_by_name(&registry, "amr/srv/Echo").unwrap();
        assert_eq!(contract.request, "amr/srv/Echo_Request");
        assert_eq!(contract.response, "amr/srv/Echo_Response");
    }

    #[test]
    fn test_bind_rejects_swapped_kinds() {
        let registry = registry();
        let err = bind_service(&registry, "amr/srv/Echo", "amr/srv/Echo_Response", "amr/srv/Echo_Request")
            .unwrap_err();
        assert!(matches!(err, RegistryError::KindMismatch { .. }));
    }

    #[test]
    fn test_bind_missing_schema() {
        let registry = registry();
        let err = bind_action_by_name(&registry, "amr/action/Dock").unwrap_err();
        assert!(matches!(err, RegistryError::UnresolvedReference { ref target, .. } if target == "amr/action/Dock_Goal"));
    }
}
