//! # Invocation Planner
//!
//! A [`PendingInvocation`] is the single, deferred call a scenario plans with an
//! "I request ..." step.
//!
//! Planning never touches the network: it checks the decoded payload against the streaming
//! shape of the method and picks the call strategy. The plan can then be configured
//! ([`PendingInvocation::with_header`], [`PendingInvocation::with_timeout`]) until the first
//! [`PendingInvocation::execute`], which performs the call and memoizes its outcome. Every
//! later `execute` returns that same outcome without calling the server again.
//!
//! ## Outcome
//!
//! `execute` returns the nested `Result<Result<String, Status>, InvocationError>`:
//!
//! * `Ok(Ok(text))`: the server replied, `text` is the response in canonical extended JSON.
//! * `Ok(Err(status))`: the call failed. Connection errors and timeouts are reported as
//!   `UNAVAILABLE` and `DEADLINE_EXCEEDED` statuses, so scenarios can assert on them.
//! * `Err(InvocationError)`: the response could not be rendered. This is a local bug,
//!   never a server outcome.
use crate::{
    grpc::{
        client::{CallSpec, GrpcClient, GrpcRequestError},
        dial,
        metadata::{self, HeaderError},
    },
    payload::{self, Payload},
    registry::{ServiceMethod, StreamingShape},
};
use futures_util::TryStreamExt;
use prost_reflect::DynamicMessage;
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{sync::OnceCell, time::Instant};
use tonic::{Code, Status, metadata::MetadataMap};
use tracing::{debug, instrument, warn};

/// Deadline of a call unless a timeout step changes it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("The {shape} method '{method}' takes {expected}, but the payload holds {got}")]
    PayloadArity {
        method: String,
        shape: StreamingShape,
        expected: &'static str,
        got: &'static str,
    },
    #[error("The request was already executed and can no longer be configured")]
    AlreadyExecuted,
    #[error(transparent)]
    InvalidHeader(#[from] HeaderError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    #[error("Failed to render the response of '{method}': {message}")]
    Render { method: String, message: String },
}

/// Memoized outcome of a call.
pub type Outcome = Result<Result<String, Status>, InvocationError>;

/// How the request is sent and the response received, fixed at plan time.
#[derive(Debug, Clone)]
enum Strategy {
    Unary(DynamicMessage),
    ClientStreaming(Vec<DynamicMessage>),
    ServerStreaming(DynamicMessage),
    Bidirectional(Vec<DynamicMessage>),
}

impl Strategy {
    fn plan(method: &ServiceMethod, payload: Payload) -> Result<Self, PlanError> {
        let shape = method.shape();

        let arity_error = |got| PlanError::PayloadArity {
            method: method.full_name().to_string(),
            shape,
            expected: if shape.is_client_streaming() {
                "a sequence of messages"
            } else {
                "a single message"
            },
            got,
        };

        let strategy = match (shape, payload) {
            (StreamingShape::Unary, Payload::Single(message)) => Strategy::Unary(message),
            (StreamingShape::ServerStreaming, Payload::Single(message)) => {
                Strategy::ServerStreaming(message)
            }
            (StreamingShape::ClientStreaming, Payload::Sequence(messages)) => {
                Strategy::ClientStreaming(messages)
            }
            (StreamingShape::Bidirectional, Payload::Sequence(messages)) => {
                Strategy::Bidirectional(messages)
            }
            (_, Payload::Single(_)) => return Err(arity_error("a single message")),
            (_, Payload::Sequence(_)) => return Err(arity_error("a sequence of messages")),
        };

        Ok(strategy)
    }
}

#[derive(Debug)]
struct CallSettings {
    headers: MetadataMap,
    timeout: Duration,
    /// Set by the first call attempt. A cancelled attempt leaves the settings in place for
    /// the next `execute`, but they can no longer change.
    sealed: bool,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            headers: MetadataMap::new(),
            timeout: DEFAULT_TIMEOUT,
            sealed: false,
        }
    }
}

/// The not-yet-executed call of a scenario step.
#[derive(Debug)]
pub struct PendingInvocation {
    method: Arc<ServiceMethod>,
    strategy: Strategy,
    settings: Mutex<CallSettings>,
    outcome: OnceCell<Outcome>,
}

impl PendingInvocation {
    /// Plans a call of `method` with an already decoded payload.
    pub fn plan(method: Arc<ServiceMethod>, payload: Payload) -> Result<Self, PlanError> {
        let strategy = Strategy::plan(&method, payload)?;

        debug!(
            method = %method.full_name(),
            shape = %method.shape(),
            "planned gRPC request"
        );

        Ok(Self {
            method,
            strategy,
            settings: Mutex::new(CallSettings::default()),
            outcome: OnceCell::new(),
        })
    }

    pub fn method(&self) -> &ServiceMethod {
        &self.method
    }

    /// Adds a header to the request.
    pub fn with_header(&self, key: &str, value: &str) -> Result<(), PlanError> {
        self.configure(|settings| {
            metadata::append_header(&mut settings.headers, key, value)?;
            Ok(())
        })
    }

    /// Sets the deadline of the call.
    pub fn with_timeout(&self, timeout: Duration) -> Result<(), PlanError> {
        self.configure(|settings| {
            settings.timeout = timeout;
            Ok(())
        })
    }

    pub fn is_executed(&self) -> bool {
        self.outcome.initialized()
    }

    /// The memoized outcome, if the call already ran.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    /// Performs the call on first use and returns its memoized outcome.
    ///
    /// `ambient` is the scenario metadata at execution time. It is merged after the service
    /// headers and before the headers set on this plan.
    #[instrument(skip_all, fields(method = %self.method.full_name()))]
    pub async fn execute(&self, ambient: &MetadataMap) -> Outcome {
        self.outcome
            .get_or_init(|| self.run_once(ambient))
            .await
            .clone()
    }

    fn configure(
        &self,
        f: impl FnOnce(&mut CallSettings) -> Result<(), PlanError>,
    ) -> Result<(), PlanError> {
        let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);

        if settings.sealed {
            return Err(PlanError::AlreadyExecuted);
        }

        f(&mut *settings)
    }

    /// Seals the configuration and returns the headers and deadline of the call.
    fn seal(&self) -> (MetadataMap, Duration) {
        let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        settings.sealed = true;
        (settings.headers.clone(), settings.timeout)
    }

    async fn run_once(&self, ambient: &MetadataMap) -> Outcome {
        let (planned, timeout) = self.seal();

        let mut headers = self.method.default_metadata().clone();
        metadata::merge(&mut headers, ambient);
        metadata::merge(&mut headers, &planned);

        debug!(?timeout, "executing gRPC request");

        let started = Instant::now();
        let response = match tokio::time::timeout(timeout, self.call(headers, timeout)).await {
            Ok(response) => response.map_err(|status| expired(status, started.elapsed(), timeout)),
            Err(_) => Err(timed_out(timeout)),
        };

        match response {
            Ok(payload) => {
                let text = payload::encode(&payload).map_err(|e| InvocationError::Render {
                    method: self.method.full_name().to_string(),
                    message: e.to_string(),
                })?;

                debug!(messages = payload.len(), "gRPC request succeeded");
                Ok(Ok(text))
            }
            Err(status) => {
                warn!(code = ?status.code(), message = status.message(), "gRPC request failed");
                Ok(Err(status))
            }
        }
    }

    async fn call(&self, headers: MetadataMap, timeout: Duration) -> Result<Payload, Status> {
        let channel = dial::connect(self.method.address(), self.method.dial_options())
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;

        let mut client = GrpcClient::new(channel);

        let spec = CallSpec {
            path: self.method.path().clone(),
            output: self.method.output(),
            metadata: headers,
            timeout,
        };

        let not_ready = |e: GrpcRequestError| Status::unavailable(e.to_string());

        match &self.strategy {
            Strategy::Unary(message) => client
                .unary(spec, message.clone())
                .await
                .map_err(not_ready)?
                .map(Payload::Single),
            Strategy::ServerStreaming(message) => {
                let stream = client
                    .server_streaming(spec, message.clone())
                    .await
                    .map_err(not_ready)??;

                stream.try_collect().await.map(Payload::Sequence)
            }
            Strategy::ClientStreaming(messages) => client
                .client_streaming(spec, tokio_stream::iter(messages.clone()))
                .await
                .map_err(not_ready)?
                .map(Payload::Single),
            Strategy::Bidirectional(messages) => {
                let stream = client
                    .bidirectional_streaming(spec, tokio_stream::iter(messages.clone()))
                    .await
                    .map_err(not_ready)??;

                stream.try_collect().await.map(Payload::Sequence)
            }
        }
    }
}

fn timed_out(timeout: Duration) -> Status {
    Status::deadline_exceeded(format!("request timed out after {timeout:?}"))
}

/// The server enforces the `grpc-timeout` header too, and answers `CANCELLED` when it
/// expires first. Once the deadline has passed that is a `DEADLINE_EXCEEDED`.
fn expired(status: Status, elapsed: Duration, timeout: Duration) -> Status {
    if status.code() == Code::Cancelled && elapsed >= timeout {
        timed_out(timeout)
    } else {
        status
    }
}
