//! # Scenario State
//!
//! Everything a scenario accumulates from one step to the next: the current request plan,
//! the variables used for placeholder substitution, and the metadata attached to outgoing
//! calls. A fresh [`ScenarioState`] is created for every scenario.
use crate::{
    grpc::metadata::{self, HeaderError},
    invocation::{Outcome, PendingInvocation},
};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tonic::metadata::MetadataMap;

/// Variable holding the last response document checked by a payload assertion.
pub const RESPONSE_VAR: &str = "$response";

const REQUEST_EXAMPLE: &str = r#"
    When I request a gRPC method "/grpctest.ItemService/GetItem" with payload:
    """
    {
        "id": 42
    }
    """
"#;

#[derive(Debug, thiserror::Error)]
#[error(
    "No gRPC request was planned, did you forget to set up a gRPC request in the scenario?\n\nFor example:\n{}",
    REQUEST_EXAMPLE
)]
pub struct NoRequestPlanned;

#[derive(Debug, Default)]
pub struct ScenarioState {
    request: Option<Arc<PendingInvocation>>,
    vars: BTreeMap<String, Value>,
    metadata: MetadataMap,
}

impl ScenarioState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `request` the current plan. The previous one is left untouched.
    pub fn install_request(&mut self, request: PendingInvocation) -> Arc<PendingInvocation> {
        let request = Arc::new(request);
        self.request = Some(Arc::clone(&request));
        request
    }

    pub fn current_request(&self) -> Result<&Arc<PendingInvocation>, NoRequestPlanned> {
        self.request.as_ref().ok_or(NoRequestPlanned)
    }

    /// Executes the current plan, or returns its memoized outcome.
    pub async fn execute_current(&self) -> Result<Outcome, NoRequestPlanned> {
        let request = self.current_request()?;
        Ok(request.execute(&self.metadata).await)
    }

    pub fn vars(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Attaches a header to every call executed from now on.
    pub fn append_metadata(&mut self, key: &str, value: &str) -> Result<(), HeaderError> {
        metadata::append_header(&mut self.metadata, key, value)
    }
}
