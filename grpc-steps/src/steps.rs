//! # Step Definitions
//!
//! The operations behind every sentence a scenario can use. [`GrpcSteps`] holds the shared,
//! read-only [`Registry`]; all scenario-scoped data lives in the [`ScenarioState`] passed to
//! each operation.
//!
//! The sentences themselves are matched in [`vocabulary`], which lets any BDD runner forward
//! raw step text to [`GrpcSteps::run_step`].
pub mod vocabulary;

use crate::{
    assertion::{self, AssertionError, Comparison},
    config::{InvalidDuration, parse_duration},
    grpc::metadata::HeaderError,
    invocation::{InvocationError, PendingInvocation, PlanError},
    payload::{self, PayloadError},
    registry::Registry,
    scenario::{NoRequestPlanned, RESPONSE_VAR, ScenarioState},
    status::{StatusCodeError, code_name, parse_status_code},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tonic::Status;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Unknown gRPC method '{0}'")]
    UnknownMethod(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] PayloadError),
    #[error(transparent)]
    NoRequestPlanned(#[from] NoRequestPlanned),
    #[error("An error occurred while sending the gRPC request: {} {}", code_name(.0.code()), .0.message())]
    TransportFailure(Status),
    #[error("The gRPC request was already executed and can no longer be configured")]
    AlreadyExecuted,
    #[error(transparent)]
    UnrecognizedStatusCode(#[from] StatusCodeError),
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    #[error(transparent)]
    InvalidHeader(#[from] HeaderError),
    #[error(transparent)]
    InvalidTimeout(#[from] InvalidDuration),
    #[error(transparent)]
    InvalidPlan(PlanError),
    #[error(transparent)]
    Render(#[from] InvocationError),
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Step '{0}' expects a doc string")]
    MissingDocString(String),
    #[error("Undefined step '{0}'")]
    UndefinedStep(String),
}

impl From<PlanError> for StepError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyExecuted => StepError::AlreadyExecuted,
            PlanError::InvalidHeader(e) => StepError::InvalidHeader(e),
            err @ PlanError::PayloadArity { .. } => StepError::InvalidPlan(err),
        }
    }
}

/// gRPC step definitions bound to a method registry.
#[derive(Debug, Clone)]
pub struct GrpcSteps {
    registry: Arc<Registry>,
}

impl GrpcSteps {
    pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
        Self {
            registry: registry.into(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Plans a call of `method` with `text` as payload, after placeholder substitution.
    pub fn request(
        &self,
        state: &mut ScenarioState,
        method: &str,
        text: &str,
    ) -> Result<(), StepError> {
        let method = self
            .registry
            .resolve(method)
            .map_err(|_| StepError::UnknownMethod(method.to_string()))?;

        let text = payload::substitute(text, state.vars());
        let payload = payload::decode(&method.input(), method.shape(), &text)?;
        let request = PendingInvocation::plan(method, payload)?;

        state.install_request(request);
        Ok(())
    }

    pub async fn request_from_file(
        &self,
        state: &mut ScenarioState,
        method: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), StepError> {
        let text = read_file(path).await?;
        self.request(state, method, &text)
    }

    pub fn request_header(
        &self,
        state: &ScenarioState,
        key: &str,
        value: &str,
    ) -> Result<(), StepError> {
        Ok(state.current_request()?.with_header(key, value)?)
    }

    /// Sets the deadline of the planned call, e.g. `"500ms"` or `"2s"`.
    pub fn request_timeout(&self, state: &ScenarioState, timeout: &str) -> Result<(), StepError> {
        let timeout = parse_duration(timeout)?;
        Ok(state.current_request()?.with_timeout(timeout)?)
    }

    /// Attaches a header to every call the scenario executes from now on.
    pub fn outgoing_header(
        &self,
        state: &mut ScenarioState,
        key: &str,
        value: &str,
    ) -> Result<(), StepError> {
        Ok(state.append_metadata(key, value)?)
    }

    /// The response must be exactly `expected`.
    pub async fn response_equals(
        &self,
        state: &mut ScenarioState,
        expected: &str,
    ) -> Result<(), StepError> {
        self.compare_response(state, Comparison::Equal, expected)
            .await
    }

    pub async fn response_equals_file(
        &self,
        state: &mut ScenarioState,
        path: impl AsRef<Path>,
    ) -> Result<(), StepError> {
        let expected = read_file(path).await?;
        self.response_equals(state, &expected).await
    }

    /// Every field of `expected` must be in the response.
    pub async fn response_matches(
        &self,
        state: &mut ScenarioState,
        expected: &str,
    ) -> Result<(), StepError> {
        self.compare_response(state, Comparison::Match, expected)
            .await
    }

    pub async fn response_matches_file(
        &self,
        state: &mut ScenarioState,
        path: impl AsRef<Path>,
    ) -> Result<(), StepError> {
        let expected = read_file(path).await?;
        self.response_matches(state, &expected).await
    }

    pub async fn response_has_code(
        &self,
        state: &ScenarioState,
        code: &str,
    ) -> Result<(), StepError> {
        let code = parse_status_code(code)?;
        let outcome = state.execute_current().await??;

        Ok(assertion::assert_error_code(&outcome, code)?)
    }

    pub async fn response_has_error_message(
        &self,
        state: &ScenarioState,
        message: &str,
    ) -> Result<(), StepError> {
        let outcome = state.execute_current().await??;

        Ok(assertion::assert_error_message(&outcome, message)?)
    }

    /// Checks the code first, the message only when the code matches.
    pub async fn response_has_code_and_error_message(
        &self,
        state: &ScenarioState,
        code: &str,
        message: &str,
    ) -> Result<(), StepError> {
        self.response_has_code(state, code).await?;
        self.response_has_error_message(state, message).await
    }

    async fn compare_response(
        &self,
        state: &mut ScenarioState,
        mode: Comparison,
        expected: &str,
    ) -> Result<(), StepError> {
        let actual = state
            .execute_current()
            .await??
            .map_err(StepError::TransportFailure)?;

        if let Ok(document) = assertion::response_document(&actual) {
            state.set_var(RESPONSE_VAR, document);
        }

        debug!(?mode, "comparing gRPC response");

        Ok(assertion::compare(mode, expected, &actual)?)
    }
}

async fn read_file(path: impl AsRef<Path>) -> Result<String, StepError> {
    let path = path.as_ref();

    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StepError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps() -> GrpcSteps {
        let registry = Registry::builder()
            .service_prefix("/grpctest.")
            .register_file_descriptor_set(item_service::FILE_DESCRIPTOR_SET, [])
            .unwrap()
            .build()
            .unwrap();

        GrpcSteps::new(registry)
    }

    #[test]
    fn unknown_methods_fail_the_request_step() {
        let mut state = ScenarioState::new();

        let err = steps()
            .request(&mut state, "ItemService/Missing", "{}")
            .unwrap_err();

        assert!(matches!(err, StepError::UnknownMethod(name) if name == "ItemService/Missing"));
        assert!(state.current_request().is_err());
    }

    #[test]
    fn malformed_payloads_fail_the_request_step() {
        let mut state = ScenarioState::new();

        let err = steps()
            .request(&mut state, "ItemService/GetItem", "{")
            .unwrap_err();

        assert!(matches!(err, StepError::MalformedPayload(_)));
    }

    #[test]
    fn variables_are_substituted_before_decoding() {
        let mut state = ScenarioState::new();
        state.set_var("$itemId", serde_json::json!(42));

        steps()
            .request(&mut state, "ItemService/GetItem", r#"{"id": $itemId}"#)
            .unwrap();

        assert!(state.current_request().is_ok());
    }

    #[test]
    fn configuration_steps_need_a_request() {
        let state = ScenarioState::new();

        let err = steps().request_timeout(&state, "2s").unwrap_err();
        assert!(matches!(err, StepError::NoRequestPlanned(_)));
    }

    #[test]
    fn invalid_timeouts_are_reported() {
        let mut state = ScenarioState::new();
        let steps = steps();
        steps
            .request(&mut state, "ItemService/GetItem", r#"{"id": 1}"#)
            .unwrap();

        let err = steps.request_timeout(&state, "soon").unwrap_err();
        assert!(matches!(err, StepError::InvalidTimeout(_)));
    }

    #[tokio::test]
    async fn missing_files_are_reported() {
        let mut state = ScenarioState::new();

        let err = steps()
            .request_from_file(&mut state, "ItemService/GetItem", "does/not/exist.json")
            .await
            .unwrap_err();

        assert!(matches!(err, StepError::Io { .. }));
    }
}
