//! # grpc-steps
//!
//! `grpc-steps` lets behavior-driven scenarios call gRPC services with plain text: a method
//! name, a JSON payload, and assertions on the response or on the returned status. No
//! generated client or wire code is needed, message schemas are resolved at runtime.
//!
//! ## Key Components
//!
//! * **[`Registry`]:** Maps the method names used in scenarios to their schema, streaming shape
//!   and connection settings. Built once per test run.
//! * **[`payload`]:** Converts extended-JSON documents to dynamic Protobuf messages and back.
//! * **[`PendingInvocation`]:** The single call planned by a scenario step. It runs at most once
//!   and memoizes its outcome, whatever the streaming shape of the method.
//! * **[`assertion`]:** Equality and subset comparisons of responses, status code and message checks.
//! * **[`GrpcSteps`]:** The step definitions, reachable by sentence through
//!   [`GrpcSteps::run_step`] so any BDD runner can forward its steps.
//!
//! ## Internal clients
//!
//! The building blocks used to perform the calls are exposed as well:
//!
//! * **[`grpc::client::GrpcClient`]:** A dynamic gRPC client for every streaming shape.
//! * **[`reflection::client::ReflectionClient`]:** A gRPC Server Reflection client, used to register
//!   the services of a running server without local descriptor files.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod assertion;
pub mod config;
pub mod grpc;
pub mod invocation;
pub mod payload;
pub mod reflection;
pub mod registry;
pub mod scenario;
pub mod status;
pub mod steps;

pub use config::RegistryConfig;
pub use invocation::PendingInvocation;
pub use registry::{Registry, RegistryBuilder, ServiceOption};
pub use scenario::ScenarioState;
pub use steps::{GrpcSteps, StepError};

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
