//! # Method Registry
//!
//! Maps the method names written in scenarios (e.g. `/grpctest.ItemService/GetItem`) to
//! everything needed to call them: the Protobuf schema of the method, its streaming shape
//! and the connection settings of its service.
//!
//! The registry is assembled once with a [`RegistryBuilder`] and is read-only afterwards,
//! so it can be shared by every scenario of a run behind an `Arc`.
//!
//! ## Option precedence
//!
//! For every registered service the settings start from [`ServiceSettings::default`] and then
//! apply, in order:
//!
//! 1. the default options ([`RegistryBuilder::default_service_options`]),
//! 2. the options passed along with the registration,
//! 3. the per-service overrides ([`RegistryBuilder::service_options`], or a [`RegistryConfig`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use grpc_steps::registry::{Registry, ServiceOption};
//!
//! # fn run(descriptor_set: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::builder()
//!     .service_prefix("/grpctest.")
//!     .default_service_options([ServiceOption::address("localhost:50051")])
//!     .register_file_descriptor_set(descriptor_set, [])?
//!     .build()?;
//!
//! let method = registry.resolve("ItemService/GetItem")?;
//! assert_eq!(method.full_name(), "/grpctest.ItemService/GetItem");
//! # Ok(())
//! # }
//! ```
pub mod options;

pub use options::{DEFAULT_ADDRESS, ServiceOption, ServiceSettings};

use crate::{
    config::RegistryConfig,
    grpc::{
        dial::DialOption,
        metadata::{HeaderError, to_metadata},
    },
};
use http::uri::{InvalidUri, PathAndQuery};
use prost_reflect::{
    DescriptorError, DescriptorPool, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};
use tonic::{metadata::MetadataMap, server::NamedService};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown gRPC method '{0}'")]
    UnknownMethod(String),
    #[error("Service '{0}' not found in the descriptor pool")]
    ServiceNotFound(String),
    #[error("Failed to decode file descriptor set: '{0}'")]
    Descriptor(#[from] DescriptorError),
    #[error("Method '{name}' does not map to a valid HTTP/2 path: '{source}'")]
    InvalidPath { name: String, source: InvalidUri },
    #[error("Invalid default header for service '{service}': {source}")]
    InvalidHeader { service: String, source: HeaderError },
}

/// Which side(s) of a call send more than one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamingShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl StreamingShape {
    pub fn of(method: &MethodDescriptor) -> Self {
        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => StreamingShape::Unary,
            (true, false) => StreamingShape::ClientStreaming,
            (false, true) => StreamingShape::ServerStreaming,
            (true, true) => StreamingShape::Bidirectional,
        }
    }

    /// The client sends an ordered sequence of messages.
    pub fn is_client_streaming(self) -> bool {
        matches!(
            self,
            StreamingShape::ClientStreaming | StreamingShape::Bidirectional
        )
    }

    /// The server replies with an ordered sequence of messages.
    pub fn is_server_streaming(self) -> bool {
        matches!(
            self,
            StreamingShape::ServerStreaming | StreamingShape::Bidirectional
        )
    }
}

impl fmt::Display for StreamingShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamingShape::Unary => "unary",
            StreamingShape::ClientStreaming => "client streaming",
            StreamingShape::ServerStreaming => "server streaming",
            StreamingShape::Bidirectional => "bidirectional streaming",
        };
        f.write_str(name)
    }
}

/// A resolved, callable method. Immutable once the registry is built.
#[derive(Debug, Clone)]
pub struct ServiceMethod {
    service_name: String,
    method_name: String,
    shape: StreamingShape,
    descriptor: MethodDescriptor,
    path: PathAndQuery,
    settings: ServiceSettings,
    default_metadata: MetadataMap,
}

impl ServiceMethod {
    /// The service identifier the method was registered under.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// `/service/method`, before any prefix stripping.
    pub fn full_name(&self) -> &str {
        self.path.path()
    }

    pub fn shape(&self) -> StreamingShape {
        self.shape
    }

    /// Schema of the request message(s).
    pub fn input(&self) -> MessageDescriptor {
        self.descriptor.input()
    }

    /// Schema of the response message(s).
    pub fn output(&self) -> MessageDescriptor {
        self.descriptor.output()
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn path(&self) -> &PathAndQuery {
        &self.path
    }

    pub fn address(&self) -> &str {
        &self.settings.address
    }

    pub fn dial_options(&self) -> &[DialOption] {
        &self.settings.dial_options
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.settings.headers
    }

    /// The service headers, already validated as gRPC metadata.
    pub fn default_metadata(&self) -> &MetadataMap {
        &self.default_metadata
    }
}

struct Registration {
    id: String,
    service: ServiceDescriptor,
    options: Vec<ServiceOption>,
}

/// Collects services and options, then derives every method entry in [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    prefix: Option<String>,
    defaults: Vec<ServiceOption>,
    overrides: HashMap<String, Vec<ServiceOption>>,
    registrations: Vec<Registration>,
}

impl RegistryBuilder {
    /// Strips `prefix` from the full method names used as lookup keys.
    pub fn service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Adds options applied to every service before its own options.
    pub fn default_service_options(
        mut self,
        options: impl IntoIterator<Item = ServiceOption>,
    ) -> Self {
        self.defaults.extend(options);
        self
    }

    /// Adds options applied last to the service registered as `service`.
    pub fn service_options(
        mut self,
        service: impl Into<String>,
        options: impl IntoIterator<Item = ServiceOption>,
    ) -> Self {
        self.overrides
            .entry(service.into())
            .or_default()
            .extend(options);
        self
    }

    /// Applies a declarative configuration on top of what was set so far.
    pub fn with_config(mut self, config: &RegistryConfig) -> Self {
        if let Some(prefix) = &config.service_prefix {
            self.prefix = Some(prefix.clone());
        }

        self = self.default_service_options(config.defaults.to_options());

        for (service, service_config) in &config.services {
            self = self.service_options(service.clone(), service_config.to_options());
        }

        self
    }

    /// Registers every method of `service` under its fully-qualified name.
    pub fn register_service(
        self,
        service: ServiceDescriptor,
        options: impl IntoIterator<Item = ServiceOption>,
    ) -> Self {
        let id = service.full_name().to_string();
        self.register_service_as(id, service, options)
    }

    /// Registers every method of `service` under an explicit service identifier.
    ///
    /// The identifier is also the service part of the HTTP/2 path of the calls.
    pub fn register_service_as(
        mut self,
        id: impl Into<String>,
        service: ServiceDescriptor,
        options: impl IntoIterator<Item = ServiceOption>,
    ) -> Self {
        self.registrations.push(Registration {
            id: id.into(),
            service,
            options: options.into_iter().collect(),
        });
        self
    }

    /// Registers the service served by the generated `tonic` server type `S`.
    pub fn register_named_service<S: NamedService>(
        self,
        pool: &DescriptorPool,
        options: impl IntoIterator<Item = ServiceOption>,
    ) -> Result<Self, RegistryError> {
        let service = pool
            .get_service_by_name(S::NAME)
            .ok_or_else(|| RegistryError::ServiceNotFound(S::NAME.to_string()))?;

        Ok(self.register_service(service, options))
    }

    /// Registers every service of an encoded `FileDescriptorSet`.
    pub fn register_file_descriptor_set(
        mut self,
        file_descriptor_set: &[u8],
        options: impl IntoIterator<Item = ServiceOption>,
    ) -> Result<Self, RegistryError> {
        let pool = DescriptorPool::decode(file_descriptor_set)?;
        let options: Vec<_> = options.into_iter().collect();

        for service in pool.services() {
            self = self.register_service(service, options.clone());
        }

        Ok(self)
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut methods = HashMap::new();

        for registration in &self.registrations {
            let mut settings = ServiceSettings::default();

            let overrides = self
                .overrides
                .get(&registration.id)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for option in self
                .defaults
                .iter()
                .chain(&registration.options)
                .chain(overrides)
            {
                option.apply(&mut settings);
            }

            let default_metadata =
                to_metadata(&settings.headers).map_err(|source| RegistryError::InvalidHeader {
                    service: registration.id.clone(),
                    source,
                })?;

            for descriptor in registration.service.methods() {
                let full_name = format!("/{}/{}", registration.id, descriptor.name());
                let path = PathAndQuery::from_str(&full_name).map_err(|source| {
                    RegistryError::InvalidPath {
                        name: full_name.clone(),
                        source,
                    }
                })?;

                let key = self.lookup_key(&full_name);

                debug!(
                    method = %full_name,
                    %key,
                    address = %settings.address,
                    "registered gRPC method"
                );

                let method = ServiceMethod {
                    service_name: registration.id.clone(),
                    method_name: descriptor.name().to_string(),
                    shape: StreamingShape::of(&descriptor),
                    descriptor,
                    path,
                    settings: settings.clone(),
                    default_metadata: default_metadata.clone(),
                };

                methods.insert(key, Arc::new(method));
            }
        }

        Ok(Registry { methods })
    }

    fn lookup_key(&self, full_name: &str) -> String {
        match &self.prefix {
            Some(prefix)
                if !prefix.is_empty()
                    && full_name.len() > prefix.len()
                    && full_name.starts_with(prefix.as_str()) =>
            {
                full_name[prefix.len()..].to_string()
            }
            _ => full_name.to_string(),
        }
    }
}

/// Read-only lookup table from scenario method names to [`ServiceMethod`]s.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    methods: HashMap<String, Arc<ServiceMethod>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up a method by the name used in scenarios.
    pub fn resolve(&self, name: &str) -> Result<Arc<ServiceMethod>, RegistryError> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMethod(name.to_string()))
    }

    /// Every registered method with its lookup key, sorted by key.
    pub fn methods(&self) -> Vec<(&str, &ServiceMethod)> {
        let mut methods: Vec<_> = self
            .methods
            .iter()
            .map(|(key, method)| (key.as_str(), method.as_ref()))
            .collect();
        methods.sort_unstable_by_key(|(key, _)| *key);
        methods
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use item_service::{FILE_DESCRIPTOR_SET, ItemService, ItemServiceServer, pb};

    const SERVICE: &str = "grpctest.ItemService";

    fn pool() -> DescriptorPool {
        DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap()
    }

    fn item_service() -> ServiceDescriptor {
        pool().get_service_by_name(SERVICE).unwrap()
    }

    #[test]
    fn registers_every_method_with_its_shape() {
        let registry = Registry::builder()
            .register_service(item_service(), [])
            .build()
            .unwrap();

        let shapes: Vec<_> = registry
            .methods()
            .into_iter()
            .map(|(key, method)| (key, method.shape()))
            .collect();

        assert_eq!(
            shapes,
            vec![
                ("/grpctest.ItemService/CreateItems", StreamingShape::ClientStreaming),
                ("/grpctest.ItemService/GetItem", StreamingShape::Unary),
                ("/grpctest.ItemService/ListItems", StreamingShape::ServerStreaming),
                ("/grpctest.ItemService/TransformItems", StreamingShape::Bidirectional),
            ]
        );
    }

    #[test]
    fn prefix_is_stripped_from_lookup_keys() {
        let registry = Registry::builder()
            .service_prefix("/grpctest.")
            .register_service(item_service(), [])
            .build()
            .unwrap();

        let method = registry.resolve("ItemService/GetItem").unwrap();
        assert_eq!(method.full_name(), "/grpctest.ItemService/GetItem");
        assert_eq!(method.input().full_name(), "grpctest.GetItemRequest");
        assert_eq!(method.output().full_name(), "grpctest.Item");

        let err = registry.resolve("/grpctest.ItemService/GetItem").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMethod(name) if name == "/grpctest.ItemService/GetItem"));
    }

    #[test]
    fn prefix_equal_to_the_full_name_is_not_stripped() {
        let builder = Registry::builder().service_prefix("/grpctest.ItemService/GetItem");
        assert_eq!(
            builder.lookup_key("/grpctest.ItemService/GetItem"),
            "/grpctest.ItemService/GetItem"
        );

        let builder = Registry::builder().service_prefix("/other.");
        assert_eq!(
            builder.lookup_key("/grpctest.ItemService/GetItem"),
            "/grpctest.ItemService/GetItem"
        );
    }

    #[test]
    fn unknown_method_is_reported() {
        let registry = Registry::builder().build().unwrap();
        assert!(registry.is_empty());

        let err = registry.resolve("/grpctest.ItemService/Missing").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMethod(_)));
    }

    #[test]
    fn options_apply_defaults_then_inline_then_overrides() {
        let registry = Registry::builder()
            .default_service_options([
                ServiceOption::address("localhost:1"),
                ServiceOption::header("x-default", "1"),
            ])
            .register_service(item_service(), [ServiceOption::address("localhost:2")])
            .service_options(SERVICE, [ServiceOption::header("x-override", "3")])
            .build()
            .unwrap();

        let method = registry.resolve("/grpctest.ItemService/GetItem").unwrap();
        assert_eq!(method.address(), "localhost:2");
        assert_eq!(method.headers().len(), 2);
        assert_eq!(method.default_metadata().get("x-default").unwrap(), "1");
        assert_eq!(method.default_metadata().get("x-override").unwrap(), "3");
    }

    #[test]
    fn default_address_is_used_without_options() {
        let registry = Registry::builder()
            .register_service(item_service(), [])
            .build()
            .unwrap();

        let method = registry.resolve("/grpctest.ItemService/ListItems").unwrap();
        assert_eq!(method.address(), DEFAULT_ADDRESS);
    }

    #[test]
    fn explicit_id_changes_the_path() {
        let registry = Registry::builder()
            .register_service_as("items.v2.Catalog", item_service(), [])
            .build()
            .unwrap();

        let method = registry.resolve("/items.v2.Catalog/GetItem").unwrap();
        assert_eq!(method.path().path(), "/items.v2.Catalog/GetItem");
        assert_eq!(method.service_name(), "items.v2.Catalog");
    }

    #[test]
    fn later_registration_overrides_earlier_one() {
        let registry = Registry::builder()
            .register_service(item_service(), [ServiceOption::address("localhost:1")])
            .register_service(item_service(), [ServiceOption::address("localhost:2")])
            .build()
            .unwrap();

        assert_eq!(registry.len(), 4);
        let method = registry.resolve("/grpctest.ItemService/GetItem").unwrap();
        assert_eq!(method.address(), "localhost:2");
    }

    #[test]
    fn registers_named_services_and_descriptor_sets() {
        let registry = Registry::builder()
            .register_named_service::<ItemServiceServer<Unimplemented>>(&pool(), [])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(registry.len(), 4);

        let registry = Registry::builder()
            .register_file_descriptor_set(FILE_DESCRIPTOR_SET, [])
            .unwrap()
            .build()
            .unwrap();
        assert!(registry.resolve("/grpctest.ItemService/TransformItems").is_ok());
    }

    #[test]
    fn invalid_default_header_fails_the_build() {
        let err = Registry::builder()
            .register_service(item_service(), [ServiceOption::header("bad key", "v")])
            .build()
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidHeader { service, .. } if service == SERVICE));
    }

    struct Unimplemented;

    #[tonic::async_trait]
    impl ItemService for Unimplemented {
        type ListItemsStream = tokio_stream::Empty<Result<pb::Item, tonic::Status>>;
        type TransformItemsStream =
            tokio_stream::Empty<Result<pb::Item, tonic::Status>>;

        async fn get_item(
            &self,
            _: tonic::Request<pb::GetItemRequest>,
        ) -> Result<tonic::Response<pb::Item>, tonic::Status> {
            Err(tonic::Status::unimplemented("get_item"))
        }

        async fn list_items(
            &self,
            _: tonic::Request<pb::ListItemsRequest>,
        ) -> Result<tonic::Response<Self::ListItemsStream>, tonic::Status> {
            Err(tonic::Status::unimplemented("list_items"))
        }

        async fn create_items(
            &self,
            _: tonic::Request<tonic::Streaming<pb::Item>>,
        ) -> Result<tonic::Response<pb::CreateItemsResponse>, tonic::Status> {
            Err(tonic::Status::unimplemented("create_items"))
        }

        async fn transform_items(
            &self,
            _: tonic::Request<tonic::Streaming<pb::Item>>,
        ) -> Result<tonic::Response<Self::TransformItemsStream>, tonic::Status> {
            Err(tonic::Status::unimplemented("transform_items"))
        }
    }
}
