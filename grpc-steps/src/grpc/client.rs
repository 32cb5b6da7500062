//! # Generic gRPC Client
//!
//! This module wraps a standard `tonic` client to provide a generic interface for
//! gRPC communication. It is agnostic to the specific Protobuf messages being exchanged.
//!
//! ## How it works
//!
//! The [`GrpcClient`] utilizes the [`super::codec::DynamicCodec`] to handle serialization.
//! It does not need to know the structure of the data it is sending; it simply ensures
//! the connection is ready and passes the `DynamicMessage`s and the response schema
//! to the codec.
//!
//! ## Features
//!
//! * **Dynamic Pathing**: Takes the HTTP/2 path (e.g., `/package.Service/Method`) computed at runtime.
//! * **Deadlines**: Every request carries a `grpc-timeout` so the server sees the same deadline.
//! * **Access Patterns**: Provides specific methods for Unary, Server Streaming, Client Streaming,
//!   and Bidirectional Streaming calls.
use super::codec::DynamicCodec;
use crate::BoxError;
use futures_util::Stream;
use http::uri::PathAndQuery;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use std::time::Duration;
use tonic::{client::GrpcService, metadata::MetadataMap, transport::Channel};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
}

/// Everything a call needs besides its payload.
#[derive(Debug, Clone)]
pub struct CallSpec {
    /// HTTP/2 path of the method, e.g. `/grpctest.ItemService/GetItem`.
    pub path: PathAndQuery,
    /// Schema used to decode the response messages.
    pub output: MessageDescriptor,
    pub metadata: MetadataMap,
    pub timeout: Duration,
}

/// A generic client performing calls with dynamic messages.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(DynamicMessage))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - The underlying service was not ready to send.
    pub async fn unary(
        &mut self,
        spec: CallSpec,
        payload: DynamicMessage,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        self.ready().await?;

        let codec = DynamicCodec::new(spec.output);
        let request = build_request(payload, spec.metadata, spec.timeout);

        match self.client.unary(request, spec.path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Server Streaming gRPC call (Single Request -> Stream of Responses).
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(Stream))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - The underlying service was not ready to send.
    pub async fn server_streaming(
        &mut self,
        spec: CallSpec,
        payload: DynamicMessage,
    ) -> Result<
        Result<impl Stream<Item = Result<DynamicMessage, tonic::Status>>, tonic::Status>,
        GrpcRequestError,
    > {
        self.ready().await?;

        let codec = DynamicCodec::new(spec.output);
        let request = build_request(payload, spec.metadata, spec.timeout);

        match self.client.server_streaming(request, spec.path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Client Streaming gRPC call (Stream of Requests -> Single Response).
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(DynamicMessage))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - The underlying service was not ready to send.
    pub async fn client_streaming(
        &mut self,
        spec: CallSpec,
        payload_stream: impl Stream<Item = DynamicMessage> + Send + 'static,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        self.ready().await?;

        let codec = DynamicCodec::new(spec.output);
        let request = build_request(payload_stream, spec.metadata, spec.timeout);

        match self.client.client_streaming(request, spec.path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Bidirectional Streaming gRPC call (Stream of Requests -> Stream of Responses).
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(Stream))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - The underlying service was not ready to send.
    pub async fn bidirectional_streaming(
        &mut self,
        spec: CallSpec,
        payload_stream: impl Stream<Item = DynamicMessage> + Send + 'static,
    ) -> Result<
        Result<impl Stream<Item = Result<DynamicMessage, tonic::Status>>, tonic::Status>,
        GrpcRequestError,
    > {
        self.ready().await?;

        let codec = DynamicCodec::new(spec.output);
        let request = build_request(payload_stream, spec.metadata, spec.timeout);

        match self.client.streaming(request, spec.path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    async fn ready(&mut self) -> Result<(), GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))
    }
}

fn build_request<T>(payload: T, metadata: MetadataMap, timeout: Duration) -> tonic::Request<T> {
    let mut request = tonic::Request::new(payload);
    *request.metadata_mut() = metadata;
    request.set_timeout(timeout);
    request
}
