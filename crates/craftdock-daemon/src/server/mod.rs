//! gRPC server for the craftdock daemon.
//!
//! Serves the operator-facing `RequestService` plus the standard gRPC
//! health service.

mod request_svc;

pub use request_svc::RequestServiceImpl;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tonic::transport::Server;
use tracing::info;

use craftdock_proto::v1::request_service_server::RequestServiceServer;

use crate::lifecycle::Orchestrator;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// gRPC server handle.
pub struct GrpcServer {
    orchestrator: Arc<Orchestrator>,
}

impl GrpcServer {
    /// Create a new gRPC server around the orchestrator.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Start serving on a TCP socket.
    pub async fn serve_tcp(self, addr: SocketAddr) -> Result<(), ServerError> {
        let request_service = RequestServiceImpl::new(Arc::clone(&self.orchestrator));

        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<RequestServiceServer<RequestServiceImpl>>()
            .await;

        info!(%addr, "Starting gRPC server on TCP");

        Server::builder()
            .http2_keepalive_interval(Some(Duration::from_secs(30)))
            .http2_keepalive_timeout(Some(Duration::from_secs(10)))
            .add_service(health_service)
            .add_service(RequestServiceServer::new(request_service))
            .serve(addr)
            .await?;

        Ok(())
    }
}
