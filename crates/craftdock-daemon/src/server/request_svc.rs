//! `RequestService` gRPC implementation.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::info;

use craftdock_proto::v1::request_service_server::RequestService;
use craftdock_proto::v1::{
    ApproveRequestRequest, DecommissionRequestRequest, DecommissionRequestResponse,
    DenyRequestRequest, DenyRequestResponse, ListPendingRequestsRequest,
    ListPendingRequestsResponse, RequestDetail, SubmitRequestRequest,
};

use crate::lifecycle::{LifecycleError, Orchestrator, RequestDraft};
use crate::storage::ServerRequest;

/// `RequestService` implementation backed by the lifecycle orchestrator.
pub struct RequestServiceImpl {
    orchestrator: Arc<Orchestrator>,
}

impl RequestServiceImpl {
    /// Create a new `RequestService`.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Convert a stored row into a proto `RequestDetail`.
fn to_detail(row: ServerRequest) -> RequestDetail {
    RequestDetail {
        id: row.id,
        whitelist_enabled: row.whitelist(),
        email: row.email,
        servername: row.servername,
        seed: row.seed,
        gamemode: row.gamemode,
        difficulty: row.difficulty,
        owner_name: row.owner_name,
        ip: row.ip.unwrap_or_default(),
        identity_ref: row.identity_ref.unwrap_or_default(),
        status: row.status,
        last_error: row.last_error.unwrap_or_default(),
        created_at: Some(prost_types::Timestamp {
            seconds: row.created_at,
            nanos: 0,
        }),
    }
}

/// Map a lifecycle error onto the matching gRPC status.
fn to_status(e: &LifecycleError) -> Status {
    let message = e.to_string();
    match e {
        LifecycleError::Validation(_) => Status::invalid_argument(message),
        LifecycleError::NameConflict(_) => Status::already_exists(message),
        LifecycleError::NotFound(_) => Status::not_found(message),
        LifecycleError::InvalidState { .. } => Status::failed_precondition(message),
        LifecycleError::Allocation(_) | LifecycleError::Database(_) => Status::internal(message),
    }
}

#[tonic::async_trait]
impl RequestService for RequestServiceImpl {
    async fn submit_request(
        &self,
        request: Request<SubmitRequestRequest>,
    ) -> Result<Response<RequestDetail>, Status> {
        let req = request.into_inner();

        let draft = RequestDraft {
            email: req.email,
            servername: req.servername,
            seed: req.seed,
            gamemode: req.gamemode,
            difficulty: req.difficulty,
            whitelist_enabled: req.whitelist_enabled,
            owner_name: req.owner_name,
        };

        let row = self
            .orchestrator
            .submit(draft)
            .await
            .map_err(|e| to_status(&e))?;

        info!(id = row.id, servername = %row.servername, "Request submitted via gRPC");

        Ok(Response::new(to_detail(row)))
    }

    async fn approve_request(
        &self,
        request: Request<ApproveRequestRequest>,
    ) -> Result<Response<RequestDetail>, Status> {
        let req = request.into_inner();

        let row = self
            .orchestrator
            .approve(req.id)
            .await
            .map_err(|e| to_status(&e))?;

        info!(id = req.id, "Request approved via gRPC");

        Ok(Response::new(to_detail(row)))
    }

    async fn deny_request(
        &self,
        request: Request<DenyRequestRequest>,
    ) -> Result<Response<DenyRequestResponse>, Status> {
        let req = request.into_inner();

        self.orchestrator
            .deny(req.id)
            .await
            .map_err(|e| to_status(&e))?;

        info!(id = req.id, "Request denied via gRPC");

        Ok(Response::new(DenyRequestResponse { deleted: true }))
    }

    async fn decommission_request(
        &self,
        request: Request<DecommissionRequestRequest>,
    ) -> Result<Response<DecommissionRequestResponse>, Status> {
        let req = request.into_inner();

        self.orchestrator
            .decommission(req.id)
            .await
            .map_err(|e| to_status(&e))?;

        info!(id = req.id, "Request decommissioned via gRPC");

        Ok(Response::new(DecommissionRequestResponse { deleted: true }))
    }

    async fn list_pending_requests(
        &self,
        _request: Request<ListPendingRequestsRequest>,
    ) -> Result<Response<ListPendingRequestsResponse>, Status> {
        let rows = self
            .orchestrator
            .list_pending()
            .await
            .map_err(|e| to_status(&e))?;

        Ok(Response::new(ListPendingRequestsResponse {
            requests: rows.into_iter().map(to_detail).collect(),
        }))
    }
}
