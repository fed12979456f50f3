use crate::chord::node::ChordNode;
use crate::chord::types::{NodeRef, NodeStatus};
use crate::network::messages::chord::{
    chord_node_server::ChordNode as ChordNodeService, FindSuccessorRequest, FindSuccessorResponse,
    GetPredecessorRequest, GetPredecessorResponse, GetSuccessorListRequest,
    GetSuccessorListResponse, NodeInfo, NotifyRequest, NotifyResponse, PingRequest, PingResponse,
    SetPredecessorRequest, SetPredecessorResponse, SetSuccessorRequest, SetSuccessorResponse,
};
use chrono::Utc;
use log::debug;
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Inbound side of the remote call surface: every request is served by the
/// local node's handlers.
#[derive(Debug, Clone)]
pub struct ChordGrpcServer {
    node: Arc<ChordNode>,
}

impl ChordGrpcServer {
    pub fn new(node: Arc<ChordNode>) -> Self {
        Self { node }
    }
}

fn required_node(info: Option<NodeInfo>, field: &str) -> Result<NodeRef, Status> {
    info.map(NodeRef::from)
        .ok_or_else(|| Status::invalid_argument(format!("Missing {}", field)))
}

#[tonic::async_trait]
impl ChordNodeService for ChordGrpcServer {
    async fn find_successor(
        &self,
        request: Request<FindSuccessorRequest>,
    ) -> Result<Response<FindSuccessorResponse>, Status> {
        let req = request.into_inner();
        let id = self.node.space().id(req.id);

        match self.node.find_successor(id).await {
            Ok(successor) => Ok(Response::new(FindSuccessorResponse {
                successor: Some(successor.into()),
                success: true,
                error: String::new(),
            })),
            Err(e) => {
                debug!("FindSuccessor({}) failed: {}", id, e);
                Ok(Response::new(FindSuccessorResponse {
                    successor: None,
                    success: false,
                    error: e.to_string(),
                }))
            }
        }
    }

    async fn get_predecessor(
        &self,
        _request: Request<GetPredecessorRequest>,
    ) -> Result<Response<GetPredecessorResponse>, Status> {
        let predecessor = self.node.predecessor().await;
        Ok(Response::new(GetPredecessorResponse {
            predecessor: predecessor.map(NodeInfo::from),
        }))
    }

    async fn get_successor_list(
        &self,
        _request: Request<GetSuccessorListRequest>,
    ) -> Result<Response<GetSuccessorListResponse>, Status> {
        let successors = self.node.successor_list().await;
        Ok(Response::new(GetSuccessorListResponse {
            successors: successors.into_iter().map(NodeInfo::from).collect(),
        }))
    }

    async fn notify(
        &self,
        request: Request<NotifyRequest>,
    ) -> Result<Response<NotifyResponse>, Status> {
        let candidate = required_node(request.into_inner().candidate, "candidate")?;
        let accepted = self.node.notify(candidate).await;
        Ok(Response::new(NotifyResponse { accepted }))
    }

    async fn ping(&self, _request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        let alive = self.node.status().await != NodeStatus::Leaving;
        Ok(Response::new(PingResponse {
            alive,
            timestamp: Utc::now().to_rfc3339(),
        }))
    }

    async fn set_successor(
        &self,
        request: Request<SetSuccessorRequest>,
    ) -> Result<Response<SetSuccessorResponse>, Status> {
        let successor = required_node(request.into_inner().successor, "successor")?;
        self.node.set_successor(successor).await;
        Ok(Response::new(SetSuccessorResponse {}))
    }

    async fn set_predecessor(
        &self,
        request: Request<SetPredecessorRequest>,
    ) -> Result<Response<SetPredecessorResponse>, Status> {
        let predecessor = request.into_inner().predecessor.map(NodeRef::from);
        self.node.set_predecessor(predecessor).await;
        Ok(Response::new(SetPredecessorResponse {}))
    }
}

