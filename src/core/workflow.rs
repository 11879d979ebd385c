use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::graph::ConnectionGraphQuery;
use crate::core::window::SwipeWindowCounter;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    ConnectionRequest, NewConnectionRequest, RequestId, RequestStatus, RequestType,
    SocialCircleId, StatusUpdate, SwipeEvent, UserId,
};
use crate::services::{ConnectionStore, NotificationDispatcher, NotificationEvent, StoreError};

/// Orchestrates the connection request lifecycle
///
/// `pending -> accepted | rejected | disconnected`, `accepted -> disconnected`.
/// Sending consumes one swipe from the sender's quota in the same atomic
/// write as the request insert.
pub struct ConnectionRequestWorkflow {
    connections: Arc<dyn ConnectionStore>,
    graph: Arc<ConnectionGraphQuery>,
    swipes: Arc<SwipeWindowCounter>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl ConnectionRequestWorkflow {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        graph: Arc<ConnectionGraphQuery>,
        swipes: Arc<SwipeWindowCounter>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connections,
            graph,
            swipes,
            notifier,
            clock,
        }
    }

    pub async fn send_request(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        social_circle_id: Option<SocialCircleId>,
        request_type: RequestType,
        message: Option<String>,
    ) -> EngineResult<RequestId> {
        if sender_id == receiver_id {
            return Err(EngineError::SelfRequest);
        }

        if let Some(existing) = self.graph.pending_request_between(sender_id, receiver_id).await? {
            return Err(duplicate(&existing));
        }

        let allowance = self.swipes.ensure_can_swipe(sender_id).await?;

        let now = self.clock.now();
        let request = NewConnectionRequest {
            sender_id,
            receiver_id,
            social_circle_id,
            request_type,
            message,
            created_at: now,
        };
        let swipe = SwipeEvent {
            user_id: sender_id,
            direction: request_type.swipe_direction(),
            created_at: now,
        };

        let inserted = self
            .connections
            .insert_request_with_swipe(&request, &swipe, allowance)
            .await;
        let created = match inserted {
            Ok(created) => created,
            Err(StoreError::QuotaExhausted { used, limit }) => {
                // Another send from this user consumed the last swipe first
                return Err(self.swipes.quota_exceeded(sender_id, used, limit).await);
            }
            Err(StoreError::Conflict(reason)) => {
                // Lost a race with a concurrent send for the same pair
                tracing::info!("Concurrent request between {} and {}: {}", sender_id, receiver_id, reason);
                return match self.graph.pending_request_between(sender_id, receiver_id).await? {
                    Some(existing) => Err(duplicate(&existing)),
                    None => Err(StoreError::Conflict(reason).into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "Connection request {} sent: {} -> {} ({})",
            created.id,
            sender_id,
            receiver_id,
            request_type.as_str()
        );

        self.notify(NotificationEvent::ConnectionRequested, receiver_id, sender_id)
            .await;

        Ok(created.id)
    }

    /// Only the receiver can accept, and only while pending
    pub async fn accept(&self, request_id: RequestId, acting_user_id: UserId) -> EngineResult<bool> {
        let Some(request) = self.request_for_receiver(request_id, acting_user_id).await? else {
            return Ok(false);
        };

        let changed = self
            .transition(&request, StatusUpdate::all(RequestStatus::Accepted))
            .await?;

        if changed {
            tracing::info!("Connection request {} accepted by {}", request.id, acting_user_id);
            self.notify(NotificationEvent::ConnectionAccepted, request.sender_id, acting_user_id)
                .await;
        }

        Ok(changed)
    }

    /// Only the receiver can reject. The sender's sub-status is left untouched.
    pub async fn reject(&self, request_id: RequestId, acting_user_id: UserId) -> EngineResult<bool> {
        let Some(request) = self.request_for_receiver(request_id, acting_user_id).await? else {
            return Ok(false);
        };

        let update = StatusUpdate {
            status: RequestStatus::Rejected,
            sender_status: None,
            receiver_status: Some(RequestStatus::Rejected),
        };
        let changed = self.transition(&request, update).await?;

        if changed {
            tracing::info!("Connection request {} rejected by {}", request.id, acting_user_id);
        }

        Ok(changed)
    }

    /// End an accepted connection between the pair
    pub async fn disconnect(&self, user_a: UserId, user_b: UserId) -> EngineResult<bool> {
        let accepted = self
            .connections
            .find_between(user_a, user_b, Some(RequestStatus::Accepted))
            .await?;

        let Some(request) = accepted else {
            tracing::debug!("No accepted connection between {} and {}", user_a, user_b);
            return Ok(false);
        };

        let changed = self
            .transition(&request, StatusUpdate::all(RequestStatus::Disconnected))
            .await?;

        if changed {
            tracing::info!("Users {} and {} disconnected (request {})", user_a, user_b, request.id);
        }

        Ok(changed)
    }

    /// Compare-and-set from the request's current status, if the move is allowed
    async fn transition(&self, request: &ConnectionRequest, update: StatusUpdate) -> EngineResult<bool> {
        if !request.status.can_transition_to(update.status) {
            tracing::debug!(
                "Request {} cannot move from {} to {}",
                request.id,
                request.status,
                update.status
            );
            return Ok(false);
        }

        Ok(self
            .connections
            .update_status(request.id, request.status, update, self.clock.now())
            .await?)
    }

    async fn request_for_receiver(
        &self,
        request_id: RequestId,
        acting_user_id: UserId,
    ) -> EngineResult<Option<ConnectionRequest>> {
        let Some(request) = self.connections.get_request(request_id).await? else {
            tracing::debug!("Connection request {} not found", request_id);
            return Ok(None);
        };

        if request.receiver_id != acting_user_id {
            tracing::debug!(
                "User {} is not the receiver of request {}",
                acting_user_id,
                request_id
            );
            return Ok(None);
        }

        Ok(Some(request))
    }

    /// Best-effort; never fails the workflow
    async fn notify(&self, event: NotificationEvent, recipient_id: UserId, actor_id: UserId) {
        if let Err(e) = self.notifier.notify(event, recipient_id, actor_id).await {
            tracing::warn!(
                "Failed to send {:?} notification to {}: {}",
                event,
                recipient_id,
                e
            );
        }
    }
}

fn duplicate(existing: &ConnectionRequest) -> EngineError {
    EngineError::DuplicateRequest {
        request_id: existing.id,
        status: existing.status,
    }
}
