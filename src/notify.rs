//! Member-role event publishing for role label changes.
//!
//! When a role's labels change, every member holding that role at project
//! scope is told the role's new full label set. The label writes and the
//! publish form one unit: the gateway stages the writes inside the caller's
//! open [`Transaction`], publishes, and only reports success once the
//! publisher has acknowledged. The caller commits on success and rolls back
//! on failure, so either both happen or neither is observable.

#[cfg(feature = "audit")]
use log::{info, warn};

use crate::{
    config::RbacConfig,
    error::{Error, Result},
    metrics::RbacMetrics,
    scope::ResourceLevel,
    storage::{MemberRoleExample, Transaction},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// What one member is told about one of their project-scope assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRoleEventPayload {
    /// The project the assignment lives in.
    pub resource_id: i64,
    pub resource_type: ResourceLevel,
    pub username: String,
    /// Names of every label the role carries after the change.
    pub role_labels: BTreeSet<String>,
}

/// Routing and audit metadata around an event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique identifier for this event instance.
    pub event_id: Uuid,
    pub topic: String,
    pub event_type: String,
    /// Service that produced the event.
    pub source_service: String,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T: Serialize> EventEnvelope<T> {
    /// Wrap a payload in a fresh envelope.
    pub fn new(
        topic: impl Into<String>,
        event_type: impl Into<String>,
        source_service: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            topic: topic.into(),
            event_type: event_type.into(),
            source_service: source_service.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Serialize the envelope to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// The batch published for one label change.
pub type MemberRoleEvent = EventEnvelope<Vec<MemberRoleEventPayload>>;

/// A publisher refused or failed to acknowledge an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to publish to topic {topic}: {cause}")]
pub struct PublishError {
    pub topic: String,
    pub cause: String,
}

/// Delivery of member-role events to dependent systems.
///
/// `publish` must block until the event is acknowledged or rejected.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &MemberRoleEvent) -> std::result::Result<(), PublishError>;
}

impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    fn publish(&self, event: &MemberRoleEvent) -> std::result::Result<(), PublishError> {
        (**self).publish(event)
    }
}

/// Publisher that acknowledges every event without sending it anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: &MemberRoleEvent) -> std::result::Result<(), PublishError> {
        Ok(())
    }
}

/// Publisher that writes each event to the audit log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: &MemberRoleEvent) -> std::result::Result<(), PublishError> {
        let body = serde_json::to_string(event).map_err(|e| PublishError {
            topic: event.topic.clone(),
            cause: e.to_string(),
        })?;

        #[cfg(feature = "audit")]
        info!("Event published on '{}': {}", event.topic, body);
        #[cfg(not(feature = "audit"))]
        let _ = body;

        Ok(())
    }
}

/// Publisher that keeps every acknowledged event in memory.
///
/// Clones share the same buffer. Can be switched into a failing mode to
/// exercise the rollback path.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPublisher {
    published: Arc<Mutex<Vec<MemberRoleEvent>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent publish while `failing` is set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Events acknowledged so far, oldest first.
    pub fn published(&self) -> Vec<MemberRoleEvent> {
        match self.published.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventPublisher for InMemoryPublisher {
    fn publish(&self, event: &MemberRoleEvent) -> std::result::Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError {
                topic: event.topic.clone(),
                cause: "publisher unavailable".to_string(),
            });
        }

        let mut events = self.published.lock().map_err(|_| PublishError {
            topic: event.topic.clone(),
            cause: "publisher buffer poisoned".to_string(),
        })?;
        events.push(event.clone());
        Ok(())
    }
}

/// Couples label writes to the publication of the resulting member events.
#[derive(Debug)]
pub struct NotificationGateway<P> {
    publisher: P,
    topic: String,
    event_type: String,
    service_name: String,
    metrics: Arc<RbacMetrics>,
}

impl<P: EventPublisher> NotificationGateway<P> {
    pub fn new(publisher: P, config: &RbacConfig, metrics: Arc<RbacMetrics>) -> Self {
        Self {
            publisher,
            topic: config.member_role_topic.clone(),
            event_type: config.label_event_type.clone(),
            service_name: config.service_name.clone(),
            metrics,
        }
    }

    /// Get the publisher.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run `work` to stage the mutation and build the batch, then publish it.
    ///
    /// Returns the acknowledged event. Any error from `work` or from the
    /// publisher is returned as-is and the caller must not commit.
    pub fn execute<F>(&self, work: F) -> Result<MemberRoleEvent>
    where
        F: FnOnce() -> Result<Vec<MemberRoleEventPayload>>,
    {
        let batch = work()?;
        let event = EventEnvelope::new(
            self.topic.as_str(),
            self.event_type.as_str(),
            self.service_name.as_str(),
            batch,
        );

        match self.publisher.publish(&event) {
            Ok(()) => {
                RbacMetrics::add(&self.metrics.notifications_published, 1);

                #[cfg(feature = "audit")]
                info!(
                    "Published '{}' event {} with {} payload(s)",
                    event.event_type,
                    event.event_id,
                    event.payload.len()
                );

                Ok(event)
            }
            Err(e) => {
                RbacMetrics::add(&self.metrics.notifications_failed, 1);

                #[cfg(feature = "audit")]
                warn!("Publishing event {} failed: {}", event.event_id, e);

                Err(Error::NotificationFailure(e.to_string()))
            }
        }
    }

    /// Stage a role's label changes with `apply`, then publish one payload
    /// per project-scope assignment of the role carrying its full label set.
    pub fn propagate_label_change<T, F>(
        &self,
        tx: &mut T,
        role_id: i64,
        apply: F,
    ) -> Result<MemberRoleEvent>
    where
        T: Transaction,
        F: FnOnce(&mut T) -> Result<()>,
    {
        self.execute(|| {
            apply(&mut *tx)?;
            member_payloads(&*tx, role_id)
        })
    }
}

/// Build the payloads for every project-scope holder of a role.
///
/// Only project-scope assignments are reported, whatever the role's own level.
pub fn member_payloads<T: Transaction>(
    tx: &T,
    role_id: i64,
) -> Result<Vec<MemberRoleEventPayload>> {
    let role_labels: BTreeSet<String> = tx
        .select_labels_by_role(role_id)?
        .into_iter()
        .map(|label| label.name().to_string())
        .collect();

    let assignments =
        tx.select_member_roles(&MemberRoleExample::role_at_level(role_id, ResourceLevel::Project))?;

    let mut payloads = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        if let Some(member) = tx.select_member(assignment.member_id)? {
            payloads.push(MemberRoleEventPayload {
                resource_id: assignment.source_id,
                resource_type: ResourceLevel::Project,
                username: member.login_name().to_string(),
                role_labels: role_labels.clone(),
            });
        }
    }

    Ok(payloads)
}
