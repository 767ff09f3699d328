//! Counters for reconciliation and assignment activity.

use crate::error::{Error, ErrorKind};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector shared by the engine and the orchestrator.
#[derive(Debug, Default)]
pub struct RbacMetrics {
    /// Roles created.
    pub roles_created: AtomicU64,
    /// Roles deleted.
    pub roles_deleted: AtomicU64,
    /// Role-permission rows inserted.
    pub permission_links_inserted: AtomicU64,
    /// Role-permission rows deleted.
    pub permission_links_deleted: AtomicU64,
    /// Role-label rows inserted.
    pub label_links_inserted: AtomicU64,
    /// Role-label rows deleted.
    pub label_links_deleted: AtomicU64,
    /// Member-role rows inserted.
    pub member_roles_assigned: AtomicU64,
    /// Member-role rows deleted.
    pub member_roles_removed: AtomicU64,
    /// Event batches acknowledged by the publisher.
    pub notifications_published: AtomicU64,
    /// Event batches rejected by the publisher.
    pub notifications_failed: AtomicU64,
    /// Error counts by kind.
    pub error_counts: DashMap<ErrorKind, AtomicU64>,
}

impl RbacMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record a failed operation.
    pub fn record_error(&self, error: &Error) {
        self.error_counts
            .entry(error.kind())
            .and_modify(|count| {
                count.fetch_add(1, Ordering::Relaxed);
            })
            .or_insert_with(|| AtomicU64::new(1));
    }

    /// Get metrics summary.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            roles_created: self.roles_created.load(Ordering::Relaxed),
            roles_deleted: self.roles_deleted.load(Ordering::Relaxed),
            permission_links_inserted: self.permission_links_inserted.load(Ordering::Relaxed),
            permission_links_deleted: self.permission_links_deleted.load(Ordering::Relaxed),
            label_links_inserted: self.label_links_inserted.load(Ordering::Relaxed),
            label_links_deleted: self.label_links_deleted.load(Ordering::Relaxed),
            member_roles_assigned: self.member_roles_assigned.load(Ordering::Relaxed),
            member_roles_removed: self.member_roles_removed.load(Ordering::Relaxed),
            notifications_published: self.notifications_published.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            error_counts: self
                .error_counts
                .iter()
                .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
                .collect(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        for counter in [
            &self.roles_created,
            &self.roles_deleted,
            &self.permission_links_inserted,
            &self.permission_links_deleted,
            &self.label_links_inserted,
            &self.label_links_deleted,
            &self.member_roles_assigned,
            &self.member_roles_removed,
            &self.notifications_published,
            &self.notifications_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.error_counts.clear();
    }
}

/// Point-in-time copy of [`RbacMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub roles_created: u64,
    pub roles_deleted: u64,
    pub permission_links_inserted: u64,
    pub permission_links_deleted: u64,
    pub label_links_inserted: u64,
    pub label_links_deleted: u64,
    pub member_roles_assigned: u64,
    pub member_roles_removed: u64,
    pub notifications_published: u64,
    pub notifications_failed: u64,
    pub error_counts: HashMap<ErrorKind, u64>,
}
