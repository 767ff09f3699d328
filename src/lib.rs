//! # Scoped RBAC
//!
//! A multi-tenant role-based access control core. Roles are assigned to
//! members at three nested scopes (site, organization and project), and each
//! role's permission and label associations are kept consistent with its
//! definition as the role is edited.
//!
//! ## Features
//!
//! - Set-difference reconciliation of role permissions and labels
//! - Level checks between roles, permissions and assignment scopes
//! - All-or-nothing label change notifications with rollback on publish failure
//! - Bulk member-role assignment with create and edit semantics
//! - Removal by explicit pairs or by search view
//! - Paged read views of role assignments
//! - Per-role serialization of concurrent role edits
//! - Pluggable transactional storage
//!
//! ## Quick Start
//!
//! ```rust
//! use scoped_rbac::{
//!     Member, Permission, Rbac, ResourceLevel, RoleAssignment, RoleDefinition, Storage,
//!     Transaction,
//! };
//!
//! let rbac = Rbac::new();
//!
//! // Permissions and members come from outside the core
//! let mut tx = rbac.storage().begin()?;
//! tx.put_permission(Permission::new(1, "project.read", ResourceLevel::Project));
//! tx.put_permission(Permission::new(2, "project.write", ResourceLevel::Project));
//! tx.put_member(Member::new(7, "alice"));
//! tx.commit()?;
//!
//! // Create a role, then reconcile it against a new definition
//! let role = rbac.create_role(
//!     &RoleDefinition::new("project.dev", ResourceLevel::Project).add_permission(1),
//! )?;
//! let update = rbac.update_role(
//!     role.id(),
//!     &RoleDefinition::new("project.dev", ResourceLevel::Project).add_permission(2),
//! )?;
//! assert_eq!(update.permissions.insert, vec![2]);
//! assert_eq!(update.permissions.delete, vec![1]);
//!
//! // Assign the role inside project 42
//! let rows = rbac.assign_on_project(
//!     None,
//!     42,
//!     &[7],
//!     &[RoleAssignment::new(role.id(), ResourceLevel::Project)],
//! )?;
//! assert_eq!(rows.len(), 1);
//! # Ok::<(), scoped_rbac::Error>(())
//! ```
//!
//! ## Audit Logging
//!
//! When the `audit` feature is enabled, role lifecycle changes, assignment
//! changes, published events and rejected requests are logged through the
//! `log` facade. To enable logging:
//!
//! ```rust
//! use scoped_rbac::init_audit_logger;
//!
//! // Initialize logging (must be called early in program execution)
//! init_audit_logger();
//!
//! // Configure log level through RUST_LOG environment variable:
//! // RUST_LOG=info,scoped_rbac=debug
//! ```

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    let _ = env_logger::try_init();
}

pub mod assignment;
pub mod batch;
pub mod config;
pub mod core;
pub mod error;
pub mod label;
pub mod locks;
pub mod member;
pub mod metrics;
pub mod notify;
pub mod permission;
pub mod query;
pub mod reconcile;
pub mod role;
pub mod scope;
pub mod storage;
pub mod validation;


#[cfg(feature = "async")]
pub mod async_support;

// Re-export main types for convenience
pub use crate::{
    assignment::MemberRoleService,
    batch::{BatchImport, BatchResult, ImportRow},
    config::RbacConfig,
    core::Rbac,
    error::{Error, ErrorKind, Result},
    label::Label,
    member::{Member, MemberRole},
    metrics::{MetricsSummary, RbacMetrics},
    notify::{
        EventEnvelope, EventPublisher, InMemoryPublisher, LogPublisher, MemberRoleEvent,
        MemberRoleEventPayload, NoopPublisher, PublishError,
    },
    permission::Permission,
    query::{
        MemberWithRoles, Page, PageRequest, RoleAssignmentQuery, RoleAssignmentSearch,
        RoleWithMemberCount,
    },
    reconcile::{RoleReconciler, RoleUpdate, SetDelta},
    role::{LabelRef, PermissionRef, Role, RoleDefinition},
    scope::{ResourceLevel, Scope},
    storage::{MemoryStorage, Storage, Transaction},
    validation::{RoleAssignment, RoleAssignmentDeleteRequest, RoleMemberPair},
};

#[cfg(feature = "persistence")]
pub use crate::storage::FileStorage;

#[cfg(feature = "async")]
pub use crate::async_support::AsyncRbac;
