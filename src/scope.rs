//! The three-level resource hierarchy and its consistency rules.
//!
//! Every role, permission and member-role assignment lives at exactly one
//! [`ResourceLevel`]. Assignments are further pinned to a [`Scope`], which pairs
//! the level with the id of the owning organization or project. Site scope is
//! global and always uses [`SITE_SOURCE_ID`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source id used for every site-level assignment.
pub const SITE_SOURCE_ID: i64 = 0;

/// A tier of the resource hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLevel {
    /// Global scope.
    Site,
    /// A tenant organization.
    Organization,
    /// A project inside an organization.
    Project,
}

impl ResourceLevel {
    /// All levels, outermost first.
    pub const ALL: [ResourceLevel; 3] = [
        ResourceLevel::Site,
        ResourceLevel::Organization,
        ResourceLevel::Project,
    ];

    /// The wire name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceLevel::Site => "site",
            ResourceLevel::Organization => "organization",
            ResourceLevel::Project => "project",
        }
    }
}

impl fmt::Display for ResourceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "site" => Ok(ResourceLevel::Site),
            "organization" => Ok(ResourceLevel::Organization),
            "project" => Ok(ResourceLevel::Project),
            other => Err(Error::InvalidScope(format!("unknown level '{other}'"))),
        }
    }
}

/// Whether a permission of `permission_level` may be attached to a role of `role_level`.
pub fn compatible_level(permission_level: ResourceLevel, role_level: ResourceLevel) -> bool {
    permission_level == role_level
}

/// A level together with the id of the resource that owns the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    level: ResourceLevel,
    source_id: i64,
}

impl Scope {
    /// Build a scope, validating that the source id agrees with the level.
    pub fn new(level: ResourceLevel, source_id: i64) -> Result<Self> {
        match level {
            ResourceLevel::Site if source_id != SITE_SOURCE_ID => Err(Error::InvalidScope(
                format!("site scope requires source id {SITE_SOURCE_ID}, got {source_id}"),
            )),
            ResourceLevel::Organization | ResourceLevel::Project if source_id <= 0 => {
                Err(Error::InvalidScope(format!(
                    "{level} scope requires a positive source id, got {source_id}"
                )))
            }
            _ => Ok(Self { level, source_id }),
        }
    }

    /// The global scope.
    pub fn site() -> Self {
        Self {
            level: ResourceLevel::Site,
            source_id: SITE_SOURCE_ID,
        }
    }

    /// An organization scope.
    pub fn organization(organization_id: i64) -> Result<Self> {
        Self::new(ResourceLevel::Organization, organization_id)
    }

    /// A project scope.
    pub fn project(project_id: i64) -> Result<Self> {
        Self::new(ResourceLevel::Project, project_id)
    }

    /// The level of this scope.
    pub fn level(&self) -> ResourceLevel {
        self.level
    }

    /// The owning resource id (0 for site).
    pub fn source_id(&self) -> i64 {
        self.source_id
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_scope_forces_zero() {
        assert_eq!(Scope::site().source_id(), SITE_SOURCE_ID);
        assert!(Scope::new(ResourceLevel::Site, 0).is_ok());
        assert!(matches!(
            Scope::new(ResourceLevel::Site, 7),
            Err(Error::InvalidScope(_))
        ));
    }

    #[test]
    fn test_nested_scopes_require_positive_id() {
        assert!(Scope::organization(42).is_ok());
        assert!(Scope::project(1).is_ok());
        assert!(matches!(Scope::organization(0), Err(Error::InvalidScope(_))));
        assert!(matches!(Scope::project(-3), Err(Error::InvalidScope(_))));
    }

    #[test]
    fn test_compatible_level() {
        for role_level in ResourceLevel::ALL {
            for permission_level in ResourceLevel::ALL {
                assert_eq!(
                    compatible_level(permission_level, role_level),
                    permission_level == role_level
                );
            }
        }
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("Project".parse::<ResourceLevel>().unwrap(), ResourceLevel::Project);
        assert_eq!(" site ".parse::<ResourceLevel>().unwrap(), ResourceLevel::Site);
        assert!("tenant".parse::<ResourceLevel>().is_err());
        assert_eq!(ResourceLevel::Organization.to_string(), "organization");
        assert_eq!(Scope::organization(42).unwrap().to_string(), "organization:42");
    }
}
