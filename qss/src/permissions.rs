//! Permission checks for suggestion management
//!
//! Viewing suggestions is open to everyone. Creating, approving, and
//! deleting them requires the [`MANAGE_SUGGESTIONS`] right, decided by a
//! [`Permissions`] policy injected into the services.

use std::collections::BTreeSet;

/// Permission code granting suggestion management
pub const MANAGE_SUGGESTIONS: &str = "MANAGE_SEARCH_SUGGESTIONS";

/// Whoever performs an administrative action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Identifier supplied by the caller's identity system
    pub id: String,
    /// Permission codes held by the actor
    pub permissions: BTreeSet<String>,
}

impl Actor {
    /// Create an actor holding no permissions
    pub fn new(id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// Grant a permission code
    pub fn with_permission(mut self, code: impl Into<String>) -> Self {
        self.permissions.insert(code.into());
        self
    }

    /// Shorthand for an actor holding [`MANAGE_SUGGESTIONS`]
    pub fn manager(id: impl Into<String>) -> Self {
        Self::new(id).with_permission(MANAGE_SUGGESTIONS)
    }

    /// Whether the actor holds the permission code
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.contains(code)
    }
}

/// Capability check deciding who may manage suggestions
pub trait Permissions: Send + Sync {
    /// Whether the actor may create, approve, or delete suggestions
    fn can_manage_suggestions(&self, actor: &Actor) -> bool;
}

impl<F> Permissions for F
where
    F: Fn(&Actor) -> bool + Send + Sync,
{
    fn can_manage_suggestions(&self, actor: &Actor) -> bool {
        self(actor)
    }
}

/// Default policy: the actor must hold [`MANAGE_SUGGESTIONS`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionCode;

impl Permissions for PermissionCode {
    fn can_manage_suggestions(&self, actor: &Actor) -> bool {
        actor.has_permission(MANAGE_SUGGESTIONS)
    }
}
