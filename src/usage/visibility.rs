//! Per-request resolution of which services a caller may query.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::registry::Registry;

/// Capability tier of a dashboard caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sees every service.
    Privileged,
    /// Sees only services under projects it owns.
    Restricted,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "privileged" | "admin" | "owner" => Some(Role::Privileged),
            "restricted" | "user" => Some(Role::Restricted),
            _ => None,
        }
    }
}

/// Authenticated dashboard caller, as handed over by the identity gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: String,
    pub role: Role,
}

/// Optional narrowing requested by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeFilter {
    pub service_id: Option<String>,
    pub project_id: Option<String>,
}

/// The set of services a query may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// No service predicate at all.
    All,
    /// Matches nothing. Queries still succeed with zero-valued results.
    None,
    /// Exactly these services. Never empty.
    Only(BTreeSet<String>),
}

impl Scope {
    /// Builds an `Only` scope, collapsing an empty set to `None`.
    pub fn only(ids: BTreeSet<String>) -> Self {
        if ids.is_empty() {
            Scope::None
        } else {
            Scope::Only(ids)
        }
    }

    pub fn single(id: impl Into<String>) -> Self {
        Scope::Only(BTreeSet::from([id.into()]))
    }

    pub fn admits(&self, service_id: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::None => false,
            Scope::Only(ids) => ids.contains(service_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::None => "none",
            Scope::Only(_) => "only",
        }
    }
}

/// Computes the caller's scope from scratch. Must run once per request;
/// ownership can change between calls, so the result is never cached.
pub fn resolve(caller: &Caller, filter: &ScopeFilter, registry: &dyn Registry) -> Scope {
    let service_id = filter.service_id.as_deref().filter(|s| !s.is_empty());
    let project_id = filter.project_id.as_deref().filter(|s| !s.is_empty());

    match caller.role {
        Role::Privileged => {
            if let Some(service_id) = service_id {
                Scope::single(service_id)
            } else if let Some(project_id) = project_id {
                Scope::only(registry.services_in_project(project_id))
            } else {
                Scope::All
            }
        }
        Role::Restricted => {
            let projects = registry.projects_owned_by(&caller.identity);

            if let Some(service_id) = service_id {
                let owned = projects
                    .iter()
                    .any(|p| registry.services_in_project(p).contains(service_id));
                if owned {
                    Scope::single(service_id)
                } else {
                    Scope::None
                }
            } else if let Some(project_id) = project_id {
                if projects.contains(project_id) {
                    Scope::only(registry.services_in_project(project_id))
                } else {
                    Scope::None
                }
            } else {
                Scope::only(
                    projects
                        .iter()
                        .flat_map(|p| registry.services_in_project(p))
                        .collect(),
                )
            }
        }
    }
}
