use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

/// Read-only view of the project/service registry.
///
/// Project and service CRUD and API-key issuance happen elsewhere; ingestion
/// and analytics only ever need these lookups.
pub trait Registry: Send + Sync {
    /// Service bound to an ingest API key.
    fn service_for_key(&self, api_key: &str) -> Option<String>;

    /// Projects whose owner is `identity`.
    fn projects_owned_by(&self, identity: &str) -> BTreeSet<String>;

    /// Services filed under `project_id`. Unknown projects have none.
    fn services_in_project(&self, project_id: &str) -> BTreeSet<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse registry file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("api key is assigned to more than one service ({0} and {1})")]
    DuplicateKey(String, String),

    #[error("service '{0}' appears in more than one project")]
    DuplicateService(String),

    #[error("project '{0}' is declared more than once")]
    DuplicateProject(String),
}

// ─── On-disk document ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    /// Identity of the owning admin; `None` for unowned projects.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub api_key: String,
}

// ─── StaticRegistry ──────────────────────────────────────────────

/// Registry snapshot loaded once at startup from a JSON document.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    keys: HashMap<String, String>,
    owned_projects: HashMap<String, BTreeSet<String>>,
    project_services: HashMap<String, BTreeSet<String>>,
}

impl StaticRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let raw = std::fs::read(path)?;
        let doc: RegistryDocument = serde_json::from_slice(&raw)?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: RegistryDocument) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        let mut seen_services = BTreeSet::new();

        for project in doc.projects {
            if registry.project_services.contains_key(&project.id) {
                return Err(RegistryError::DuplicateProject(project.id));
            }
            if let Some(owner) = project.owner {
                registry
                    .owned_projects
                    .entry(owner)
                    .or_default()
                    .insert(project.id.clone());
            }

            let services = registry.project_services.entry(project.id).or_default();
            for service in project.services {
                if !seen_services.insert(service.id.clone()) {
                    return Err(RegistryError::DuplicateService(service.id));
                }
                if let Some(previous) = registry.keys.get(&service.api_key) {
                    return Err(RegistryError::DuplicateKey(previous.clone(), service.id));
                }
                registry.keys.insert(service.api_key, service.id.clone());
                services.insert(service.id);
            }
        }

        Ok(registry)
    }

    pub fn service_count(&self) -> usize {
        self.keys.len()
    }
}

impl Registry for StaticRegistry {
    fn service_for_key(&self, api_key: &str) -> Option<String> {
        self.keys.get(api_key).cloned()
    }

    fn projects_owned_by(&self, identity: &str) -> BTreeSet<String> {
        self.owned_projects.get(identity).cloned().unwrap_or_default()
    }

    fn services_in_project(&self, project_id: &str) -> BTreeSet<String> {
        self.project_services
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }
}
