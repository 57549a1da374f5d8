/* 📖 # Why do page loaders return partial results on failure?

The project page needs two fetches: the project itself, then its secrets. When
the second fetch fails the project has already been loaded and is still worth
showing (its name, its description) next to the error. ProjectPageError keeps
the stage that failed and whatever was loaded before it.

The secrets fetch is addressed by the id the backend returned, not by the id
the caller asked for. The two only differ if the backend normalizes ids, and
then the returned one is the one that works.
*/

use std::fmt;

use tracing::{info, instrument};

use crate::api::{ApiClient, LoadError};
use crate::model::{ProjectItem, SecretItem};

/// Data for the project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectsPage {
    pub projects: Vec<ProjectItem>,
}

/// Data for one project's detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPage {
    pub project: ProjectItem,
    pub secrets: Vec<SecretItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Project,
    Secrets,
}

/// A failed project page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPageError {
    pub stage: LoadStage,
    pub error: LoadError,
    /// Set when the project loaded and only the secrets failed.
    pub project: Option<ProjectItem>,
}

impl fmt::Display for ProjectPageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            LoadStage::Project => write!(f, "Loading project failed: {}", self.error),
            LoadStage::Secrets => write!(f, "Loading secrets failed: {}", self.error),
        }
    }
}

impl std::error::Error for ProjectPageError {}

/// Fetch the project listing.
#[instrument(skip(api))]
pub fn load_projects(api: &ApiClient) -> Result<ProjectsPage, LoadError> {
    let projects = api.list_projects()?;
    info!(count = projects.len(), "loaded projects");
    Ok(ProjectsPage { projects })
}

/// Fetch a project, then its secrets.
#[instrument(skip(api))]
pub fn load_project_page(
    api: &ApiClient,
    project_id: &str,
) -> Result<ProjectPage, ProjectPageError> {
    if project_id.is_empty() {
        return Err(ProjectPageError {
            stage: LoadStage::Project,
            error: LoadError::NotFound,
            project: None,
        });
    }
    let project = api.get_project(project_id).map_err(|error| ProjectPageError {
        stage: LoadStage::Project,
        error,
        project: None,
    })?;
    let secrets = match api.list_project_secrets(&project.id) {
        Ok(secrets) => secrets,
        Err(error) => {
            return Err(ProjectPageError {
                stage: LoadStage::Secrets,
                error,
                project: Some(project),
            });
        }
    };
    info!(project_id = %project.id, secrets = secrets.len(), "loaded project page");
    Ok(ProjectPage { project, secrets })
}
