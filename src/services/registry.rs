use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{OpsError, OpsResult};
use crate::services::types::{MiniProgramType, ProjectDescriptor};

/// Resolves the buildable sub-projects of a mini-program repository.
///
/// Everything is re-read from disk on every call; the build and
/// version-update flows rewrite files under the repository, so cached
/// descriptors would go stale immediately.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    workspace_root: PathBuf,
}

impl ProjectRegistry {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }

    /// Root of the checked-out repository for a type.
    pub fn repo_root(&self, mp_type: MiniProgramType) -> PathBuf {
        self.workspace_root.join(mp_type.dir_name())
    }

    /// All sub-projects under `<repo>/apps/*/` that carry a package.json.
    pub fn list(&self, mp_type: MiniProgramType) -> OpsResult<Vec<ProjectDescriptor>> {
        let repo_root = self.repo_root(mp_type);
        let apps_dir = repo_root.join("apps");

        if !apps_dir.is_dir() {
            return Err(OpsError::ProjectNotFound(format!(
                "apps directory does not exist: {}",
                apps_dir.display()
            )));
        }

        tracing::debug!("scanning sub-projects under {}", apps_dir.display());

        let mut descriptors = Vec::new();
        for entry in std::fs::read_dir(&apps_dir)? {
            let entry = entry?;
            let project_path = entry.path();
            if !project_path.is_dir() {
                continue;
            }

            match read_descriptor(&repo_root, &project_path) {
                Ok(Some(descriptor)) => descriptors.push(descriptor),
                Ok(None) => {}
                Err(err) => warn!(
                    "skipping unreadable project {}: {}",
                    project_path.display(),
                    err
                ),
            }
        }

        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }

    /// Find one sub-project by name. Errors if it is no longer present.
    pub fn resolve(&self, mp_type: MiniProgramType, name: &str) -> OpsResult<ProjectDescriptor> {
        self.list(mp_type)?
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| OpsError::ProjectNotFound(name.to_string()))
    }
}

fn read_descriptor(repo_root: &Path, project_path: &Path) -> OpsResult<Option<ProjectDescriptor>> {
    let pkg_path = project_path.join("package.json");
    if !pkg_path.exists() {
        warn!("package.json does not exist: {}", pkg_path.display());
        return Ok(None);
    }

    let pkg: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&pkg_path)?)?;
    let name = pkg["name"].as_str().unwrap_or_default().to_string();
    let version = pkg["version"].as_str().unwrap_or_default().to_string();

    let env_path = project_path.join(".env.development");
    let (org_name, appid) = if env_path.exists() {
        let raw = std::fs::read_to_string(&env_path)?;
        (env_value(&raw, "VITE_ORG_NAME"), env_value(&raw, "VITE_APPID"))
    } else {
        (String::new(), String::new())
    };

    let private_key_path = repo_root.join("keys").join(format!("private.{}.key", appid));
    let build_path = project_path.join("dist").join("build").join("mp-weixin");

    Ok(Some(ProjectDescriptor {
        project_path: project_path.to_path_buf(),
        name,
        org_name,
        version,
        appid,
        private_key_path,
        build_path,
    }))
}

fn env_value(raw: &str, key: &str) -> String {
    raw.lines()
        .filter_map(|line| line.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default()
}
