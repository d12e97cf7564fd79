use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::error::{OpsError, OpsResult};
use crate::services::types::MiniProgramType;
use crate::util::command::run_captured;

/// Author and subject of the latest commit, captured into upload records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub last_commit_user: String,
    pub commit: String,
}

impl CommitInfo {
    pub fn unknown() -> Self {
        Self {
            last_commit_user: "unknown".to_string(),
            commit: "unknown".to_string(),
        }
    }
}

/// Git plumbing for the per-type repositories: pre-build pull, commit-info
/// capture, and the version-bump commit/push flow.
#[derive(Debug, Clone)]
pub struct GitService {
    workspace_root: PathBuf,
    pull_timeout: Duration,
}

impl GitService {
    pub fn new(workspace_root: PathBuf, pull_timeout: Duration) -> Self {
        Self {
            workspace_root,
            pull_timeout,
        }
    }

    fn repo_root(&self, mp_type: MiniProgramType) -> PathBuf {
        self.workspace_root.join(mp_type.dir_name())
    }

    /// Pull latest source for a type's repository, bounded by the pull
    /// timeout.
    pub async fn pull(&self, mp_type: MiniProgramType) -> OpsResult<()> {
        let repo_root = self.repo_root(mp_type);
        if !repo_root.is_dir() {
            return Err(OpsError::Git(format!(
                "repository does not exist: {}",
                repo_root.display()
            )));
        }

        let pulled = tokio::time::timeout(
            self.pull_timeout,
            run_captured("git", &["pull"], Some(&repo_root)),
        )
        .await
        .map_err(|_| {
            OpsError::Git(format!(
                "git pull timed out after {}s",
                self.pull_timeout.as_secs()
            ))
        })?;

        match pulled {
            Ok(stdout) => {
                info!("git pull ({}): {}", mp_type, stdout.trim());
                Ok(())
            }
            Err(err) => {
                if !self.is_work_tree(mp_type).await {
                    return Err(OpsError::Git(format!(
                        "not a git work tree: {} ({})",
                        repo_root.display(),
                        err
                    )));
                }
                Err(OpsError::Git(format!("git pull failed: {}", err)))
            }
        }
    }

    /// Whether the type's directory exists and is a git work tree.
    pub async fn is_work_tree(&self, mp_type: MiniProgramType) -> bool {
        let repo_root = self.repo_root(mp_type);
        if !repo_root.is_dir() {
            return false;
        }
        run_captured("git", &["status", "--porcelain"], Some(&repo_root))
            .await
            .is_ok()
    }

    /// Latest commit author and subject. Falls back to "unknown" rather than
    /// failing; records are written even when git cannot be read.
    pub async fn commit_info(&self, mp_type: MiniProgramType) -> CommitInfo {
        let repo_root = self.repo_root(mp_type);
        let subject = run_captured("git", &["log", "-1", "--pretty=format:%s"], Some(&repo_root)).await;
        let author = run_captured("git", &["log", "-1", "--pretty=format:%an"], Some(&repo_root)).await;

        match (subject, author) {
            (Ok(subject), Ok(author)) => CommitInfo {
                last_commit_user: author.trim().to_string(),
                commit: subject.trim().to_string(),
            },
            (subject, author) => {
                warn!(
                    "unable to read git info for {}: {:?} / {:?}",
                    mp_type,
                    subject.err().map(|e| e.to_string()),
                    author.err().map(|e| e.to_string())
                );
                CommitInfo::unknown()
            }
        }
    }

    /// Rewrite every sub-project's package.json version, then commit and push
    /// the change.
    pub async fn update_versions(&self, mp_type: MiniProgramType, version: &str) -> OpsResult<()> {
        let repo_root = self.repo_root(mp_type);
        rewrite_versions(&repo_root, version)?;

        run_captured("git", &["add", "."], Some(&repo_root))
            .await
            .map_err(|e| OpsError::Git(format!("git add failed: {}", e)))?;
        run_captured(
            "git",
            &["commit", "-m", &format!("ci: bump version to {}", version)],
            Some(&repo_root),
        )
        .await
        .map_err(|e| OpsError::Git(format!("git commit failed: {}", e)))?;
        run_captured("git", &["push"], Some(&repo_root))
            .await
            .map_err(|e| OpsError::Git(format!("git push failed: {}", e)))?;

        info!("bumped {} sub-project versions to {}", mp_type, version);
        Ok(())
    }
}

/// Set the `version` field of every `apps/*/package.json` under a repository.
pub fn rewrite_versions(repo_root: &Path, version: &str) -> OpsResult<()> {
    let apps_dir = repo_root.join("apps");
    if !apps_dir.is_dir() {
        return Err(OpsError::ProjectNotFound(format!(
            "apps directory does not exist: {}",
            apps_dir.display()
        )));
    }

    let mut rewritten = 0usize;
    for entry in std::fs::read_dir(&apps_dir)? {
        let entry = entry?;
        let pkg_path = entry.path().join("package.json");
        if !pkg_path.exists() {
            continue;
        }

        let mut pkg: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&pkg_path)?)?;
        pkg["version"] = serde_json::Value::String(version.to_string());
        std::fs::write(&pkg_path, format!("{}\n", serde_json::to_string_pretty(&pkg)?))?;
        rewritten += 1;
    }

    if rewritten == 0 {
        return Err(OpsError::ProjectNotFound(
            "no sub-projects found under apps".to_string(),
        ));
    }
    Ok(())
}
