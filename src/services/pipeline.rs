use async_trait::async_trait;
use log::info;

use crate::services::builder::LocalBuilder;
use crate::services::git::{CommitInfo, GitService};
use crate::services::publisher::RemotePublisher;
use crate::services::registry::ProjectRegistry;
use crate::services::types::{MiniProgramType, UploadMode};

/// What one pipeline run produced, success or not. Org name and version stay
/// "unknown" when the run failed before project metadata could be resolved.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Opaque publish result on success, error message on failure.
    pub outcome: Result<String, String>,
    pub org_name: String,
    pub version: String,
    pub commit: CommitInfo,
}

impl PipelineReport {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            org_name: "unknown".to_string(),
            version: "unknown".to_string(),
            commit: CommitInfo::unknown(),
        }
    }
}

/// The orchestrator drives pipelines through this seam so its queueing and
/// status semantics can be exercised without git, a build toolchain, or the
/// third-party CI.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run(&self, mp_type: MiniProgramType, name: &str, mode: UploadMode) -> PipelineReport;
}

/// The real pipeline: sync → build → resolve metadata → publish, fail-fast.
pub struct UploadPipeline {
    registry: ProjectRegistry,
    git: GitService,
    builder: LocalBuilder,
    publisher: RemotePublisher,
}

impl UploadPipeline {
    pub fn new(
        registry: ProjectRegistry,
        git: GitService,
        builder: LocalBuilder,
        publisher: RemotePublisher,
    ) -> Self {
        Self {
            registry,
            git,
            builder,
            publisher,
        }
    }
}

#[async_trait]
impl PipelineRunner for UploadPipeline {
    async fn run(&self, mp_type: MiniProgramType, name: &str, mode: UploadMode) -> PipelineReport {
        // Stage 1: pull latest source.
        if let Err(err) = self.git.pull(mp_type).await {
            return PipelineReport::failed(err.to_string());
        }

        let commit = self.git.commit_info(mp_type).await;

        // Best-effort metadata before the build so failure records can still
        // name the org and version where possible.
        let pre_resolved = self.registry.resolve(mp_type, name).ok();
        let (mut org_name, mut version) = pre_resolved
            .map(|p| (p.org_name, p.version))
            .unwrap_or_else(|| ("unknown".to_string(), "unknown".to_string()));

        // Stage 2: local build.
        if let Err(err) = self.builder.build(mp_type, name, mode).await {
            return PipelineReport {
                outcome: Err(err.to_string()),
                org_name,
                version,
                commit,
            };
        }

        // Stage 3: re-resolve after the build; output paths may have changed
        // and the project may be gone entirely.
        let project = match self.registry.resolve(mp_type, name) {
            Ok(project) => project,
            Err(err) => {
                return PipelineReport {
                    outcome: Err(err.to_string()),
                    org_name,
                    version,
                    commit,
                }
            }
        };
        org_name = project.org_name.clone();
        version = project.version.clone();

        // Stage 4: publish to the third-party CI.
        match self.publisher.publish(&project, mode).await {
            Ok(result) => {
                info!("upload finished for {} v{}", project.name, project.version);
                PipelineReport {
                    outcome: Ok(result),
                    org_name,
                    version,
                    commit,
                }
            }
            Err(err) => PipelineReport {
                outcome: Err(err.to_string()),
                org_name,
                version,
                commit,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command;
    use std::time::Duration;

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=tester",
                "-c",
                "user.email=tester@example.com",
            ])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    // A workspace whose cloud-outpatient-mp checkout is a clone with an
    // upstream, so `git pull` succeeds. The project is named `true` and the
    // build toolchain is `sh -c`, so building it runs `true` and exits 0.
    fn fixture_pipeline(root: &Path) -> UploadPipeline {
        let origin = root.join("origin").join("cloud-outpatient-mp");
        let app = origin.join("apps").join("true");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(
            app.join("package.json"),
            r#"{"name":"true","version":"3.1.4"}"#,
        )
        .unwrap();
        std::fs::write(
            app.join(".env.development"),
            "VITE_ORG_NAME=Clinic A\nVITE_APPID=wx777\n",
        )
        .unwrap();
        std::fs::write(origin.join("package.json"), "{}").unwrap();
        git(&origin, &["init", "-b", "main"]);
        git(&origin, &["add", "."]);
        git(&origin, &["commit", "-m", "feat: initial import"]);

        let workspace = root.join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        git(
            &workspace,
            &["clone", origin.to_str().unwrap(), "cloud-outpatient-mp"],
        );

        let checkout = workspace.join("cloud-outpatient-mp");
        std::fs::create_dir_all(checkout.join("keys")).unwrap();
        std::fs::write(checkout.join("keys").join("private.wx777.key"), "key").unwrap();
        std::fs::create_dir_all(
            checkout
                .join("apps")
                .join("true")
                .join("dist")
                .join("build")
                .join("mp-weixin"),
        )
        .unwrap();

        UploadPipeline::new(
            ProjectRegistry::new(workspace.clone()),
            GitService::new(workspace.clone(), Duration::from_secs(30)),
            LocalBuilder::new(workspace.clone(), "sh".to_string(), "-c".to_string()),
            RemotePublisher::new("echo".to_string()),
        )
    }

    #[tokio::test]
    async fn full_pipeline_success_resolves_metadata_and_publishes() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = fixture_pipeline(root.path());

        let report = pipeline
            .run(MiniProgramType::CloudOutpatientMp, "true", UploadMode::Pro)
            .await;

        let publish_result = report.outcome.expect("pipeline should succeed");
        assert!(publish_result.contains("--robot 1"));
        assert_eq!(report.org_name, "Clinic A");
        assert_eq!(report.version, "3.1.4");
        assert_eq!(report.commit.last_commit_user, "tester");
        assert_eq!(report.commit.commit, "feat: initial import");
    }

    #[tokio::test]
    async fn sync_failure_aborts_with_unknown_metadata() {
        let root = tempfile::tempdir().unwrap();
        // Empty workspace: no repository to pull.
        let workspace = root.path().to_path_buf();
        let pipeline = UploadPipeline::new(
            ProjectRegistry::new(workspace.clone()),
            GitService::new(workspace.clone(), Duration::from_secs(5)),
            LocalBuilder::new(workspace.clone(), "sh".to_string(), "-c".to_string()),
            RemotePublisher::new("echo".to_string()),
        );

        let report = pipeline
            .run(MiniProgramType::CloudOutpatientMp, "true", UploadMode::Test)
            .await;

        let err = report.outcome.unwrap_err();
        assert!(err.contains("does not exist"), "unexpected error: {}", err);
        assert_eq!(report.org_name, "unknown");
        assert_eq!(report.version, "unknown");
        assert_eq!(report.commit, CommitInfo::unknown());
    }

    #[tokio::test]
    async fn build_failure_keeps_resolved_metadata() {
        let root = tempfile::tempdir().unwrap();
        let pipeline = fixture_pipeline(root.path());
        // Registered project names never contain shell syntax, so this name
        // misses the registry and the `sh -c` build exits nonzero.
        let report = pipeline
            .run(MiniProgramType::CloudOutpatientMp, "exit 7", UploadMode::Test)
            .await;

        let err = report.outcome.unwrap_err();
        assert!(err.contains("build"), "unexpected error: {}", err);
        assert_eq!(report.org_name, "unknown");
        assert_eq!(report.commit.commit, "feat: initial import");
    }
}
