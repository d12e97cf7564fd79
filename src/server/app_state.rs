use std::sync::Arc;
use std::time::Duration;

use crate::error::OpsResult;
use crate::services::builder::LocalBuilder;
use crate::services::git::GitService;
use crate::services::orchestrator::Orchestrator;
use crate::services::pipeline::UploadPipeline;
use crate::services::publisher::RemotePublisher;
use crate::services::record_store::RecordStore;
use crate::services::registry::ProjectRegistry;
use crate::settings::Settings;

pub type SharedAppState = Arc<AppState>;

/// Everything the request handlers need, constructed once at server start.
pub struct AppState {
    pub settings: Settings,
    pub registry: ProjectRegistry,
    pub git: GitService,
    pub orchestrator: Orchestrator,
    pub records: Arc<RecordStore>,
}

impl AppState {
    pub fn new(settings: Settings) -> OpsResult<Self> {
        let registry = ProjectRegistry::new(settings.workspace_root.clone());
        let git = GitService::new(
            settings.workspace_root.clone(),
            Duration::from_secs(settings.upload.git_pull_timeout_secs),
        );
        let builder = LocalBuilder::new(
            settings.workspace_root.clone(),
            settings.upload.build_program.clone(),
            settings.upload.build_script.clone(),
        );
        let publisher = RemotePublisher::new(settings.upload.upload_cli.clone());

        let records = Arc::new(RecordStore::load(settings.data_dir.clone())?);
        let pipeline = UploadPipeline::new(registry.clone(), git.clone(), builder, publisher);
        let orchestrator = Orchestrator::new(
            settings.upload.max_concurrent_builds,
            Duration::from_secs(settings.upload.pipeline_timeout_secs),
            Arc::new(pipeline),
            Arc::clone(&records),
        );

        Ok(Self {
            settings,
            registry,
            git,
            orchestrator,
            records,
        })
    }
}
