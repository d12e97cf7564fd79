use log::info;

use crate::error::{OpsError, OpsResult};
use crate::services::types::{ProjectDescriptor, UploadMode};
use crate::util::command::run_captured;

/// Pushes a built artifact to the third-party CI with the project's
/// credentials. `pro` uploads on robot slot 1 and `test` on slot 2, so the
/// two modes of the same project never collide on the platform side.
#[derive(Debug, Clone)]
pub struct RemotePublisher {
    upload_cli: String,
}

impl RemotePublisher {
    pub fn new(upload_cli: String) -> Self {
        Self { upload_cli }
    }

    /// Upload one built project. Returns the CLI's output as the opaque
    /// publish result.
    pub async fn publish(
        &self,
        project: &ProjectDescriptor,
        mode: UploadMode,
    ) -> OpsResult<String> {
        if !project.private_key_path.exists() {
            return Err(OpsError::Publish(format!(
                "private key does not exist: {}",
                project.private_key_path.display()
            )));
        }
        if !project.build_path.is_dir() {
            return Err(OpsError::Publish(format!(
                "build output does not exist: {}",
                project.build_path.display()
            )));
        }

        let robot = mode.robot().to_string();
        let description = format!("{} upload ({})", mode.as_str(), project.name);
        let project_path = project.build_path.display().to_string();
        let key_path = project.private_key_path.display().to_string();

        let args = [
            "upload",
            "--project-path",
            project_path.as_str(),
            "--appid",
            project.appid.as_str(),
            "--private-key-path",
            key_path.as_str(),
            "--upload-version",
            project.version.as_str(),
            "--robot",
            robot.as_str(),
            "--upload-description",
            description.as_str(),
        ];

        info!(
            "publishing {} v{} as robot {} ({})",
            project.name,
            project.version,
            robot,
            mode.as_str()
        );

        run_captured(&self.upload_cli, &args, None)
            .await
            .map_err(|e| OpsError::Publish(e.to_string()))
    }
}
