use std::path::PathBuf;

use log::info;

use crate::error::{OpsError, OpsResult};
use crate::services::types::{MiniProgramType, UploadMode};
use crate::util::command::stream_command_output;

/// Runs the mini-program build toolchain as a child process.
///
/// The toolchain is invoked non-interactively as
/// `<program> <script> <project> build <mode>` inside the type's repository;
/// its output is line-streamed to the log and kept for error text.
#[derive(Debug, Clone)]
pub struct LocalBuilder {
    workspace_root: PathBuf,
    program: String,
    script: String,
}

impl LocalBuilder {
    pub fn new(workspace_root: PathBuf, program: String, script: String) -> Self {
        Self {
            workspace_root,
            program,
            script,
        }
    }

    pub async fn build(
        &self,
        mp_type: MiniProgramType,
        name: &str,
        mode: UploadMode,
    ) -> OpsResult<()> {
        let repo_root = self.workspace_root.join(mp_type.dir_name());
        if !repo_root.is_dir() {
            return Err(OpsError::Build(format!(
                "project directory does not exist: {}",
                repo_root.display()
            )));
        }
        if !repo_root.join("package.json").exists() {
            return Err(OpsError::Build(format!(
                "package.json does not exist under {}",
                repo_root.display()
            )));
        }

        info!("building project {} ({}) in {} mode", name, mp_type, mode.as_str());

        let args = [self.script.as_str(), name, "build", mode.as_str()];
        let output = stream_command_output(&self.program, &args, Some(&repo_root))
            .await
            .map_err(|e| OpsError::Build(format!("failed to spawn build process: {}", e)))?;

        if output.success {
            Ok(())
        } else {
            let tail: String = output
                .transcript
                .lines()
                .rev()
                .take(20)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            Err(OpsError::Build(format!(
                "build exited with code {:?}: {}",
                output.exit_code, tail
            )))
        }
    }
}
