use std::{env, path::PathBuf, sync::OnceLock};

use config::File;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::OpsResult;

pub static CONFIG_INSTANCE: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerArgs {
    pub port: u16,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self { port: 9999 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadArgs {
    /// Maximum number of simultaneously building projects per mini-program type.
    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,

    /// Wall-clock bound on one whole sync/build/publish pipeline run.
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,

    #[serde(default = "default_git_pull_timeout_secs")]
    pub git_pull_timeout_secs: u64,

    /// Program and script used to build a sub-project inside the repository.
    #[serde(default = "default_build_program")]
    pub build_program: String,

    #[serde(default = "default_build_script")]
    pub build_script: String,

    /// Third-party upload CLI invoked with the built artifact.
    #[serde(default = "default_upload_cli")]
    pub upload_cli: String,
}

impl Default for UploadArgs {
    fn default() -> Self {
        Self {
            max_concurrent_builds: default_max_concurrent_builds(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
            git_pull_timeout_secs: default_git_pull_timeout_secs(),
            build_program: default_build_program(),
            build_script: default_build_script(),
            upload_cli: default_upload_cli(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,

    /// Directory holding one checked-out repository per mini-program type.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Directory the upload record files are persisted under.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "ServerArgs::default")]
    pub server: ServerArgs,

    #[serde(default = "UploadArgs::default")]
    pub upload: UploadArgs,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workspace_root: default_workspace_root(),
            data_dir: default_data_dir(),
            server: ServerArgs::default(),
            upload: UploadArgs::default(),
        }
    }
}

pub fn get_config() -> OpsResult<&'static Settings> {
    Ok(CONFIG_INSTANCE.get().expect("Config not initialized"))
}

pub fn init_config(root: Option<PathBuf>) -> OpsResult<&'static Settings> {
    let settings = Settings::from_root(root)?;
    CONFIG_INSTANCE.set(settings).ok();
    get_config()
}

impl Settings {
    pub fn from_root(root: Option<PathBuf>) -> OpsResult<Self> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config.{}", run_mode)).required(false));

        if let Some(root) = root {
            builder = builder.add_source(File::from(root.as_path()).required(true));
        }

        let cfg = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn default_workspace_root() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("Desktop").join("code").join("taozi")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_concurrent_builds() -> usize {
    3
}

fn default_pipeline_timeout_secs() -> u64 {
    300
}

fn default_git_pull_timeout_secs() -> u64 {
    30
}

fn default_build_program() -> String {
    "node".to_string()
}

fn default_build_script() -> String {
    "./packages/script/launch/index.js".to_string()
}

fn default_upload_cli() -> String {
    "miniprogram-ci".to_string()
}
