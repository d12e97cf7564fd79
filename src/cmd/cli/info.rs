use clap::Parser;

use crate::{error::OpsResult, settings::Settings};

#[derive(Parser, Debug, Clone)]
pub struct InfoArgs {}

pub async fn run(_args: InfoArgs, config: &Settings) -> OpsResult<()> {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("workspace root: {}", config.workspace_root.display());
    println!("data dir: {}", config.data_dir.display());
    Ok(())
}
