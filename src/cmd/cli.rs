use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::{error::OpsResult, logger::init_logging, settings::init_config};

mod info;
mod server;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to a settings file; layered config files are used otherwise.
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    #[clap(short('l'), long, value_name("LEVEL"), default_value("info"))]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Parser, Clone)]
pub enum Command {
    #[command(about = "Show information about mpship")]
    Info(info::InfoArgs),
    #[command(about = "Manage the console server", alias = "s")]
    Server(server::ServerInitArgs),
}

pub async fn exec() -> OpsResult {
    let cli = Cli::parse();
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        cli.log_level
    };
    init_logging(log_level)?;
    let cfg = init_config(cli.settings.clone())?;

    match cli.cmd {
        Command::Info(args) => info::run(args, cfg).await?,
        Command::Server(args) => server::run(args, cfg).await?,
    }
    Ok(())
}
