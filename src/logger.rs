use log::LevelFilter;

use crate::error::OpsResult;

pub fn init_logging(log_level: LevelFilter) -> OpsResult {
    env_logger::builder().filter_level(log_level).try_init().ok();
    Ok(())
}
