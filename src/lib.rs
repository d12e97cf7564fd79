pub(crate) mod cmd;
pub(crate) mod error;
pub(crate) mod logger;
pub(crate) mod server;
pub mod services;
pub(crate) mod settings;
pub mod util;

pub use cmd::exec;
pub use error::{OpsError, OpsResult};
