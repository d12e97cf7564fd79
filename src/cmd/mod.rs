mod cli;

pub use cli::{exec, Cli};
