pub mod builder;
pub mod git;
pub mod orchestrator;
pub mod pipeline;
pub mod publisher;
pub mod record_store;
pub mod registry;
pub mod types;
