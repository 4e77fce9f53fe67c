pub mod canonical;
pub mod config;
pub mod context;
pub mod dedup;
pub mod error;
pub mod flow;
pub mod metrics_consts;
pub mod pipeline;
pub mod preview;
pub mod progress;
pub mod record;
pub mod schema;
pub mod store;
pub mod upload;
pub mod validate;
