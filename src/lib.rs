pub mod app;
pub mod config;
pub mod executor;
pub mod gaps;
pub mod pipeline;
pub mod plan;
pub mod planner;
pub mod policy;
pub mod registry;
pub mod schema;
pub mod shared;
