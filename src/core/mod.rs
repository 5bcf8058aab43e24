// src/core/mod.rs — Session pipeline

pub mod context;
pub mod cost;
pub mod dispatcher;
pub mod ledger;
pub mod normalize;
pub mod orchestrator;
pub mod pool;
pub mod transcript;
pub mod types;
