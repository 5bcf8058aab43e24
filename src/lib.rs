// src/lib.rs — Library root for Parley

pub mod cli;
pub mod core;
pub mod infra;
pub mod provider;
