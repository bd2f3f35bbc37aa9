// lib.rs - ReconChain library
// Purpose: Orchestrate external recon tools across four dependent phases

pub mod artifact;
pub mod config;
pub mod executor;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod task;
pub mod task_runner;
pub mod tools;
