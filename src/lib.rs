pub mod batcher;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod processing;
pub mod sink;
pub mod source;
pub mod workflow;
