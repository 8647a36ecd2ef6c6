pub mod aggregator;
pub mod cancellation;
pub mod client;
pub mod commands;
pub mod committer;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch_loop;
pub mod filter;
pub mod format;
pub mod kafka;
pub mod metrics_consts;
pub mod ordering;
pub mod planner;
pub mod producer;
pub mod resolve;
pub mod types;

pub use client::ClusterClient;
pub use config::Config;
pub use engine::{consume, recent_messages, ConsumeRequest, RetrievalRequest};
