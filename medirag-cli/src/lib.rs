//! medirag command-line tool: ingestion, one-shot questions and the HTTP chat server.

pub mod app;
pub mod cli;
pub mod server;
pub mod telemetry;

pub use cli::{Cli, Commands};
pub use server::{AppState, ChatRequest, ChatResponse, ServerConfig, app_router, run_server};
