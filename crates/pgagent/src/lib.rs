// Domain-driven module structure for the Postgres log agent.

// Core pipeline
pub mod parser;
pub mod classify;
pub mod sample;
pub mod redact;
pub mod stream;
pub mod debug;

// Agent runtime
pub mod conf;
pub mod state;
pub mod runtime;
pub mod service;
