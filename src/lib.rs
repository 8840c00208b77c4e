//! CompileSpace execution service library
//!
//! This crate provides the backend the CompileSpace editor submits code to:
//! - Configuration and per-language container profiles
//! - Source materialization into isolated or shared workspaces
//! - Container runtimes (`docker run` per request, or `docker-compose up`)
//! - Output cleaning and compose log demultiplexing
//! - HTTP and MCP surfaces over one execution handler

pub mod backend;
pub mod config;
pub mod demux;
pub mod executor;
pub mod http;
pub mod language;
pub mod mcp;
pub mod workspace;
