//! # corax-api
//!
//! REST surface for the Corax agent.
//!
//! This crate provides:
//! - `POST /query` - send a question to the agent
//! - `POST /approve` - respond to a phase transition request
//! - `GET /health` - status, version, tool and session counts
//! - `GET /sessions`, `DELETE /sessions/:id` - session listing and cleanup
//!
//! Strictly request/response mapping; all reasoning lives in
//! `corax-orchestrator`.

#![allow(dead_code)]

mod server;

pub use server::{
    router, serve, AppState, ApproveRequest, HealthResponse, QueryRequest, QueryResponse,
    SessionScope, SharedState,
};
