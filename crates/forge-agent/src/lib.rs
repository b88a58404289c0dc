//! forge-agent: concrete collaborator clients wiring `forge-core`'s transport-agnostic traits
//! to rig-backed LLM endpoints, reqwest-backed memory/health calls, and a `tokio::process`
//! sandbox, plus the binary entry point exposing the management surface (§6.2) over MCP.

pub mod clients;
pub mod config;
