//! Concrete collaborator client implementations (§6.1): rig-backed LLM endpoints for
//! code generation, validation, and thinking, a reqwest-backed memory client, and a
//! `tokio::process` sandbox adapter. Each wraps its calls in the resilience envelope
//! (`forge_core::resilience`) keyed by its own endpoint string.

pub mod codegen;
pub mod memory;
pub mod sandbox;
pub mod thinker;
pub mod validator;

pub use codegen::RigCodeGenClient;
pub use memory::HttpMemoryClient;
pub use sandbox::ProcessSandboxAdapter;
pub use thinker::RigThinkerClient;
pub use validator::RigValidatorClient;

/// Classifies a stringified rig/reqwest error the way `prompt_with_retry` did: connection
/// errors, 502/503/429, and timeouts are transient; everything else is permanent.
///
/// Grounded on `orchestrator.rs`'s `prompt_with_retry` string-sniffing heuristic — rig's
/// `PromptError` doesn't expose a structured status code, so this is the same pattern the
/// teacher used, generalized from one retry loop into a reusable classifier.
pub(crate) fn classify_transport_error(message: &str) -> forge_core::resilience::FailureClass {
    use forge_core::resilience::FailureClass;
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") {
        FailureClass::RateLimited
    } else if message.contains("502")
        || message.contains("503")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("no message or tool call")
    {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    }
}
