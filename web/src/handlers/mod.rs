//! HTTP request handlers.

pub mod health;
pub mod metrics;
pub mod prompt;

pub use health::{health_check, readiness, welcome};
pub use metrics::metrics;
pub use prompt::{PROMPT_EVENT_TYPE, PromptRequest, submit_prompt};
