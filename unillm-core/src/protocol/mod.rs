//! Protocol module for provider request/response records
//!
//! These structures are:
//! - Provider-agnostic
//! - Immutable once built for a call
//! - Serializable for caller introspection

pub mod types;

pub use types::{
    is_truthy, FunctionCall, Message, MessageRole, ModelSelector, ProviderRequest,
    ProviderResponse, ToolCall, Usage,
};
