//! Language-generation capability trait.

use async_trait::async_trait;

use crate::error::Result;

/// An external model that completes a prompt with text.
///
/// Implementations must be safe for concurrent use; one instance is shared
/// by every in-flight conversation turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for a fully rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
