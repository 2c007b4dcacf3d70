use std::time::Duration;

use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub timeout: Duration,
}

/// An opaque text-completion service. One call is one outbound request; the
/// fallback generator owns retry policy, so implementations must not retry.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

impl<P: TextProvider + ?Sized> TextProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request)
    }
}
