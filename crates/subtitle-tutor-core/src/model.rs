//! Language model seam.
//!
//! Defines the [`LanguageModel`] trait the services call, plus the
//! [`Credentials`] value that gates every model call. Concrete clients (the
//! OpenAI-compatible chat client) live in the `subtitle-tutor` app crate.

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Default chat model when neither configuration nor environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    pub model: String,
    pub temperature: f64,
    /// Completion token limit; `None` leaves it to the provider.
    pub max_tokens: Option<u32>,
}

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// A text-in, text-out language model.
///
/// Implementations must be shareable across tasks. Errors are reported as
/// `anyhow::Error` and wrapped by the services into
/// [`Error::Model`](crate::Error::Model); the services never retry.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> anyhow::Result<Completion>;
}

/// Provider credentials. Loaded by the application, checked by the services
/// before any model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub extra_headers: BTreeMap<String, String>,
}

impl Credentials {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// True when an API key is present and not blank.
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted model for service tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with queued texts in order (repeating the last one) and
    /// records every prompt it receives.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        last: Mutex<Option<String>>,
        pub calls: Mutex<Vec<(String, InvokeOptions)>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
                last: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            let model = Self::new(vec![]);
            model
                .replies
                .lock()
                .unwrap()
                .push_back(Err(anyhow::anyhow!(message.to_string())));
            model
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> anyhow::Result<Completion> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), options.clone()));
            let next = self.replies.lock().unwrap().pop_front();
            let text = match next {
                Some(Ok(text)) => {
                    *self.last.lock().unwrap() = Some(text.clone());
                    text
                }
                Some(Err(e)) => return Err(e),
                None => self.last.lock().unwrap().clone().unwrap_or_default(),
            };
            Ok(Completion::text(text))
        }
    }
}
