use std::fmt;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the parser, the validators, and both services.
///
/// Every variant carries a descriptive message; the HTTP and CLI boundaries
/// decide how to surface them.
#[derive(Debug, Error)]
pub enum Error {
    /// No API key is configured; raised before any model call.
    #[error("missing OPENAI_API_KEY: model credentials are not configured")]
    MissingCredentials,

    /// The subtitle text produced no usable dialogue lines.
    #[error("no usable dialogue lines found in subtitle text")]
    EmptySubtitle,

    /// The model replied with blank text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The model reply could not be coerced into JSON, even after repair.
    #[error("model response is not valid JSON ({reason})")]
    UnparsableResponse { reason: String, raw: String },

    /// Parsed JSON does not match the expected structure.
    #[error("model response failed schema validation: {0}")]
    SchemaValidation(Violations),

    /// None of the requested block indexes exist in the scenario.
    #[error("no scenario block matches the requested indexes {0:?}")]
    NoMatchingBlocks(Vec<u32>),

    /// Malformed input on an import or configuration path.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport or provider failure from the language model.
    #[error("model invocation failed: {0}")]
    Model(String),

    /// The analysis prompt template could not be loaded.
    #[error("failed to load analysis prompt template: {0}")]
    PromptTemplate(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable code, used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingCredentials => "missing_credentials",
            Error::EmptySubtitle => "empty_subtitle",
            Error::EmptyResponse => "empty_response",
            Error::UnparsableResponse { .. } => "unparsable_response",
            Error::SchemaValidation(_) => "schema_validation",
            Error::NoMatchingBlocks(_) => "no_matching_blocks",
            Error::Validation(_) => "validation",
            Error::Model(_) => "model_error",
            Error::PromptTemplate(_) => "prompt_template",
        }
    }
}

/// A single schema violation: where it happened and what was expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Ordered list of violations collected during one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl Violations {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.0.iter().map(|v| v.path.as_str()).collect()
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}
