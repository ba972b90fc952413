//! Content fingerprints for analysis cache keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{DialogueLine, LearningFocus, ScenarioBlock};

/// Model settings that change what an analysis looks like.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintConfig<'a> {
    pub model: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
    pub exam_targets: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Payload<'a> {
    title: &'a str,
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    exam_targets: &'a [String],
    #[serde(rename = "block_index")]
    block_index: u32,
    #[serde(rename = "block_name")]
    block_name: &'a str,
    synopsis: &'a str,
    dialogues: Vec<DialoguePayload<'a>>,
    #[serde(rename = "learning_focus")]
    learning_focus: Option<&'a LearningFocus>,
}

#[derive(Serialize)]
struct DialoguePayload<'a> {
    order: u32,
    speaker: Option<&'a str>,
    text: &'a str,
    emotion: Option<&'a str>,
    timestamp: Option<&'a str>,
}

impl<'a> From<&'a DialogueLine> for DialoguePayload<'a> {
    fn from(line: &'a DialogueLine) -> Self {
        Self {
            order: line.order,
            speaker: line.speaker.as_deref(),
            text: &line.text,
            emotion: line.emotion.as_deref(),
            timestamp: line.timestamp.as_deref(),
        }
    }
}

/// SHA-256 (hex) over a canonical JSON encoding of the block content and the
/// settings. Fields outside the payload (line range, tags, difficulty) do not
/// affect the key.
pub fn block_fingerprint(title: &str, block: &ScenarioBlock, config: FingerprintConfig<'_>) -> String {
    let payload = Payload {
        title,
        model: config.model,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        exam_targets: config.exam_targets,
        block_index: block.block_index,
        block_name: &block.block_name,
        synopsis: &block.synopsis,
        dialogues: block.dialogues.iter().map(DialoguePayload::from).collect(),
        learning_focus: block.learning_focus.as_ref(),
    };

    // Struct field order fixes the key order, so the encoding is canonical.
    let encoded = serde_json::to_vec(&payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    format!("{:x}", hasher.finalize())
}
