//! Core data models used throughout Subtitle Tutor.
//!
//! The scenario segmentation is the root aggregate: blocks and dialogue lines
//! have no identity outside it except for `block_index` / `order`, which notes
//! and analyses use as foreign-key-like references.
//!
//! Serialized field names match the JSON documents exchanged with clients and
//! produced by the model, so these types double as the wire format.

use serde::{Deserialize, Deserializer, Serialize};

/// One subtitle line, positioned by its 1-based `order` in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl DialogueLine {
    pub fn new(order: u32, speaker: Option<&str>, text: &str) -> Self {
        Self {
            order,
            speaker: speaker.map(str::to_string),
            text: text.to_string(),
            emotion: None,
            timestamp: None,
        }
    }
}

/// What a block is good for, per skill. Each field accepts either a string or
/// a list of strings on input; lists are joined with `；`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningFocus {
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub vocabulary: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub grammar: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub listening: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub culture: Option<String>,
}

impl LearningFocus {
    /// Iterate `(name, value)` pairs in their canonical order.
    pub fn fields(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("vocabulary", self.vocabulary.as_deref()),
            ("grammar", self.grammar.as_deref()),
            ("listening", self.listening.as_deref()),
            ("culture", self.culture.as_deref()),
        ]
    }
}

/// Separator used when a focus field arrives as a list.
pub const FOCUS_LIST_SEPARATOR: &str = "；";

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<StringOrList>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        StringOrList::One(s) => s,
        StringOrList::Many(items) => items.join(FOCUS_LIST_SEPARATOR),
    }))
}

/// A contiguous, pedagogically coherent slice of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioBlock {
    pub block_index: u32,
    pub block_name: String,
    pub synopsis: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exam_alignment: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_focus: Option<LearningFocus>,
    pub dialogues: Vec<DialogueLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_tasks: Vec<String>,
}

/// A subtitle segmented into ordered scenario blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSegmentation {
    pub subtitle_title: String,
    pub segmentation_strategy: String,
    pub total_blocks: u32,
    pub blocks: Vec<ScenarioBlock>,
}

/// A user note attached to one dialogue line of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteItem {
    pub id: String,
    pub block_index: u32,
    pub order: u32,
    pub title: String,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

// ============ Analysis modules ============

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisExample {
    pub sentence: String,
    pub translation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VocabularyCore {
    pub term: String,
    pub phonetic: String,
    pub part_of_speech: String,
    pub meaning_cn: String,
    pub meaning_en: String,
    pub exam_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_example: Option<AnalysisExample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_example: Option<AnalysisExample>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VocabularyPhrase {
    pub phrase: String,
    pub meaning_cn: String,
    pub meaning_en: String,
    pub exam_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<AnalysisExample>,
    pub usage_tip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VocabularyExtension {
    pub term: String,
    pub meaning_cn: String,
    pub usage_tip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrammarPoint {
    pub title: String,
    pub explanation: String,
    pub structure: String,
    pub examples: Vec<AnalysisExample>,
    pub exam_focus: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PronunciationEntry {
    pub term: String,
    pub ipa: String,
    pub stress: String,
    pub tip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectedSpeech {
    pub phenomenon: String,
    pub example: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlangEntry {
    pub expression: String,
    pub meaning: String,
    pub usage: String,
    pub exam_warning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComprehensionCheck {
    pub question: String,
    pub answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewritingTask {
    pub instruction: String,
    pub reference: String,
    pub target_words: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VocabularyModule {
    pub focus_exams: Vec<String>,
    pub core: Vec<VocabularyCore>,
    pub phrases: Vec<VocabularyPhrase>,
    pub extension: Vec<VocabularyExtension>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrammarModule {
    pub sentence_breakdown: Vec<String>,
    pub grammar_points: Vec<GrammarPoint>,
    pub application: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListeningModule {
    pub keyword_pronunciations: Vec<PronunciationEntry>,
    pub connected_speech: Vec<ConnectedSpeech>,
    pub listening_strategies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CultureModule {
    pub slang_or_register: Vec<SlangEntry>,
    pub cultural_notes: Vec<String>,
    pub pragmatic_functions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PracticeModule {
    pub comprehension_checks: Vec<ComprehensionCheck>,
    pub rewriting_tasks: Vec<RewritingTask>,
    pub speaking_prompts: Vec<String>,
}

/// The five fixed learning modules produced per block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisModules {
    pub vocabulary: VocabularyModule,
    pub grammar: GrammarModule,
    pub listening_pronunciation: ListeningModule,
    pub culture_context: CultureModule,
    pub practice: PracticeModule,
}

/// The JSON envelope the model is asked to return for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelAnalysis {
    #[serde(default)]
    pub block_index: Option<i64>,
    #[serde(default)]
    pub block_name: Option<String>,
    pub modules: AnalysisModules,
    #[serde(default)]
    pub summary_markdown: String,
}

/// Analysis of one scenario block, as returned to callers and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub block_index: u32,
    pub block_name: String,
    pub structured: AnalysisModules,
    pub markdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_focus_accepts_string_or_list() {
        let focus: LearningFocus = serde_json::from_value(json!({
            "vocabulary": ["regroup", "defiance"],
            "grammar": "which-clauses"
        }))
        .unwrap();
        assert_eq!(focus.vocabulary.as_deref(), Some("regroup；defiance"));
        assert_eq!(focus.grammar.as_deref(), Some("which-clauses"));
        assert_eq!(focus.listening, None);
    }

    #[test]
    fn test_dialogue_omits_absent_optionals() {
        let line = DialogueLine::new(3, None, "Hi!");
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(value, json!({ "order": 3, "text": "Hi!" }));
    }

    #[test]
    fn test_note_uses_camel_case_timestamps() {
        let note = NoteItem {
            id: "n1".into(),
            block_index: 1,
            order: 2,
            title: "t".into(),
            content: "c".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-02T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(value["updatedAt"], "2024-01-02T00:00:00Z");
    }

    #[test]
    fn test_modules_reject_unknown_fields() {
        let result: Result<PronunciationEntry, _> =
            serde_json::from_value(json!({ "term": "x", "volume": "loud" }));
        assert!(result.is_err());
    }
}
