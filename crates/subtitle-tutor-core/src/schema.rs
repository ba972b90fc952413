//! Structural validation of untyped JSON against the scenario and analysis
//! shapes.
//!
//! `serde` stops at the first mismatch and reports it without a path, which
//! is a poor diagnostic for model output. The validator here walks a
//! [`serde_json::Value`] against a declarative [`Shape`] table and collects
//! every violation with its JSON path (`blocks[1].dialogues[0].text`). Only
//! when the walk is clean is the value converted into the typed model.
//!
//! Two strictness levels are used:
//!
//! - **Analysis shapes** are strict: unknown properties are violations,
//!   optional strings and lists default to empty.
//! - **Scenario shapes** ignore unknown properties, matching what both the
//!   model and older exports tend to carry.
//!
//! `null` is treated the same as an absent property.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Violation, Violations};
use crate::models::{ModelAnalysis, ScenarioBlock, ScenarioSegmentation};

/// What a single property must look like.
#[derive(Debug, Clone, Copy)]
pub enum Kind {
    /// Required, non-empty string.
    RequiredStr,
    /// Optional string (may be empty).
    OptionalStr,
    /// Optional list of strings.
    StrList,
    /// Required integer `>= 1` that fits in `u32`.
    PositiveInt,
    /// Optional integer of any sign.
    OptionalInt,
    /// Required nested object.
    Object(&'static Shape),
    /// Optional nested object.
    OptionalObject(&'static Shape),
    /// List of objects with at least `min` items; required when `min > 0`.
    ObjectList { shape: &'static Shape, min: usize },
    /// Optional non-empty string, or non-empty list of non-empty strings.
    TextOrList,
    /// Optional string or list of strings; blanks allowed.
    LooseTextOrList,
}

/// A named property and its expected [`Kind`].
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: Kind,
}

const fn field(name: &'static str, kind: Kind) -> Field {
    Field { name, kind }
}

/// An object shape: its properties and whether unknown ones are rejected.
#[derive(Debug)]
pub struct Shape {
    pub fields: &'static [Field],
    pub strict: bool,
}

// ============ Scenario shapes ============

const DIALOGUE: &Shape = &Shape {
    strict: false,
    fields: &[
        field("order", Kind::PositiveInt),
        field("speaker", Kind::OptionalStr),
        field("text", Kind::RequiredStr),
        field("emotion", Kind::OptionalStr),
        field("timestamp", Kind::OptionalStr),
    ],
};

const LEARNING_FOCUS: &Shape = &Shape {
    strict: false,
    fields: &[
        field("vocabulary", Kind::TextOrList),
        field("grammar", Kind::TextOrList),
        field("listening", Kind::TextOrList),
        field("culture", Kind::TextOrList),
    ],
};

/// Imported focus fields may be blank; normalization drops them.
const IMPORTED_LEARNING_FOCUS: &Shape = &Shape {
    strict: false,
    fields: &[
        field("vocabulary", Kind::LooseTextOrList),
        field("grammar", Kind::LooseTextOrList),
        field("listening", Kind::LooseTextOrList),
        field("culture", Kind::LooseTextOrList),
    ],
};

macro_rules! block_shape {
    ($focus:expr) => {
        &Shape {
            strict: false,
            fields: &[
                field("block_index", Kind::PositiveInt),
                field("block_name", Kind::RequiredStr),
                field("synopsis", Kind::RequiredStr),
                field("start_line", Kind::PositiveInt),
                field("end_line", Kind::PositiveInt),
                field("context_tags", Kind::StrList),
                field("exam_alignment", Kind::StrList),
                field("difficulty", Kind::OptionalStr),
                field("learning_focus", Kind::OptionalObject($focus)),
                field(
                    "dialogues",
                    Kind::ObjectList {
                        shape: DIALOGUE,
                        min: 1,
                    },
                ),
                field("follow_up_tasks", Kind::StrList),
            ],
        }
    };
}

macro_rules! scenario_shape {
    ($block:expr) => {
        &Shape {
            strict: false,
            fields: &[
                field("subtitle_title", Kind::RequiredStr),
                field("segmentation_strategy", Kind::RequiredStr),
                field("total_blocks", Kind::PositiveInt),
                field(
                    "blocks",
                    Kind::ObjectList {
                        shape: $block,
                        min: 1,
                    },
                ),
            ],
        }
    };
}

const BLOCK: &Shape = block_shape!(LEARNING_FOCUS);

const IMPORTED_BLOCK: &Shape = block_shape!(IMPORTED_LEARNING_FOCUS);

/// Top-level scenario segmentation shape.
pub const SCENARIO: &Shape = scenario_shape!(BLOCK);

/// Scenario shape for imported documents.
pub const IMPORTED_SCENARIO: &Shape = scenario_shape!(IMPORTED_BLOCK);

// ============ Analysis shapes ============

const fn list_of(shape: &'static Shape) -> Kind {
    Kind::ObjectList { shape, min: 0 }
}

const EXAMPLE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("sentence", Kind::RequiredStr),
        field("translation", Kind::OptionalStr),
    ],
};

const VOCABULARY_CORE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("term", Kind::RequiredStr),
        field("phonetic", Kind::OptionalStr),
        field("part_of_speech", Kind::OptionalStr),
        field("meaning_cn", Kind::OptionalStr),
        field("meaning_en", Kind::OptionalStr),
        field("exam_tags", Kind::StrList),
        field("subtitle_example", Kind::OptionalObject(EXAMPLE)),
        field("exam_example", Kind::OptionalObject(EXAMPLE)),
        field("notes", Kind::OptionalStr),
    ],
};

const VOCABULARY_PHRASE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("phrase", Kind::RequiredStr),
        field("meaning_cn", Kind::OptionalStr),
        field("meaning_en", Kind::OptionalStr),
        field("exam_tags", Kind::StrList),
        field("example", Kind::OptionalObject(EXAMPLE)),
        field("usage_tip", Kind::OptionalStr),
    ],
};

const VOCABULARY_EXTENSION: &Shape = &Shape {
    strict: true,
    fields: &[
        field("term", Kind::RequiredStr),
        field("meaning_cn", Kind::OptionalStr),
        field("usage_tip", Kind::OptionalStr),
    ],
};

const GRAMMAR_POINT: &Shape = &Shape {
    strict: true,
    fields: &[
        field("title", Kind::RequiredStr),
        field("explanation", Kind::OptionalStr),
        field("structure", Kind::OptionalStr),
        field("examples", list_of(EXAMPLE)),
        field("exam_focus", Kind::OptionalStr),
    ],
};

const PRONUNCIATION: &Shape = &Shape {
    strict: true,
    fields: &[
        field("term", Kind::RequiredStr),
        field("ipa", Kind::OptionalStr),
        field("stress", Kind::OptionalStr),
        field("tip", Kind::OptionalStr),
    ],
};

const CONNECTED_SPEECH: &Shape = &Shape {
    strict: true,
    fields: &[
        field("phenomenon", Kind::RequiredStr),
        field("example", Kind::OptionalStr),
        field("explanation", Kind::OptionalStr),
    ],
};

const SLANG: &Shape = &Shape {
    strict: true,
    fields: &[
        field("expression", Kind::RequiredStr),
        field("meaning", Kind::OptionalStr),
        field("usage", Kind::OptionalStr),
        field("exam_warning", Kind::OptionalStr),
    ],
};

const COMPREHENSION: &Shape = &Shape {
    strict: true,
    fields: &[
        field("question", Kind::RequiredStr),
        field("answer", Kind::OptionalStr),
        field("explanation", Kind::OptionalStr),
    ],
};

const REWRITING: &Shape = &Shape {
    strict: true,
    fields: &[
        field("instruction", Kind::RequiredStr),
        field("reference", Kind::OptionalStr),
        field("target_words", Kind::StrList),
    ],
};

const VOCABULARY_MODULE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("focus_exams", Kind::StrList),
        field("core", list_of(VOCABULARY_CORE)),
        field("phrases", list_of(VOCABULARY_PHRASE)),
        field("extension", list_of(VOCABULARY_EXTENSION)),
    ],
};

const GRAMMAR_MODULE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("sentence_breakdown", Kind::StrList),
        field("grammar_points", list_of(GRAMMAR_POINT)),
        field("application", Kind::StrList),
    ],
};

const LISTENING_MODULE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("keyword_pronunciations", list_of(PRONUNCIATION)),
        field("connected_speech", list_of(CONNECTED_SPEECH)),
        field("listening_strategies", Kind::StrList),
    ],
};

const CULTURE_MODULE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("slang_or_register", list_of(SLANG)),
        field("cultural_notes", Kind::StrList),
        field("pragmatic_functions", Kind::StrList),
    ],
};

const PRACTICE_MODULE: &Shape = &Shape {
    strict: true,
    fields: &[
        field("comprehension_checks", list_of(COMPREHENSION)),
        field("rewriting_tasks", list_of(REWRITING)),
        field("speaking_prompts", Kind::StrList),
    ],
};

const MODULES: &Shape = &Shape {
    strict: true,
    fields: &[
        field("vocabulary", Kind::Object(VOCABULARY_MODULE)),
        field("grammar", Kind::Object(GRAMMAR_MODULE)),
        field("listening_pronunciation", Kind::Object(LISTENING_MODULE)),
        field("culture_context", Kind::Object(CULTURE_MODULE)),
        field("practice", Kind::Object(PRACTICE_MODULE)),
    ],
};

/// Envelope the model returns for one analysed block.
pub const MODEL_ANALYSIS: &Shape = &Shape {
    strict: true,
    fields: &[
        field("block_index", Kind::OptionalInt),
        field("block_name", Kind::OptionalStr),
        field("modules", Kind::Object(MODULES)),
        field("summary_markdown", Kind::OptionalStr),
    ],
};

// ============ Walker ============

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn push(out: &mut Vec<Violation>, path: &str, message: impl Into<String>) {
    out.push(Violation {
        path: path.to_string(),
        message: message.into(),
    });
}

/// Check `value` against `shape`, appending every violation to `out`.
pub fn check_shape(value: &Value, path: &str, shape: &Shape, out: &mut Vec<Violation>) {
    let Some(obj) = value.as_object() else {
        push(out, path, format!("expected object, got {}", type_name(value)));
        return;
    };

    if shape.strict {
        for key in obj.keys() {
            if !shape.fields.iter().any(|f| f.name == key) {
                push(out, &join_key(path, key), "unrecognized property");
            }
        }
    }

    for f in shape.fields {
        check_field(obj, f, &join_key(path, f.name), out);
    }
}

fn check_field(obj: &Map<String, Value>, f: &Field, path: &str, out: &mut Vec<Violation>) {
    let value = obj.get(f.name).filter(|v| !v.is_null());

    match f.kind {
        Kind::RequiredStr => match value {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::String(_)) => push(out, path, "must not be empty"),
            Some(other) => push(out, path, format!("expected string, got {}", type_name(other))),
            None => push(out, path, "required"),
        },
        Kind::OptionalStr => {
            if let Some(v) = value {
                if !v.is_string() {
                    push(out, path, format!("expected string, got {}", type_name(v)));
                }
            }
        }
        Kind::StrList => {
            if let Some(v) = value {
                check_string_list(v, path, false, out);
            }
        }
        Kind::PositiveInt => match value {
            Some(v) => {
                let ok = v
                    .as_u64()
                    .map(|n| n >= 1 && n <= u64::from(u32::MAX))
                    .unwrap_or(false);
                if !ok {
                    push(out, path, format!("expected positive integer, got {v}"));
                }
            }
            None => push(out, path, "required"),
        },
        Kind::OptionalInt => {
            if let Some(v) = value {
                if !(v.is_i64() || v.is_u64()) {
                    push(out, path, format!("expected integer, got {v}"));
                }
            }
        }
        Kind::Object(shape) => match value {
            Some(v) => check_shape(v, path, shape, out),
            None => push(out, path, "required"),
        },
        Kind::OptionalObject(shape) => {
            if let Some(v) = value {
                check_shape(v, path, shape, out);
            }
        }
        Kind::ObjectList { shape, min } => match value {
            Some(Value::Array(items)) => {
                if items.len() < min {
                    push(out, path, format!("expected at least {min} item(s)"));
                }
                for (i, item) in items.iter().enumerate() {
                    check_shape(item, &format!("{path}[{i}]"), shape, out);
                }
            }
            Some(other) => push(out, path, format!("expected array, got {}", type_name(other))),
            None if min > 0 => push(out, path, "required"),
            None => {}
        },
        Kind::TextOrList => match value {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::String(_)) => push(out, path, "must not be empty"),
            Some(v @ Value::Array(_)) => check_string_list(v, path, true, out),
            Some(other) => push(
                out,
                path,
                format!("expected string or list of strings, got {}", type_name(other)),
            ),
            None => {}
        },
        Kind::LooseTextOrList => match value {
            Some(Value::String(_)) | None => {}
            Some(v @ Value::Array(_)) => check_string_list(v, path, false, out),
            Some(other) => push(
                out,
                path,
                format!("expected string or list of strings, got {}", type_name(other)),
            ),
        },
    }
}

fn check_string_list(value: &Value, path: &str, non_empty: bool, out: &mut Vec<Violation>) {
    let Some(items) = value.as_array() else {
        push(out, path, format!("expected array, got {}", type_name(value)));
        return;
    };
    if non_empty && items.is_empty() {
        push(out, path, "expected at least 1 item(s)");
    }
    for (i, item) in items.iter().enumerate() {
        match item {
            Value::String(s) if non_empty && s.is_empty() => {
                push(out, &format!("{path}[{i}]"), "must not be empty")
            }
            Value::String(_) => {}
            other => push(
                out,
                &format!("{path}[{i}]"),
                format!("expected string, got {}", type_name(other)),
            ),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate `value` against `shape`, then convert it into `T`.
pub fn validate<T: DeserializeOwned>(value: &Value, shape: &Shape) -> Result<T, Violations> {
    let mut out = Vec::new();
    check_shape(value, "", shape, &mut out);
    if !out.is_empty() {
        return Err(Violations(out));
    }
    convert(value)
}

/// Validate a model analysis envelope (strict, with defaults).
pub fn validate_analysis(value: &Value) -> Result<ModelAnalysis, Violations> {
    validate(value, MODEL_ANALYSIS)
}

/// Validate a scenario segmentation.
///
/// When `require_focus_content` is set (imported documents), individual
/// `learning_focus` fields may be blank but a present `learning_focus` must
/// carry at least one non-blank field. Model output gets the opposite: every
/// present field must be non-empty and an empty object is fine.
pub fn validate_segmentation(
    value: &Value,
    require_focus_content: bool,
) -> Result<ScenarioSegmentation, Violations> {
    let shape = if require_focus_content {
        IMPORTED_SCENARIO
    } else {
        SCENARIO
    };
    let mut out = Vec::new();
    check_shape(value, "", shape, &mut out);

    if require_focus_content {
        let blocks = value.get("blocks").and_then(Value::as_array);
        for (i, block) in blocks.into_iter().flatten().enumerate() {
            if let Some(focus) = block.get("learning_focus").and_then(Value::as_object) {
                if !focus.values().any(has_text) {
                    push(
                        &mut out,
                        &format!("blocks[{i}].learning_focus"),
                        "needs at least one non-empty field",
                    );
                }
            }
        }
    }

    if !out.is_empty() {
        return Err(Violations(out));
    }
    convert(value)
}

/// Check blocks handed in for analysis against the imported block shape.
pub fn validate_blocks(blocks: &[ScenarioBlock]) -> Result<(), Violations> {
    let mut out = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let path = format!("blocks[{i}]");
        match serde_json::to_value(block) {
            Ok(value) => check_shape(&value, &path, IMPORTED_BLOCK, &mut out),
            Err(e) => push(&mut out, &path, e.to_string()),
        }
    }
    if out.is_empty() {
        Ok(())
    } else {
        Err(Violations(out))
    }
}

fn convert<T: DeserializeOwned>(value: &Value) -> Result<T, Violations> {
    serde_json::from_value(without_nulls(value)).map_err(|e| {
        Violations(vec![Violation {
            path: String::new(),
            message: e.to_string(),
        }])
    })
}

/// Copy of `value` with every `null` object member removed, so serde applies
/// field defaults instead of rejecting the null.
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}

fn has_text(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(has_text),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_modules() -> Value {
        json!({
            "vocabulary": {},
            "grammar": {},
            "listening_pronunciation": {},
            "culture_context": {},
            "practice": {}
        })
    }

    #[test]
    fn test_analysis_defaults_fill_missing_lists() {
        let parsed = validate_analysis(&json!({ "modules": minimal_modules() })).unwrap();
        assert!(parsed.modules.vocabulary.core.is_empty());
        assert!(parsed.modules.practice.speaking_prompts.is_empty());
        assert_eq!(parsed.summary_markdown, "");
        assert_eq!(parsed.block_index, None);
    }

    #[test]
    fn test_analysis_rejects_unknown_properties() {
        let mut modules = minimal_modules();
        modules["grammar"]["tense_table"] = json!([]);
        let err = validate_analysis(&json!({ "modules": modules, "confidence": 0.9 }))
            .unwrap_err();
        let paths = err.paths();
        assert!(paths.contains(&"modules.grammar.tense_table"));
        assert!(paths.contains(&"confidence"));
    }

    #[test]
    fn test_analysis_reports_nested_paths() {
        let mut modules = minimal_modules();
        modules["vocabulary"]["core"] = json!([
            { "term": "defiance" },
            { "term": "", "exam_tags": ["CET-6", 4] },
            { "phonetic": "x", "subtitle_example": { "translation": "t" } }
        ]);
        let err = validate_analysis(&json!({ "modules": modules })).unwrap_err();
        let paths = err.paths();
        assert!(paths.contains(&"modules.vocabulary.core[1].term"));
        assert!(paths.contains(&"modules.vocabulary.core[1].exam_tags[1]"));
        assert!(paths.contains(&"modules.vocabulary.core[2].term"));
        assert!(paths.contains(&"modules.vocabulary.core[2].subtitle_example.sentence"));
        assert_eq!(err.len(), 4);
    }

    #[test]
    fn test_analysis_requires_every_module() {
        let err = validate_analysis(&json!({ "modules": { "vocabulary": {} } })).unwrap_err();
        assert_eq!(err.len(), 4);
        assert!(err.to_string().contains("modules.practice: required"));
    }

    #[test]
    fn test_analysis_null_optional_is_absent() {
        let mut modules = minimal_modules();
        modules["listening_pronunciation"]["keyword_pronunciations"] =
            json!([{ "term": "regroup", "ipa": null }]);
        let parsed = validate_analysis(&json!({ "modules": modules })).unwrap();
        assert_eq!(
            parsed.modules.listening_pronunciation.keyword_pronunciations[0].ipa,
            ""
        );
    }

    fn scenario_value() -> Value {
        json!({
            "subtitle_title": "t",
            "segmentation_strategy": "s",
            "total_blocks": 1,
            "blocks": [{
                "block_index": 1,
                "block_name": "b",
                "synopsis": "syn",
                "start_line": 1,
                "end_line": 2,
                "extra_field": "ignored",
                "dialogues": [{ "order": 1, "text": "Hi" }]
            }]
        })
    }

    #[test]
    fn test_segmentation_ignores_unknown_properties() {
        let parsed = validate_segmentation(&scenario_value(), true).unwrap();
        assert_eq!(parsed.blocks[0].dialogues[0].text, "Hi");
    }

    #[test]
    fn test_segmentation_collects_violations() {
        let mut value = scenario_value();
        value["total_blocks"] = json!(0);
        value["blocks"][0]["dialogues"] = json!([]);
        value["blocks"][0]["block_index"] = json!("one");
        let err = validate_segmentation(&value, false).unwrap_err();
        let paths = err.paths();
        assert!(paths.contains(&"total_blocks"));
        assert!(paths.contains(&"blocks[0].dialogues"));
        assert!(paths.contains(&"blocks[0].block_index"));
    }

    #[test]
    fn test_segmentation_focus_content_rule() {
        let mut value = scenario_value();
        value["blocks"][0]["learning_focus"] = json!({});
        assert!(validate_segmentation(&value, false).is_ok());
        let err = validate_segmentation(&value, true).unwrap_err();
        assert_eq!(err.paths(), vec!["blocks[0].learning_focus"]);
    }

    #[test]
    fn test_imported_focus_allows_blank_fields() {
        let mut value = scenario_value();
        value["blocks"][0]["learning_focus"] = json!({ "vocabulary": "", "grammar": "past tense" });

        let parsed = validate_segmentation(&value, true).unwrap();
        let focus = parsed.blocks[0].learning_focus.as_ref().unwrap();
        assert_eq!(focus.grammar.as_deref(), Some("past tense"));

        let err = validate_segmentation(&value, false).unwrap_err();
        assert_eq!(err.paths(), vec!["blocks[0].learning_focus.vocabulary"]);

        value["blocks"][0]["learning_focus"] = json!({ "vocabulary": "", "grammar": [" "] });
        let err = validate_segmentation(&value, true).unwrap_err();
        assert_eq!(err.paths(), vec!["blocks[0].learning_focus"]);
    }

    #[test]
    fn test_segmentation_rejects_non_object_root() {
        let err = validate_segmentation(&json!([1, 2]), false).unwrap_err();
        assert_eq!(err.0[0].path, "");
        assert!(err.0[0].message.contains("expected object"));
    }
}
