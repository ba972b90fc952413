//! Scenario normalization, serialization, and import validation.
//!
//! [`normalize`] is the single canonical form every other path funnels
//! through: model output, JSON imports, notes front matter, and exports.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{LearningFocus, ScenarioBlock, ScenarioSegmentation};
use crate::schema;

/// Title slug used when the scenario title has no usable characters.
const FALLBACK_FILENAME_STEM: &str = "scenario-segmentation";

/// Produce the canonical form of a scenario.
///
/// Blank dialogue lines are dropped, then blocks left without dialogue.
/// Dialogues are sorted by `order`, blocks by `block_index` (both stable),
/// `total_blocks` is recomputed, and empty optional fields are removed.
/// Idempotent.
pub fn normalize(scenario: &ScenarioSegmentation) -> ScenarioSegmentation {
    let mut blocks: Vec<ScenarioBlock> = scenario
        .blocks
        .iter()
        .map(normalize_block)
        .filter(|b| !b.dialogues.is_empty())
        .collect();
    blocks.sort_by_key(|b| b.block_index);

    ScenarioSegmentation {
        subtitle_title: scenario.subtitle_title.clone(),
        segmentation_strategy: scenario.segmentation_strategy.clone(),
        total_blocks: blocks.len() as u32,
        blocks,
    }
}

fn normalize_block(block: &ScenarioBlock) -> ScenarioBlock {
    let mut dialogues: Vec<_> = block
        .dialogues
        .iter()
        .filter(|line| !line.text.trim().is_empty())
        .cloned()
        .collect();
    dialogues.sort_by_key(|line| line.order);

    ScenarioBlock {
        block_index: block.block_index,
        block_name: block.block_name.clone(),
        synopsis: block.synopsis.clone(),
        start_line: block.start_line,
        end_line: block.end_line,
        context_tags: block.context_tags.clone(),
        exam_alignment: block.exam_alignment.clone(),
        difficulty: block
            .difficulty
            .clone()
            .filter(|d| !d.trim().is_empty()),
        learning_focus: block.learning_focus.as_ref().and_then(normalize_focus),
        dialogues,
        follow_up_tasks: block.follow_up_tasks.clone(),
    }
}

fn normalize_focus(focus: &LearningFocus) -> Option<LearningFocus> {
    let keep = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
    let out = LearningFocus {
        vocabulary: keep(&focus.vocabulary),
        grammar: keep(&focus.grammar),
        listening: keep(&focus.listening),
        culture: keep(&focus.culture),
    };
    out.fields().iter().any(|(_, v)| v.is_some()).then_some(out)
}

/// Normalize and encode as JSON; `pretty` uses two-space indentation.
pub fn serialize(scenario: &ScenarioSegmentation, pretty: bool) -> Result<String> {
    let normalized = normalize(scenario);
    let encoded = if pretty {
        serde_json::to_string_pretty(&normalized)
    } else {
        serde_json::to_string(&normalized)
    };
    encoded.map_err(|e| Error::validation(format!("failed to encode scenario: {e}")))
}

/// Parse JSON text, validate it as a scenario, and normalize it.
pub fn deserialize(json: &str) -> Result<ScenarioSegmentation> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::validation(format!("scenario is not valid JSON: {e}")))?;
    parse_value(&value)
}

/// Validate an already-parsed value as a scenario and normalize it.
pub fn parse_value(value: &Value) -> Result<ScenarioSegmentation> {
    let scenario = schema::validate_segmentation(value, true)
        .map_err(|violations| Error::validation(format!("invalid scenario: {violations}")))?;
    let normalized = normalize(&scenario);
    if normalized.blocks.is_empty() {
        return Err(Error::validation(
            "invalid scenario: no block has a non-blank dialogue line",
        ));
    }
    Ok(normalized)
}

/// Like [`parse_value`], but yields `None` instead of an error.
pub fn safe_parse(value: &Value) -> Option<ScenarioSegmentation> {
    parse_value(value).ok()
}

/// Check line ranges: `start_line <= end_line` and every dialogue `order`
/// within `[start_line, end_line]`.
///
/// Not part of the default schema; model output regularly bends it.
pub fn validate_line_ranges(scenario: &ScenarioSegmentation) -> Result<()> {
    let mut problems = Vec::new();
    for block in &scenario.blocks {
        if block.start_line > block.end_line {
            problems.push(format!(
                "block {}: start_line {} is after end_line {}",
                block.block_index, block.start_line, block.end_line
            ));
            continue;
        }
        for line in &block.dialogues {
            if line.order < block.start_line || line.order > block.end_line {
                problems.push(format!(
                    "block {}: dialogue order {} outside {}-{}",
                    block.block_index, line.order, block.start_line, block.end_line
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(problems.join("; ")))
    }
}

/// Download filename for an exported scenario: a lowercase slug of the title
/// followed by the export time in unix milliseconds.
pub fn export_filename(title: &str, now: DateTime<Utc>) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_space = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            slug.push(c.to_ascii_lowercase());
        }
    }

    let stem = if slug.trim_matches('-').is_empty() {
        FALLBACK_FILENAME_STEM
    } else {
        slug.as_str()
    };
    format!("{stem}-{}.json", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DialogueLine;
    use chrono::TimeZone;
    use serde_json::json;

    fn block(index: u32, start: u32, end: u32, orders: &[(u32, &str)]) -> ScenarioBlock {
        ScenarioBlock {
            block_index: index,
            block_name: format!("Block {index}"),
            synopsis: "synopsis".to_string(),
            start_line: start,
            end_line: end,
            context_tags: vec![],
            exam_alignment: vec![],
            difficulty: None,
            learning_focus: None,
            dialogues: orders
                .iter()
                .map(|(order, text)| DialogueLine::new(*order, Some("Lee"), text))
                .collect(),
            follow_up_tasks: vec![],
        }
    }

    fn messy() -> ScenarioSegmentation {
        ScenarioSegmentation {
            subtitle_title: "测试字幕".to_string(),
            segmentation_strategy: "按话题聚类".to_string(),
            total_blocks: 5,
            blocks: vec![
                block(2, 11, 18, &[(18, "send it tomorrow"), (17, "capture it"), (19, "   ")]),
                block(1, 1, 10, &[(3, "third"), (1, "first"), (2, "second")]),
            ],
        }
    }

    #[test]
    fn test_normalize_orders_and_counts() {
        let normalized = normalize(&messy());
        assert_eq!(normalized.total_blocks, 2);
        let indexes: Vec<u32> = normalized.blocks.iter().map(|b| b.block_index).collect();
        assert_eq!(indexes, vec![1, 2]);
        let orders: Vec<u32> = normalized.blocks[0].dialogues.iter().map(|d| d.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        let orders: Vec<u32> = normalized.blocks[1].dialogues.iter().map(|d| d.order).collect();
        assert_eq!(orders, vec![17, 18]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(&messy());
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_normalize_drops_empty_optionals() {
        let mut scenario = messy();
        scenario.blocks[0].difficulty = Some("  ".to_string());
        scenario.blocks[0].learning_focus = Some(LearningFocus {
            vocabulary: Some(" ".to_string()),
            ..Default::default()
        });
        scenario.blocks[1].learning_focus = Some(LearningFocus {
            grammar: Some("past perfect".to_string()),
            culture: Some(String::new()),
            ..Default::default()
        });

        let normalized = normalize(&scenario);
        let second = &normalized.blocks[1];
        assert_eq!(second.difficulty, None);
        assert_eq!(second.learning_focus, None);

        let first = normalized.blocks[0].learning_focus.as_ref().unwrap();
        assert_eq!(first.grammar.as_deref(), Some("past perfect"));
        assert_eq!(first.culture, None);
    }

    #[test]
    fn test_normalize_drops_blocks_without_dialogue() {
        let mut scenario = messy();
        scenario.blocks.push(block(3, 19, 20, &[(19, "   "), (20, "\t")]));

        let normalized = normalize(&scenario);
        assert_eq!(normalized.total_blocks, 2);
        assert!(normalized.blocks.iter().all(|b| !b.dialogues.is_empty()));

        let payload = serialize(&scenario, false).unwrap();
        assert_eq!(deserialize(&payload).unwrap(), normalized);
        let value = serde_json::to_value(&scenario).unwrap();
        assert_eq!(parse_value(&value).unwrap(), normalized);
    }

    #[test]
    fn test_parse_value_rejects_all_blank_dialogue() {
        let mut value = serde_json::to_value(normalize(&messy())).unwrap();
        for block in value["blocks"].as_array_mut().unwrap() {
            block["dialogues"] = json!([{ "order": 1, "text": "  " }]);
        }
        let err = parse_value(&value).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("non-blank dialogue"));
    }

    #[test]
    fn test_serialize_round_trip() {
        let normalized = normalize(&messy());
        let payload = serialize(&normalized, true).unwrap();
        assert!(payload.contains("\n  \"subtitle_title\""));
        assert_eq!(deserialize(&payload).unwrap(), normalized);

        let compact = serialize(&messy(), false).unwrap();
        assert!(!compact.contains('\n'));
        assert_eq!(deserialize(&compact).unwrap(), normalized);
    }

    #[test]
    fn test_deserialize_rejects_bad_json() {
        let err = deserialize("{ not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_deserialize_reports_violations() {
        let err = deserialize(r#"{"subtitle_title": "", "segmentation_strategy": "s", "total_blocks": 1, "blocks": []}"#)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("subtitle_title"));
        assert!(message.contains("blocks"));
    }

    #[test]
    fn test_parse_value_corrects_total_blocks() {
        let value = json!({
            "subtitle_title": "Rick and Morty",
            "segmentation_strategy": "by scene",
            "total_blocks": 7,
            "blocks": [{
                "block_index": 1,
                "block_name": "Opening",
                "synopsis": "Rick greets Beth.",
                "start_line": 1,
                "end_line": 2,
                "learning_focus": { "listening": ["linking", "stress"] },
                "dialogues": [
                    { "order": 2, "speaker": "Beth", "text": "Hi!" },
                    { "order": 1, "speaker": "Rick", "text": "Hello there." }
                ]
            }]
        });
        let scenario = parse_value(&value).unwrap();
        assert_eq!(scenario.total_blocks, 1);
        assert_eq!(scenario.blocks[0].dialogues[0].speaker.as_deref(), Some("Rick"));
        assert_eq!(
            scenario.blocks[0].learning_focus.as_ref().unwrap().listening.as_deref(),
            Some("linking；stress")
        );
    }

    #[test]
    fn test_safe_parse_returns_none_on_invalid() {
        assert!(safe_parse(&json!({ "subtitle_title": "x" })).is_none());
        assert!(safe_parse(&json!("text")).is_none());
        let valid = serde_json::to_value(normalize(&messy())).unwrap();
        assert!(safe_parse(&valid).is_some());
    }

    #[test]
    fn test_validate_line_ranges() {
        let normalized = normalize(&messy());
        assert!(validate_line_ranges(&normalized).is_ok());

        let mut broken = normalized.clone();
        broken.blocks[0].dialogues[0].order = 42;
        broken.blocks[1].start_line = 30;
        let message = validate_line_ranges(&broken).unwrap_err().to_string();
        assert!(message.contains("dialogue order 42 outside 1-10"));
        assert!(message.contains("start_line 30 is after end_line 18"));
    }

    #[test]
    fn test_export_filename() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            export_filename("Rick and  Morty S01!", now),
            "rick-and-morty-s01-1700000000123.json"
        );
        assert_eq!(
            export_filename("测试字幕", now),
            "scenario-segmentation-1700000000123.json"
        );
    }
}
