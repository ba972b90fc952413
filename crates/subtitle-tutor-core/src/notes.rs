//! Notes markdown codec.
//!
//! Exports a scenario with its per-block analyses and user notes as one
//! markdown document, and reads such documents back. The document has two
//! halves:
//!
//! - a YAML front matter block holding the machine-readable data (block
//!   summaries, the normalized scenario, the notes, the template tag),
//! - a human-readable body with one section per block, separated by `---`.
//!
//! Import trusts the front matter for the scenario and notes and recovers the
//! analysis markdown from the body. Bad notes are filtered out rather than
//! failing the import.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{NoteItem, ScenarioSegmentation};
use crate::scenario::{normalize, safe_parse};

pub const EXPORT_HEADING: &str = "# 字幕学习笔记导出";
pub const DEFAULT_IMPORT_TITLE: &str = "Imported Subtitle";
pub const DEFAULT_NOTE_TITLE: &str = "未命名笔记";
pub const MISSING_CONTENT: &str = "空内容（导入时缺失）";

const NO_ANALYSIS: &str = "_尚未生成学习分析_";
const NO_NOTES: &str = "_暂无笔记_";
const ANALYSIS_HEADINGS: [&str; 2] = ["### 学习分析", "### Analysis"];
const NOTES_HEADINGS: [&str; 2] = ["### 笔记", "### Notes"];
const SECTION_SEPARATOR: &str = "\n\n---\n\n";
const CONCISE_MAX_CHARS: usize = 120;

/// How notes are laid out in the exported body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportTemplate {
    /// One `### Note` sub-section per note with full content.
    #[default]
    Standard,
    /// One truncated bullet per note.
    Concise,
}

impl fmt::Display for ExportTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportTemplate::Standard => f.write_str("standard"),
            ExportTemplate::Concise => f.write_str("concise"),
        }
    }
}

impl FromStr for ExportTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(ExportTemplate::Standard),
            "concise" => Ok(ExportTemplate::Concise),
            other => Err(Error::validation(format!(
                "unknown export template '{other}' (expected standard or concise)"
            ))),
        }
    }
}

/// Everything that goes into one exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub scenario: ScenarioSegmentation,
    /// Analysis markdown keyed by `block_index`.
    #[serde(default)]
    pub analyses: BTreeMap<u32, String>,
    #[serde(default)]
    pub notes: Vec<NoteItem>,
    #[serde(default)]
    pub template: ExportTemplate,
}

/// What an import recovers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub subtitle_title: String,
    pub analyses: BTreeMap<u32, String>,
    pub notes: Vec<NoteItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioSegmentation>,
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    subtitle_title: &'a str,
    segmentation_strategy: &'a str,
    total_blocks: u32,
    blocks: Vec<BlockSummary<'a>>,
    scenario: &'a ScenarioSegmentation,
    notes: Vec<FrontMatterNote<'a>>,
    template: ExportTemplate,
}

#[derive(Serialize)]
struct BlockSummary<'a> {
    block_index: u32,
    block_name: &'a str,
    synopsis: &'a str,
    start_line: u32,
    end_line: u32,
}

#[derive(Serialize)]
struct FrontMatterNote<'a> {
    block_index: u32,
    order: u32,
    title: &'a str,
    content: &'a str,
    #[serde(rename = "createdAt")]
    created_at: &'a str,
    #[serde(rename = "updatedAt")]
    updated_at: &'a str,
}

/// RFC 3339 timestamp with millisecond precision, as stored on notes.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A new note with a fresh id, `createdAt == updatedAt == now`.
pub fn create_empty_note(
    block_index: u32,
    order: u32,
    title: Option<&str>,
    content: Option<&str>,
) -> NoteItem {
    let now = timestamp(Utc::now());
    NoteItem {
        id: Uuid::new_v4().to_string(),
        block_index,
        order,
        title: title.unwrap_or(DEFAULT_NOTE_TITLE).to_string(),
        content: content.unwrap_or_default().to_string(),
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Render the export document. The scenario is normalized first.
pub fn export_markdown(request: &ExportRequest, generated_at: DateTime<Utc>) -> Result<String> {
    let scenario = normalize(&request.scenario);

    let front = FrontMatter {
        subtitle_title: &scenario.subtitle_title,
        segmentation_strategy: &scenario.segmentation_strategy,
        total_blocks: scenario.total_blocks,
        blocks: scenario
            .blocks
            .iter()
            .map(|b| BlockSummary {
                block_index: b.block_index,
                block_name: &b.block_name,
                synopsis: &b.synopsis,
                start_line: b.start_line,
                end_line: b.end_line,
            })
            .collect(),
        scenario: &scenario,
        notes: request
            .notes
            .iter()
            .map(|n| FrontMatterNote {
                block_index: n.block_index,
                order: n.order,
                title: &n.title,
                content: &n.content,
                created_at: &n.created_at,
                updated_at: &n.updated_at,
            })
            .collect(),
        template: request.template,
    };
    let yaml = serde_yaml::to_string(&front)
        .map_err(|e| Error::validation(format!("failed to encode front matter: {e}")))?;

    let sections: Vec<String> = scenario
        .blocks
        .iter()
        .map(|block| {
            let analysis = request
                .analyses
                .get(&block.block_index)
                .map(String::as_str)
                .unwrap_or(NO_ANALYSIS);
            let related: Vec<&NoteItem> = request
                .notes
                .iter()
                .filter(|n| n.block_index == block.block_index)
                .collect();

            [
                format!("## Block {} · {}", block.block_index, block.block_name),
                format!("> 行号：{}-{}", block.start_line, block.end_line),
                format!("> 概要：{}", block.synopsis),
                String::new(),
                ANALYSIS_HEADINGS[0].to_string(),
                analysis.to_string(),
                String::new(),
                NOTES_HEADINGS[0].to_string(),
                render_notes(&related, request.template),
            ]
            .join("\n")
        })
        .collect();

    debug!(
        blocks = sections.len(),
        notes = request.notes.len(),
        template = %request.template,
        "exported notes markdown"
    );

    Ok(format!(
        "---\n{yaml}---\n{EXPORT_HEADING}\n\n生成时间：{}\n\n{}\n",
        timestamp(generated_at),
        sections.join(SECTION_SEPARATOR)
    ))
}

fn render_notes(notes: &[&NoteItem], template: ExportTemplate) -> String {
    if notes.is_empty() {
        return NO_NOTES.to_string();
    }
    match template {
        ExportTemplate::Standard => notes
            .iter()
            .enumerate()
            .map(|(i, note)| {
                format!(
                    "### Note {}: {}\n\n- 行号：{}\n- 更新时间：{}\n\n{}\n",
                    i + 1,
                    note.title,
                    note.order,
                    note.updated_at,
                    note.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ExportTemplate::Concise => notes
            .iter()
            .map(|note| {
                format!(
                    "- 行号 {}｜{}｜{}",
                    note.order,
                    note.title,
                    truncate(&note.content, CONCISE_MAX_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}…")
    }
}

/// Read an exported document back.
pub fn import_markdown(markdown: &str) -> ImportResult {
    import_markdown_at(markdown, Utc::now())
}

/// [`import_markdown`] with an explicit time for notes missing timestamps.
pub fn import_markdown_at(markdown: &str, now: DateTime<Utc>) -> ImportResult {
    let text = markdown.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let (front, body) = split_front_matter(&text);
    let data = front.map(parse_front_matter).unwrap_or(Value::Null);

    let subtitle_title = data
        .get("subtitle_title")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_IMPORT_TITLE)
        .to_string();
    let scenario = data.get("scenario").and_then(safe_parse);
    let analyses = extract_analyses(body);

    let now = timestamp(now);
    let notes: Vec<NoteItem> = data
        .get("notes")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|item| import_note(item, &now)).collect())
        .unwrap_or_default();

    debug!(
        analyses = analyses.len(),
        notes = notes.len(),
        has_scenario = scenario.is_some(),
        "imported notes markdown"
    );

    ImportResult {
        subtitle_title,
        analyses,
        notes,
        scenario,
    }
}

/// Split `---\n<yaml>\n---\n<body>`. Without an opening fence the whole text
/// is body.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text.strip_prefix("---\n") else {
        return (None, text);
    };
    if let Some(body) = rest.strip_prefix("---\n") {
        return (Some(""), body);
    }
    match rest.find("\n---\n") {
        Some(end) => (Some(&rest[..end]), &rest[end + 5..]),
        None => match rest.strip_suffix("\n---") {
            Some(front) => (Some(front), ""),
            None => (None, text),
        },
    }
}

fn parse_front_matter(yaml: &str) -> Value {
    if yaml.trim().is_empty() {
        return Value::Null;
    }
    let parsed: serde_yaml::Value = match serde_yaml::from_str(yaml) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "ignoring unparsable front matter");
            return Value::Null;
        }
    };
    match serde_json::to_value(parsed) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => Value::Null,
        Err(e) => {
            warn!(error = %e, "ignoring front matter that does not map to JSON");
            Value::Null
        }
    }
}

fn block_heading() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^## Block (\d+)").expect("block heading pattern is a valid regex")
    })
}

/// Sections begin at `## Block n` headings rather than at the `---`
/// separators, so analysis markdown may carry its own horizontal rules.
fn extract_analyses(body: &str) -> BTreeMap<u32, String> {
    let mut sections: Vec<(u32, Vec<&str>)> = Vec::new();
    for line in body.lines() {
        let heading = block_heading()
            .captures(line.trim())
            .and_then(|caps| caps[1].parse::<u32>().ok());
        if let Some(block_index) = heading {
            sections.push((block_index, Vec::new()));
        } else if let Some((_, lines)) = sections.last_mut() {
            lines.push(line);
        }
    }

    let mut analyses = BTreeMap::new();
    for (block_index, lines) in sections {
        let Some(start) = lines
            .iter()
            .position(|line| is_heading(line, &ANALYSIS_HEADINGS))
        else {
            continue;
        };
        let mut end = lines[start + 1..]
            .iter()
            .position(|line| is_heading(line, &NOTES_HEADINGS))
            .map_or(lines.len(), |offset| start + 1 + offset);
        // Without a notes heading the section runs into the next separator.
        while end > start + 1 && matches!(lines[end - 1].trim(), "" | "---") {
            end -= 1;
        }

        let markdown = lines[start + 1..end].join("\n").trim().to_string();
        if !markdown.is_empty() {
            analyses.insert(block_index, markdown);
        }
    }

    analyses
}

fn is_heading(line: &str, headings: &[&str]) -> bool {
    let line = line.trim();
    headings.iter().any(|h| line.starts_with(h))
}

fn import_note(item: &Value, now: &str) -> Option<NoteItem> {
    let block_index = positive_int(item.get("block_index"))?;
    let order = positive_int(item.get("order"))?;

    let text = |key: &str| -> Option<String> {
        match item.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    };

    let content = text("content").unwrap_or_else(|| MISSING_CONTENT.to_string());
    if content.is_empty() {
        return None;
    }
    let stamp = |key: &str| text(key).filter(|s| !s.is_empty()).unwrap_or_else(|| now.to_string());

    Some(NoteItem {
        id: Uuid::new_v4().to_string(),
        block_index,
        order,
        title: text("title").unwrap_or_else(|| DEFAULT_NOTE_TITLE.to_string()),
        content,
        created_at: stamp("createdAt"),
        updated_at: stamp("updatedAt"),
    })
}

fn positive_int(value: Option<&Value>) -> Option<u32> {
    let n = match value? {
        Value::Number(n) => match n.as_u64() {
            Some(n) => n,
            None => {
                let f = n.as_f64()?;
                if f < 1.0 || f.fract() != 0.0 {
                    return None;
                }
                f as u64
            }
        },
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|n| *n >= 1)
}
