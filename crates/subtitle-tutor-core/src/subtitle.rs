//! Subtitle line parser.
//!
//! Accepts SRT-style cue blocks (`index`, `start --> end`, text), plain
//! `Speaker: text` dialogue, or bare text lines, and produces an ordered list
//! of [`DialogueLine`]s. `order` is the 1-based count of accepted lines, not
//! the source line number.
//!
//! A blank line ends a cue, so a pending timestamp never leaks into the next
//! cue.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::DialogueLine;

/// Longest derived title before truncation.
const TITLE_MAX_CHARS: usize = 48;

fn speaker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(?P<speaker>[\p{L}\p{N} .,'"()\-]{1,40}):\s*(?P<text>.+)$"#)
            .expect("speaker pattern is a valid regex")
    })
}

fn is_cue_index(line: &str) -> bool {
    (1..=4).contains(&line.len()) && line.bytes().all(|b| b.is_ascii_digit())
}

/// Parse raw subtitle text into dialogue lines.
///
/// Returns an empty vector when nothing usable is found; callers treat that
/// as "no transcript".
pub fn parse_subtitle(raw: &str) -> Vec<DialogueLine> {
    let normalized = raw.replace("\r\n", "\n");
    let mut parsed: Vec<DialogueLine> = Vec::new();
    let mut pending_timestamp: Option<String> = None;

    for line in normalized.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            pending_timestamp = None;
            continue;
        }

        if is_cue_index(trimmed) {
            continue;
        }

        if trimmed.contains("-->") {
            pending_timestamp = Some(trimmed.to_string());
            continue;
        }

        let (speaker, text) = match speaker_pattern().captures(trimmed) {
            Some(caps) => {
                let speaker = caps["speaker"].trim().to_string();
                let text = caps["text"].trim().to_string();
                (Some(speaker).filter(|s| !s.is_empty()), text)
            }
            None => (None, trimmed.to_string()),
        };

        if text.is_empty() {
            continue;
        }

        parsed.push(DialogueLine {
            order: parsed.len() as u32 + 1,
            speaker,
            text,
            emotion: None,
            timestamp: pending_timestamp.clone(),
        });
    }

    parsed
}

/// Derive a display title from the first non-empty dialogue text.
pub fn derive_title(lines: &[DialogueLine]) -> Option<String> {
    let first = lines.iter().find(|l| !l.text.is_empty())?;
    if first.text.chars().count() > TITLE_MAX_CHARS {
        let head: String = first.text.chars().take(TITLE_MAX_CHARS).collect();
        Some(format!("{head}…"))
    } else {
        Some(first.text.clone())
    }
}

/// Render lines as a numbered transcript: `"{order}. [{timestamp}] {speaker}: {text}"`.
pub fn render_transcript(lines: &[DialogueLine]) -> String {
    lines
        .iter()
        .map(|line| {
            let mut segments: Vec<String> = Vec::with_capacity(3);
            if let Some(ts) = &line.timestamp {
                segments.push(format!("[{ts}]"));
            }
            if let Some(speaker) = &line.speaker {
                segments.push(format!("{speaker}:"));
            }
            segments.push(line.text.clone());
            format!("{}. {}", line.order, segments.join(" ").trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT: &str = "1\n00:00:01 --> 00:00:03\nRick: Hello there.\n\n2\n00:00:03 --> 00:00:05\nBeth: Hi!\n";

    #[test]
    fn test_parse_srt_cues() {
        let lines = parse_subtitle(SRT);
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0].order, 1);
        assert_eq!(lines[0].speaker.as_deref(), Some("Rick"));
        assert_eq!(lines[0].text, "Hello there.");
        assert_eq!(lines[0].timestamp.as_deref(), Some("00:00:01 --> 00:00:03"));

        assert_eq!(lines[1].order, 2);
        assert_eq!(lines[1].speaker.as_deref(), Some("Beth"));
        assert_eq!(lines[1].text, "Hi!");
        assert_eq!(lines[1].timestamp.as_deref(), Some("00:00:03 --> 00:00:05"));
    }

    #[test]
    fn test_parse_plain_text_without_speaker() {
        let lines = parse_subtitle("Where are we going?\nNowhere fast.");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].speaker, None);
        assert_eq!(lines[1].text, "Nowhere fast.");
        assert_eq!(lines[1].timestamp, None);
    }

    #[test]
    fn test_blank_line_resets_timestamp() {
        let lines = parse_subtitle("00:00:01 --> 00:00:02\nA: one\nB: two\n\n\n\nC: three");
        assert_eq!(lines.len(), 3);
        assert!(lines[0].timestamp.is_some());
        // Carry-over lasts until the cue ends.
        assert_eq!(lines[1].timestamp, lines[0].timestamp);
        assert_eq!(lines[2].timestamp, None);
        assert_eq!(lines[2].order, 3);
    }

    #[test]
    fn test_speaker_too_long_is_plain_text() {
        let long = "x".repeat(41);
        let lines = parse_subtitle(&format!("{long}: hello"));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].speaker, None);
        assert_eq!(lines[0].text, format!("{long}: hello"));
    }

    #[test]
    fn test_speaker_with_punctuation() {
        let lines = parse_subtitle("Dr. O'Neil (voice): Stay calm.\r\nMr-Smith: Fine.");
        assert_eq!(lines[0].speaker.as_deref(), Some("Dr. O'Neil (voice)"));
        assert_eq!(lines[0].text, "Stay calm.");
        assert_eq!(lines[1].speaker.as_deref(), Some("Mr-Smith"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_subtitle("").is_empty());
        assert!(parse_subtitle("1\n2\n\n00:00:01 --> 00:00:02\n").is_empty());
    }

    #[test]
    fn test_derive_title_truncates() {
        let text = "a".repeat(60);
        let lines = vec![DialogueLine::new(1, None, &text)];
        let title = derive_title(&lines).unwrap();
        assert_eq!(title.chars().count(), 49);
        assert!(title.ends_with('…'));

        let short = vec![DialogueLine::new(1, None, "Hello")];
        assert_eq!(derive_title(&short).as_deref(), Some("Hello"));
        assert_eq!(derive_title(&[]), None);
    }

    #[test]
    fn test_render_transcript() {
        let lines = parse_subtitle(SRT);
        let rendered = render_transcript(&lines);
        assert_eq!(
            rendered,
            "1. [00:00:01 --> 00:00:03] Rick: Hello there.\n2. [00:00:03 --> 00:00:05] Beth: Hi!"
        );

        let bare = render_transcript(&[DialogueLine::new(7, None, "Just text")]);
        assert_eq!(bare, "7. Just text");
    }
}
