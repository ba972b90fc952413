//! JSON extraction and repair for raw model responses.
//!
//! Models asked for "JSON only" still wrap it in code fences, prepend prose,
//! leave trailing commas, or get cut off mid-object by the token limit.
//! [`extract_json`] runs a fixed cascade:
//!
//! 1. Trim; blank text is an [`Error::EmptyResponse`].
//! 2. Strip a surrounding ```` ```lang ```` fence.
//! 3. Optionally narrow to the outermost `{ … }` span.
//! 4. Strict `serde_json` parse.
//! 5. On failure, [`repair_json`] and parse again.
//! 6. Otherwise [`Error::UnparsableResponse`] carrying the original text.
//!
//! Everything here is pure and synchronous.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Options for [`extract_json`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Slice the text from the first `{` to the last `}` before parsing.
    pub narrow_to_braces: bool,
}

impl ExtractOptions {
    /// Options used for segmentation responses.
    pub const NARROWED: ExtractOptions = ExtractOptions {
        narrow_to_braces: true,
    };
}

/// Extract a JSON value from raw model text.
pub fn extract_json(raw: &str, options: ExtractOptions) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyResponse);
    }

    let mut candidate = strip_code_fence(trimmed);
    if options.narrow_to_braces {
        candidate = narrow_to_braces(candidate);
    }

    let strict_err = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(repaired) = repair_json(candidate) {
        match serde_json::from_str::<Value>(&repaired) {
            Ok(value) => {
                debug!(
                    original_len = candidate.len(),
                    repaired_len = repaired.len(),
                    "model response parsed after repair"
                );
                return Ok(value);
            }
            Err(e) => debug!(error = %e, "repaired model response still unparsable"),
        }
    }

    Err(Error::UnparsableResponse {
        reason: strict_err.to_string(),
        raw: raw.to_string(),
    })
}

/// Remove a leading ```` ``` ```` fence (with optional language tag) and a
/// trailing ```` ``` ````. Text without a leading fence is returned as is.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let rest = rest.trim_start();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Slice from the first `{` to the last `}` when both exist in that order.
pub fn narrow_to_braces(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(first), Some(last)) if first < last => &text[first..=last],
        _ => text,
    }
}

/// Tolerant repair of almost-JSON.
///
/// Handles `//` and `/* */` comments, single-quoted strings, bare keys and
/// words, Python literals, trailing and missing commas, raw control
/// characters inside strings, and truncation (unterminated string, dangling
/// `,` or `:`, unclosed brackets).
///
/// Returns `None` when the text has no object or array structure at all.
pub fn repair_json(input: &str) -> Option<String> {
    if !input.contains('{') && !input.contains('[') {
        return None;
    }

    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut closers: Vec<char> = Vec::new();
    // True right after a complete value or key; a following value needs a comma.
    let mut after_value = false;
    // True when the most recent complete token is an object key awaiting ':'.
    let mut pending_key = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            '"' | '\'' => {
                let is_key = expects_key(&out, &closers, after_value);
                if after_value {
                    insert_comma(&mut out);
                }
                let (literal, next, terminated) = read_string(&chars, i);
                out.push_str(&literal);
                i = next;
                after_value = true;
                pending_key = is_key;
                if !terminated {
                    break;
                }
            }
            '{' | '[' => {
                if after_value {
                    insert_comma(&mut out);
                }
                out.push(c);
                closers.push(if c == '{' { '}' } else { ']' });
                after_value = false;
                pending_key = false;
                i += 1;
            }
            '}' | ']' => {
                if closers.contains(&c) {
                    drop_trailing_comma(&mut out);
                    if pending_key {
                        out.push_str(":null");
                    }
                    while let Some(closer) = closers.pop() {
                        out.push(closer);
                        if closer == c {
                            break;
                        }
                    }
                    after_value = true;
                    pending_key = false;
                }
                i += 1;
            }
            ',' => {
                drop_trailing_comma(&mut out);
                if pending_key {
                    out.push_str(":null");
                }
                out.push(',');
                after_value = false;
                pending_key = false;
                i += 1;
            }
            ':' => {
                out.push(':');
                after_value = false;
                pending_key = false;
                i += 1;
            }
            _ if is_bare_char(c) => {
                let start = i;
                while i < chars.len() && is_bare_char(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                let is_key = expects_key(&out, &closers, after_value);
                if after_value {
                    insert_comma(&mut out);
                }
                out.push_str(&bare_token(&token, is_key));
                after_value = true;
                pending_key = is_key;
            }
            _ => {
                // Stray punctuation outside strings has no JSON meaning.
                i += 1;
            }
        }
    }

    // Truncated input: settle whatever was left open.
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    } else if pending_key {
        out.push_str(":null");
    }
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }

    Some(out)
}

fn is_bare_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | '+' | '.')
}

/// Whether the next token sits in key position of an object.
fn expects_key(out: &str, closers: &[char], after_value: bool) -> bool {
    if closers.last() != Some(&'}') {
        return false;
    }
    if after_value {
        // A missing comma: the next token starts a new member.
        return true;
    }
    matches!(out.trim_end().chars().last(), Some('{') | Some(','))
}

fn bare_token(token: &str, is_key: bool) -> String {
    if is_key {
        return serde_json::to_string(token).unwrap_or_else(|_| format!("\"{token}\""));
    }
    match token {
        "true" | "false" | "null" => token.to_string(),
        "True" => "true".to_string(),
        "False" => "false".to_string(),
        "None" | "undefined" => "null".to_string(),
        _ if serde_json::from_str::<serde_json::Number>(token).is_ok() => token.to_string(),
        _ => serde_json::to_string(token).unwrap_or_else(|_| format!("\"{token}\"")),
    }
}

/// Read a string literal starting at `start` (which holds the opening quote)
/// and return it re-encoded as a double-quoted JSON string, the index after
/// it, and whether it was terminated.
fn read_string(chars: &[char], start: usize) -> (String, usize, bool) {
    let quote = chars[start];
    let mut literal = String::from('"');
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match chars.get(i + 1) {
                Some('\'') => {
                    literal.push('\'');
                    i += 2;
                }
                Some(&next) => {
                    literal.push('\\');
                    literal.push(next);
                    i += 2;
                }
                None => {
                    i += 1;
                }
            },
            _ if c == quote => {
                literal.push('"');
                return (literal, i + 1, true);
            }
            '"' => {
                literal.push_str("\\\"");
                i += 1;
            }
            '\n' => {
                literal.push_str("\\n");
                i += 1;
            }
            '\r' => {
                literal.push_str("\\r");
                i += 1;
            }
            '\t' => {
                literal.push_str("\\t");
                i += 1;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }

    literal.push('"');
    (literal, i, false)
}

fn insert_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.insert(trimmed_len, ',');
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.remove(trimmed_len - 1);
    }
}
