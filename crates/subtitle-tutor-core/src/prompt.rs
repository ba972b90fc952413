//! Prompt builders for the segmentation and analysis model calls.
//!
//! The prompts are in Chinese because the product targets Chinese learners
//! preparing for English exams; field names stay in English so the model's
//! JSON maps straight onto [`crate::models`].

use crate::models::{DialogueLine, ScenarioBlock};

/// Built-in analysis prompt template. `{{exam_targets}}` is substituted.
pub const DEFAULT_ANALYSIS_TEMPLATE: &str = include_str!("../prompts/scenario-analysis.md");

/// Placeholder replaced with the joined exam targets.
pub const EXAM_TARGETS_PLACEHOLDER: &str = "{{exam_targets}}";

/// Exam targets used when a request names none.
pub const DEFAULT_EXAM_TARGETS: [&str; 4] = ["CET-4", "CET-6", "IELTS", "TOEFL"];

const NOT_PROVIDED: &str = "未提供";
const NOT_SPECIFIED: &str = "未指定";

/// Build the segmentation prompt for a numbered transcript.
pub fn segmentation_prompt(title: &str, transcript: &str) -> String {
    format!(
        r#"你是“字幕智析”项目的 AI 情景分块助手，需要将英文字幕拆解为可学习的情景模块，并返回严格的 JSON。
字段说明：
- subtitle_title: 字符串，保留原字幕标题。
- segmentation_strategy: 字符串，用 1-2 句中文说明划分依据。
- total_blocks: 数字，等于情景模块数量。
- blocks: 情景模块数组，每个元素包含：
  - block_index: 数字，从 1 开始递增。
  - block_name: 中文标题，凸显场景主题。
  - synopsis: 中文概述，描述场景核心事件。
  - start_line / end_line: 数字，对应下方字幕行号（从 1 开始，首尾均包含）。
  - context_tags: 1-5 个中文语境标签，例如“社区规划”“公共政策”。
  - exam_alignment: 1-4 个中文描述，指明与 CET/IELTS/TOEFL/考研的关联训练角度。
  - difficulty: 只能取“入门”“进阶”“冲刺”之一。
  - learning_focus: 对象，包含 vocabulary / grammar / listening / culture（culture 可缺省，其余必填）。
  - dialogues: 台词数组，字段说明：
    * order: 必填，字幕行号。
    * timestamp: 若原文含时间戳请保留，缺省可省略。
    * speaker: 若原文缺失，请输出 "Unknown"。
    * text: 必填，字幕原文。
    * emotion: 可选，描述语气或情绪。
  - follow_up_tasks: 1-3 条中文建议，指导后续学习或练习。

字幕标题：{title}
字幕原文（按出现顺序，行号从 1 开始）：
{transcript}

生成规则：
1. 若字幕缺少时间戳或说话人，可做合理推断或使用占位值（如 "Unknown"）。
2. 保证 block_index 递增且覆盖所有台词，行号不缺失、不重复。
3. 仅输出合法 JSON 字符串，不要包含 Markdown、额外说明或注释。"#
    )
}

/// Join exam targets for display, falling back to the defaults when empty.
pub fn join_exam_targets(targets: &[String]) -> String {
    if targets.is_empty() {
        DEFAULT_EXAM_TARGETS.join("、")
    } else {
        targets.join("、")
    }
}

/// Build the analysis prompt for one block: the template with exam targets
/// filled in, followed by a `# Context` section describing the block.
pub fn analysis_prompt(
    template: &str,
    subtitle_title: &str,
    block: &ScenarioBlock,
    exam_targets: &[String],
) -> String {
    let head = template.replace(EXAM_TARGETS_PLACEHOLDER, &join_exam_targets(exam_targets));
    format!(
        "{head}\n\n---\n# Context\n{}\n\n---\n请按照约定输出 JSON。",
        context_section(subtitle_title, block)
    )
}

fn context_section(subtitle_title: &str, block: &ScenarioBlock) -> String {
    let or_default = |items: &[String], fallback: &str| {
        if items.is_empty() {
            fallback.to_string()
        } else {
            items.join("、")
        }
    };

    let focus = match &block.learning_focus {
        Some(focus) => {
            let part = |label: &str, value: Option<&String>| {
                format!("{label}：{}", value.map_or(NOT_PROVIDED, String::as_str))
            };
            [
                part("词汇", focus.vocabulary.as_ref()),
                part("语法", focus.grammar.as_ref()),
                part("听力", focus.listening.as_ref()),
                part("文化", focus.culture.as_ref()),
            ]
            .join("；")
        }
        None => NOT_PROVIDED.to_string(),
    };

    let sections = [
        format!("字幕标题：{subtitle_title}"),
        format!("情景模块编号：{}", block.block_index),
        format!("情景模块标题：{}", block.block_name),
        format!("情景概要：{}", block.synopsis),
        format!("字幕行号范围：{}-{}", block.start_line, block.end_line),
        format!("语境标签：{}", or_default(&block.context_tags, NOT_PROVIDED)),
        format!("考试导向：{}", or_default(&block.exam_alignment, NOT_SPECIFIED)),
        format!(
            "难度系数：{}",
            block.difficulty.as_deref().unwrap_or(NOT_SPECIFIED)
        ),
        format!("学习聚焦：{focus}"),
        "字幕台词：".to_string(),
        block
            .dialogues
            .iter()
            .map(context_line)
            .collect::<Vec<_>>()
            .join("\n"),
    ];
    sections.join("\n")
}

fn context_line(line: &DialogueLine) -> String {
    let timestamp = line
        .timestamp
        .as_deref()
        .map(|ts| format!("[{ts}] "))
        .unwrap_or_default();
    let speaker = line
        .speaker
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown");
    let emotion = line
        .emotion
        .as_deref()
        .map(|e| format!("（情绪：{e}）"))
        .unwrap_or_default();
    format!("{}. {timestamp}{speaker}: {}{emotion}", line.order, line.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LearningFocus;

    fn sample_block() -> ScenarioBlock {
        let mut first = DialogueLine::new(1, Some("Rick"), "Hello there.");
        first.timestamp = Some("00:00:01 --> 00:00:03".to_string());
        first.emotion = Some("casual".to_string());
        ScenarioBlock {
            block_index: 1,
            block_name: "Greeting".to_string(),
            synopsis: "Rick greets Beth.".to_string(),
            start_line: 1,
            end_line: 2,
            context_tags: vec![],
            exam_alignment: vec!["IELTS 口语".to_string()],
            difficulty: None,
            learning_focus: Some(LearningFocus {
                vocabulary: Some("greetings".to_string()),
                ..Default::default()
            }),
            dialogues: vec![first, DialogueLine::new(2, None, "Hi!")],
            follow_up_tasks: vec![],
        }
    }

    #[test]
    fn test_segmentation_prompt_embeds_title_and_transcript() {
        let prompt = segmentation_prompt("Pilot", "1. Rick: Hello there.");
        assert!(prompt.contains("字幕标题：Pilot"));
        assert!(prompt.contains("1. Rick: Hello there."));
        assert!(prompt.contains("“入门”“进阶”“冲刺”"));
        assert!(prompt.ends_with("不要包含 Markdown、额外说明或注释。"));
    }

    #[test]
    fn test_analysis_prompt_context() {
        let targets = vec!["IELTS".to_string(), "TOEFL".to_string()];
        let prompt = analysis_prompt("目标：{{exam_targets}}", "Pilot", &sample_block(), &targets);

        assert!(prompt.starts_with("目标：IELTS、TOEFL\n\n---\n# Context\n"));
        assert!(prompt.contains("情景模块编号：1"));
        assert!(prompt.contains("字幕行号范围：1-2"));
        assert!(prompt.contains("语境标签：未提供"));
        assert!(prompt.contains("考试导向：IELTS 口语"));
        assert!(prompt.contains("难度系数：未指定"));
        assert!(prompt.contains("学习聚焦：词汇：greetings；语法：未提供；听力：未提供；文化：未提供"));
        assert!(prompt.contains("1. [00:00:01 --> 00:00:03] Rick: Hello there.（情绪：casual）"));
        assert!(prompt.contains("2. Unknown: Hi!"));
        assert!(prompt.ends_with("请按照约定输出 JSON。"));
    }

    #[test]
    fn test_default_template_has_placeholder() {
        assert!(DEFAULT_ANALYSIS_TEMPLATE.contains(EXAM_TARGETS_PLACEHOLDER));
        let prompt = analysis_prompt(DEFAULT_ANALYSIS_TEMPLATE, "t", &sample_block(), &[]);
        assert!(prompt.contains("CET-4、CET-6、IELTS、TOEFL"));
        assert!(!prompt.contains(EXAM_TARGETS_PLACEHOLDER));
    }
}
