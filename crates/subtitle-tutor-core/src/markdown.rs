//! Deterministic markdown rendering of analysis modules.
//!
//! Used when the model leaves `summary_markdown` empty. The output depends
//! only on its inputs: the same modules always render the same text.

use crate::models::{
    AnalysisModules, CultureModule, GrammarModule, ListeningModule, PracticeModule,
    VocabularyModule,
};
use crate::prompt::join_exam_targets;

/// Render a learner-facing overview of the five modules for one block.
///
/// Module headings are always present; sub-sections appear only when their
/// list is non-empty.
pub fn render_fallback_markdown(
    block_name: &str,
    modules: &AnalysisModules,
    exam_targets: &[String],
) -> String {
    let mut out = MarkdownBuf::default();
    out.line(format!("# 情景学习分析概览 · {block_name}"));
    out.blank();
    out.line(format!("> 适配考试：{}", join_exam_targets(exam_targets)));

    out.heading("## Module 1 · 词汇与短语");
    vocabulary(&mut out, &modules.vocabulary);
    out.heading("## Module 2 · 语法与句型");
    grammar(&mut out, &modules.grammar);
    out.heading("## Module 3 · 听力与发音");
    listening(&mut out, &modules.listening_pronunciation);
    out.heading("## Module 4 · 文化与语境");
    culture(&mut out, &modules.culture_context);
    out.heading("## Module 5 · 应试实践");
    practice(&mut out, &modules.practice);

    out.finish()
}

#[derive(Default)]
struct MarkdownBuf {
    lines: Vec<String>,
}

impl MarkdownBuf {
    fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    /// A heading preceded by a blank line.
    fn heading(&mut self, text: &str) {
        self.blank();
        self.line(text);
    }

    /// A `###` sub-section with one bullet per item; skipped when empty.
    fn bullets<T>(&mut self, title: &str, items: &[T], mut render: impl FnMut(&mut Self, usize, &T)) {
        if items.is_empty() {
            return;
        }
        self.line(format!("### {title}"));
        for (i, item) in items.iter().enumerate() {
            render(self, i, item);
        }
    }

    fn finish(self) -> String {
        self.lines.join("\n").trim().to_string()
    }
}

/// `**term** /ipa/ · meaning`, with absent parts left out.
fn term_line(term: &str, phonetic: &str, meaning: &str) -> String {
    let mut line = format!("- **{term}**");
    if !phonetic.is_empty() {
        line.push_str(&format!(" /{phonetic}/"));
    }
    line.push_str(&format!(" · {meaning}"));
    line
}

fn first_non_empty<'a>(candidates: &[&'a str], fallback: &'a str) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|s| !s.is_empty())
        .unwrap_or(fallback)
}

fn vocabulary(out: &mut MarkdownBuf, module: &VocabularyModule) {
    out.bullets("核心考试词汇", &module.core, |out, _, item| {
        let meaning = first_non_empty(&[item.meaning_cn.as_str(), item.meaning_en.as_str()], "解释缺失");
        out.line(term_line(&item.term, &item.phonetic, meaning));
        if !item.exam_tags.is_empty() {
            out.line(format!("  - 考试标签：{}", item.exam_tags.join(" / ")));
        }
        if let Some(example) = &item.subtitle_example {
            out.line(format!("  - 字幕例句：{}", example.sentence));
        }
        if let Some(example) = &item.exam_example {
            out.line(format!("  - 考试例句：{}", example.sentence));
        }
        if !item.notes.is_empty() {
            out.line(format!("  - 备注：{}", item.notes));
        }
    });
    out.bullets("高频短语", &module.phrases, |out, _, phrase| {
        let meaning = first_non_empty(&[phrase.meaning_cn.as_str(), phrase.meaning_en.as_str()], "释义缺失");
        out.line(format!("- **{}** · {meaning}", phrase.phrase));
        if let Some(example) = &phrase.example {
            out.line(format!("  - 例句：{}", example.sentence));
        }
        if !phrase.usage_tip.is_empty() {
            out.line(format!("  - 用法提示：{}", phrase.usage_tip));
        }
    });
    out.bullets("拓展词汇", &module.extension, |out, _, item| {
        let meaning = first_non_empty(&[item.meaning_cn.as_str()], "释义缺失");
        out.line(format!("- **{}** · {meaning}", item.term));
        if !item.usage_tip.is_empty() {
            out.line(format!("  - 用法提示：{}", item.usage_tip));
        }
    });
}

fn grammar(out: &mut MarkdownBuf, module: &GrammarModule) {
    out.bullets("句子结构拆解", &module.sentence_breakdown, |out, _, item| {
        out.line(format!("- {item}"));
    });
    out.bullets("重点语法", &module.grammar_points, |out, _, point| {
        out.line(format!("- **{}**：{}", point.title, point.explanation));
        if !point.structure.is_empty() {
            out.line(format!("  - 结构：{}", point.structure));
        }
        for example in &point.examples {
            out.line(format!("  - 例句：{}", example.sentence));
        }
        if !point.exam_focus.is_empty() {
            out.line(format!("  - 考点：{}", point.exam_focus));
        }
    });
    out.bullets("应用练习", &module.application, |out, _, item| {
        out.line(format!("- {item}"));
    });
}

fn listening(out: &mut MarkdownBuf, module: &ListeningModule) {
    out.bullets("核心词汇发音", &module.keyword_pronunciations, |out, _, entry| {
        let mut line = format!("- {}", entry.term);
        if !entry.ipa.is_empty() {
            line.push_str(&format!(" /{}/", entry.ipa));
        }
        if !entry.tip.is_empty() {
            line.push_str(&format!(" {}", entry.tip));
        }
        out.line(line);
    });
    out.bullets("连读与弱读", &module.connected_speech, |out, _, item| {
        out.line(format!("- **{}**：{}", item.phenomenon, item.explanation));
        if !item.example.is_empty() {
            out.line(format!("  - 示例：{}", item.example));
        }
    });
    out.bullets("听力策略", &module.listening_strategies, |out, _, item| {
        out.line(format!("- {item}"));
    });
}

fn culture(out: &mut MarkdownBuf, module: &CultureModule) {
    out.bullets("俚语与语域", &module.slang_or_register, |out, _, item| {
        out.line(format!("- **{}**：{}", item.expression, item.meaning));
        if !item.exam_warning.is_empty() {
            out.line(format!("  - 考试提醒：{}", item.exam_warning));
        }
    });
    out.bullets("文化背景", &module.cultural_notes, |out, _, item| {
        out.line(format!("- {item}"));
    });
    out.bullets("语用功能", &module.pragmatic_functions, |out, _, item| {
        out.line(format!("- {item}"));
    });
}

fn practice(out: &mut MarkdownBuf, module: &PracticeModule) {
    out.bullets("理解检核", &module.comprehension_checks, |out, i, check| {
        out.line(format!("- Q{}：{}", i + 1, check.question));
        if !check.answer.is_empty() {
            out.line(format!("  - 答案：{}", check.answer));
        }
    });
    out.bullets("改写任务", &module.rewriting_tasks, |out, _, task| {
        out.line(format!("- {}", task.instruction));
        if !task.target_words.is_empty() {
            out.line(format!("  - 目标词汇：{}", task.target_words.join(" / ")));
        }
    });
    out.bullets("口语拓展", &module.speaking_prompts, |out, _, item| {
        out.line(format!("- {item}"));
    });
}
