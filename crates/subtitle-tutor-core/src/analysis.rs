//! Per-block learning analysis with a fingerprint-keyed cache.
//!
//! For each requested block, [`AnalysisService::analyze`]:
//!
//! 1. fingerprints the block content and the resolved settings,
//! 2. returns a live cached result if there is one,
//! 3. otherwise prompts the model, extracts and validates the JSON envelope,
//!    picks the model's summary markdown or renders the fallback, and caches
//!    the result.
//!
//! Blocks run one after another and the first failure aborts the batch.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{AnalysisCache, Clock, SystemClock};
use crate::error::{Error, Result};
use crate::fingerprint::{block_fingerprint, FingerprintConfig};
use crate::markdown::render_fallback_markdown;
use crate::model::{Credentials, InvokeOptions, LanguageModel, DEFAULT_MODEL};
use crate::models::{AnalysisResult, ScenarioBlock};
use crate::prompt::{analysis_prompt, DEFAULT_ANALYSIS_TEMPLATE, DEFAULT_EXAM_TARGETS};
use crate::response::{extract_json, ExtractOptions};
use crate::schema::{validate_analysis, validate_blocks};

pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_CACHE_TTL_MINUTES: u32 = 60;

/// Produces the analysis prompt template. Called at most once successfully
/// per service.
pub type TemplateLoader = Box<dyn Fn() -> anyhow::Result<String> + Send + Sync>;

/// Per-request analysis settings. Absent values fall back to the defaults.
///
/// Accepts both snake_case and the camelCase names older clients send
/// (`maxTokens`, `cacheTTL`, `examTargets`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, alias = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(
        default,
        alias = "cacheTTL",
        alias = "cache_ttl",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_ttl_minutes: Option<u32>,
    #[serde(default, alias = "examTargets", skip_serializing_if = "Vec::is_empty")]
    pub exam_targets: Vec<String>,
}

/// [`AnalysisConfig`] with every default applied and every range checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub cache_ttl_minutes: u32,
    pub exam_targets: Vec<String>,
}

impl AnalysisConfig {
    /// Apply defaults and validate ranges: temperature 0–2, max tokens
    /// 256–8192, cache TTL 5–720 minutes.
    pub fn resolve(&self, default_model: &str) -> Result<ResolvedConfig> {
        let model = self
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(default_model)
            .to_string();

        let temperature = self.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::validation(format!(
                "temperature must be between 0 and 2, got {temperature}"
            )));
        }

        let max_tokens = self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if !(256..=8192).contains(&max_tokens) {
            return Err(Error::validation(format!(
                "max_tokens must be between 256 and 8192, got {max_tokens}"
            )));
        }

        let cache_ttl_minutes = self.cache_ttl_minutes.unwrap_or(DEFAULT_CACHE_TTL_MINUTES);
        if !(5..=720).contains(&cache_ttl_minutes) {
            return Err(Error::validation(format!(
                "cache TTL must be between 5 and 720 minutes, got {cache_ttl_minutes}"
            )));
        }

        if self.exam_targets.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::validation("exam targets must not be blank"));
        }
        let exam_targets = if self.exam_targets.is_empty() {
            DEFAULT_EXAM_TARGETS.iter().map(|t| t.to_string()).collect()
        } else {
            self.exam_targets.clone()
        };

        Ok(ResolvedConfig {
            model,
            temperature,
            max_tokens,
            cache_ttl_minutes,
            exam_targets,
        })
    }
}

/// Analyses scenario blocks via the language model, caching per block.
pub struct AnalysisService {
    model: Arc<dyn LanguageModel>,
    credentials: Credentials,
    default_model: String,
    cache: AnalysisCache,
    loader: TemplateLoader,
    template: RwLock<Option<Arc<str>>>,
}

impl AnalysisService {
    /// Service with the built-in template and the system clock.
    pub fn new(model: Arc<dyn LanguageModel>, credentials: Credentials) -> Self {
        Self {
            model,
            credentials,
            default_model: DEFAULT_MODEL.to_string(),
            cache: AnalysisCache::new(Arc::new(SystemClock)),
            loader: Box::new(|| Ok::<_, anyhow::Error>(DEFAULT_ANALYSIS_TEMPLATE.to_string())),
            template: RwLock::new(None),
        }
    }

    pub fn with_default_model(mut self, name: impl Into<String>) -> Self {
        self.default_model = name.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = AnalysisCache::new(clock);
        self
    }

    /// Replace the template source. The loader runs lazily on first use.
    pub fn with_template_loader(mut self, loader: TemplateLoader) -> Self {
        self.loader = loader;
        self.template = RwLock::new(None);
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Drop expired cache entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Analyse `blocks` (all of them, or those whose index is in
    /// `target_indexes`), preserving the given block order.
    pub async fn analyze(
        &self,
        subtitle_title: &str,
        blocks: &[ScenarioBlock],
        target_indexes: Option<&[u32]>,
        config: &AnalysisConfig,
    ) -> Result<Vec<AnalysisResult>> {
        if !self.credentials.is_configured() {
            return Err(Error::MissingCredentials);
        }
        if blocks.is_empty() {
            return Err(Error::validation("blocks: expected at least 1 item(s)"));
        }
        validate_blocks(blocks)
            .map_err(|violations| Error::validation(format!("invalid blocks: {violations}")))?;

        let resolved = config.resolve(&self.default_model)?;
        let targets = select_blocks(blocks, target_indexes)?;
        let template = self.template()?;

        let mut results = Vec::with_capacity(targets.len());
        let mut hits = 0usize;
        for block in targets {
            let key = block_fingerprint(
                subtitle_title,
                block,
                FingerprintConfig {
                    model: &resolved.model,
                    temperature: resolved.temperature,
                    max_tokens: resolved.max_tokens,
                    exam_targets: &resolved.exam_targets,
                },
            );

            if let Some(cached) = self.cache.get(&key) {
                debug!(block_index = block.block_index, "analysis cache hit");
                hits += 1;
                results.push(cached);
                continue;
            }
            debug!(block_index = block.block_index, "analysis cache miss");

            let result = self
                .analyze_block(&template, subtitle_title, block, &resolved)
                .await?;
            self.cache
                .insert(key, result.clone(), resolved.cache_ttl_minutes);
            results.push(result);
        }

        info!(
            blocks = results.len(),
            cache_hits = hits,
            model = %resolved.model,
            "analysis complete"
        );
        Ok(results)
    }

    async fn analyze_block(
        &self,
        template: &str,
        subtitle_title: &str,
        block: &ScenarioBlock,
        config: &ResolvedConfig,
    ) -> Result<AnalysisResult> {
        let prompt = analysis_prompt(template, subtitle_title, block, &config.exam_targets);
        debug!(
            block_index = block.block_index,
            prompt_chars = prompt.chars().count(),
            "requesting block analysis"
        );

        let options = InvokeOptions {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
        };
        let completion = self
            .model
            .invoke(&prompt, &options)
            .await
            .map_err(|e| Error::Model(format!("{e:#}")))?;

        let value = extract_json(&completion.text, ExtractOptions::default())?;
        let analysis = validate_analysis(&value).map_err(Error::SchemaValidation)?;

        let summary = analysis.summary_markdown.trim();
        let markdown = if summary.is_empty() {
            render_fallback_markdown(&block.block_name, &analysis.modules, &config.exam_targets)
        } else {
            summary.to_string()
        };

        let block_index = analysis
            .block_index
            .and_then(|i| u32::try_from(i).ok())
            .filter(|i| *i >= 1)
            .unwrap_or(block.block_index);

        Ok(AnalysisResult {
            block_index,
            block_name: analysis
                .block_name
                .unwrap_or_else(|| block.block_name.clone()),
            structured: analysis.modules,
            markdown,
        })
    }

    fn template(&self) -> Result<Arc<str>> {
        if let Some(template) = self
            .template
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(template.clone());
        }

        let loaded: Arc<str> = (self.loader)()
            .map_err(|e| Error::PromptTemplate(format!("{e:#}")))?
            .trim()
            .into();
        let mut slot = self.template.write().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.get_or_insert(loaded).clone())
    }
}

fn select_blocks<'a>(
    blocks: &'a [ScenarioBlock],
    target_indexes: Option<&[u32]>,
) -> Result<Vec<&'a ScenarioBlock>> {
    let Some(indexes) = target_indexes.filter(|i| !i.is_empty()) else {
        return Ok(blocks.iter().collect());
    };

    let selected: Vec<_> = blocks
        .iter()
        .filter(|b| indexes.contains(&b.block_index))
        .collect();
    if selected.is_empty() {
        return Err(Error::NoMatchingBlocks(indexes.to_vec()));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::model::testing::ScriptedModel;
    use crate::models::DialogueLine;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const REPLY: &str = r#"```json
{
  "block_index": 1,
  "block_name": "寒暄",
  "modules": {
    "vocabulary": { "core": [{ "term": "hello", "meaning_cn": "你好" }] },
    "grammar": {},
    "listening_pronunciation": {},
    "culture_context": {},
    "practice": {}
  },
  "summary_markdown": "  # 寒暄总结\n- hello  "
}
```"#;

    const NO_SUMMARY: &str = r#"{
  "modules": {
    "vocabulary": {},
    "grammar": { "sentence_breakdown": ["Hello there = 问候 + 地点副词"] },
    "listening_pronunciation": {},
    "culture_context": {},
    "practice": {},
  }
}"#;

    fn block(index: u32, text: &str) -> ScenarioBlock {
        ScenarioBlock {
            block_index: index,
            block_name: format!("Block {index}"),
            synopsis: "synopsis".to_string(),
            start_line: index,
            end_line: index,
            context_tags: vec![],
            exam_alignment: vec![],
            difficulty: None,
            learning_focus: None,
            dialogues: vec![DialogueLine::new(index, Some("Rick"), text)],
            follow_up_tasks: vec![],
        }
    }

    fn service(model: Arc<ScriptedModel>) -> AnalysisService {
        AnalysisService::new(model, Credentials::with_api_key("sk-test"))
    }

    #[tokio::test]
    async fn test_analyze_uses_model_summary() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let results = service(model.clone())
            .analyze("Pilot", &[block(1, "Hello there.")], None, &AnalysisConfig::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].block_name, "寒暄");
        assert_eq!(results[0].markdown, "# 寒暄总结\n- hello");
        assert_eq!(results[0].structured.vocabulary.core[0].term, "hello");

        let calls = model.calls.lock().unwrap();
        let (prompt, options) = &calls[0];
        assert!(prompt.contains("CET-4、CET-6、IELTS、TOEFL"));
        assert!(prompt.contains("1. Rick: Hello there."));
        assert_eq!(options.model, DEFAULT_MODEL);
        assert_eq!(options.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(options.max_tokens, Some(DEFAULT_MAX_TOKENS));
    }

    #[tokio::test]
    async fn test_analyze_renders_fallback_markdown() {
        let model = Arc::new(ScriptedModel::new(vec![NO_SUMMARY]));
        let config = AnalysisConfig {
            exam_targets: vec!["IELTS".to_string()],
            ..Default::default()
        };
        let results = service(model)
            .analyze("Pilot", &[block(3, "Hello there.")], None, &config)
            .await
            .unwrap();

        let result = &results[0];
        assert_eq!(result.block_index, 3);
        assert_eq!(result.block_name, "Block 3");
        assert!(result.markdown.starts_with("# 情景学习分析概览 · Block 3"));
        assert!(result.markdown.contains("> 适配考试：IELTS"));
        assert!(result.markdown.contains("- Hello there = 问候 + 地点副词"));
    }

    #[tokio::test]
    async fn test_repeated_analysis_hits_cache() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let svc = service(model.clone());
        let blocks = [block(1, "Hello there.")];

        let first = svc.analyze("Pilot", &blocks, None, &AnalysisConfig::default()).await.unwrap();
        let second = svc.analyze("Pilot", &blocks, None, &AnalysisConfig::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(model.call_count(), 1);
        assert_eq!(svc.cache().len(), 1);

        // A different temperature is a different fingerprint.
        let warmer = AnalysisConfig {
            temperature: Some(0.9),
            ..Default::default()
        };
        svc.analyze("Pilot", &blocks, None, &warmer).await.unwrap();
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_expiry_triggers_new_call() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()));
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let svc = service(model.clone()).with_clock(clock.clone());
        let blocks = [block(1, "Hello there.")];
        let config = AnalysisConfig {
            cache_ttl_minutes: Some(5),
            ..Default::default()
        };

        svc.analyze("Pilot", &blocks, None, &config).await.unwrap();
        clock.advance(Duration::minutes(4));
        svc.analyze("Pilot", &blocks, None, &config).await.unwrap();
        assert_eq!(model.call_count(), 1);

        clock.advance(Duration::minutes(2));
        assert_eq!(svc.purge_expired(), 1);
        svc.analyze("Pilot", &blocks, None, &config).await.unwrap();
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_credentials_makes_no_call() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let svc = AnalysisService::new(model.clone(), Credentials::default());
        let err = svc
            .analyze("Pilot", &[block(1, "Hi")], None, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredentials));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_target_selection_keeps_block_order() {
        let model = Arc::new(ScriptedModel::new(vec![NO_SUMMARY]));
        let svc = service(model.clone());
        let blocks = [block(2, "two"), block(1, "one"), block(3, "three")];

        let results = svc
            .analyze("Pilot", &blocks, Some(&[3, 2]), &AnalysisConfig::default())
            .await
            .unwrap();
        let indexes: Vec<u32> = results.iter().map(|r| r.block_index).collect();
        assert_eq!(indexes, vec![2, 3]);

        let err = svc
            .analyze("Pilot", &blocks, Some(&[9]), &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoMatchingBlocks(ref v) if v == &vec![9]));

        let all = svc
            .analyze("Pilot", &blocks, Some(&[]), &AnalysisConfig::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_blocks_rejected_before_model_call() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let svc = service(model.clone());

        let mut broken = block(0, "Hi");
        broken.block_name = String::new();
        broken.dialogues.clear();
        let err = svc
            .analyze("Pilot", &[block(1, "Hi"), broken], None, &AnalysisConfig::default())
            .await
            .unwrap_err();
        match err {
            Error::Validation(message) => {
                assert!(message.contains("blocks[1].block_index"), "{message}");
                assert!(message.contains("blocks[1].block_name"), "{message}");
                assert!(message.contains("blocks[1].dialogues"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = svc
            .analyze("Pilot", &[block(1, "")], None, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("blocks[0].dialogues[0].text"));

        let err = svc
            .analyze("Pilot", &[], None, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_block_aborts_batch() {
        let model = Arc::new(ScriptedModel::new(vec![
            REPLY,
            r#"{"modules": {"vocabulary": {}}, "mood": "happy"}"#,
        ]));
        let svc = service(model.clone());
        let blocks = [block(1, "one"), block(2, "two")];
        let err = svc
            .analyze("Pilot", &blocks, None, &AnalysisConfig::default())
            .await
            .unwrap_err();

        match err {
            Error::SchemaValidation(v) => {
                assert!(v.paths().contains(&"mood"));
                assert!(v.paths().contains(&"modules.grammar"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The first block finished and stays cached.
        assert_eq!(svc.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_config_ranges_are_checked() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let svc = service(model.clone());
        for config in [
            AnalysisConfig { temperature: Some(2.5), ..Default::default() },
            AnalysisConfig { max_tokens: Some(100), ..Default::default() },
            AnalysisConfig { cache_ttl_minutes: Some(1000), ..Default::default() },
        ] {
            let err = svc
                .analyze("Pilot", &[block(1, "Hi")], None, &config)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{config:?}");
        }
        assert_eq!(model.call_count(), 0);
    }

    #[test]
    fn test_config_accepts_camel_case_aliases() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"model": "gpt-4o", "maxTokens": 1024, "cacheTTL": 30, "examTargets": ["IELTS"]}"#,
        )
        .unwrap();
        let resolved = config.resolve("fallback").unwrap();
        assert_eq!(resolved.model, "gpt-4o");
        assert_eq!(resolved.max_tokens, 1024);
        assert_eq!(resolved.cache_ttl_minutes, 30);
        assert_eq!(resolved.exam_targets, vec!["IELTS".to_string()]);
        assert_eq!(resolved.temperature, DEFAULT_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_template_loaded_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let model = Arc::new(ScriptedModel::new(vec![NO_SUMMARY]));
        let svc = service(model.clone()).with_template_loader(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("  自定义模板 {{exam_targets}}  ".to_string())
        }));

        svc.analyze("Pilot", &[block(1, "one")], None, &AnalysisConfig::default())
            .await
            .unwrap();
        svc.analyze("Pilot", &[block(2, "two")], None, &AnalysisConfig::default())
            .await
            .unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let calls = model.calls.lock().unwrap();
        assert!(calls[0].0.starts_with("自定义模板 CET-4、CET-6、IELTS、TOEFL\n"));
    }

    #[tokio::test]
    async fn test_template_failure_is_reported() {
        let model = Arc::new(ScriptedModel::new(vec![REPLY]));
        let svc = service(model.clone())
            .with_template_loader(Box::new(|| Err::<String, _>(anyhow::anyhow!("prompts/missing.md not found"))));
        let err = svc
            .analyze("Pilot", &[block(1, "one")], None, &AnalysisConfig::default())
            .await
            .unwrap_err();
        match err {
            Error::PromptTemplate(message) => assert!(message.contains("missing.md")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(model.call_count(), 0);
    }
}
