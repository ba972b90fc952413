//! # Subtitle Tutor
//!
//! Turns English subtitles into scenario-based study material with an LLM.
//!
//! The pure logic (parsing, normalization, response repair, caching, the
//! notes codec) lives in [`subtitle_tutor_core`]; this crate adds the
//! configuration file, the OpenAI-compatible client, logging, the `tutor`
//! CLI commands, and the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────────┐
//! │  .srt / .txt │──▶│ SegmentationService │──▶│ scenario.json│
//! └──────────────┘   └──────────┬──────────┘   └──────┬───────┘
//!                               │ LanguageModel       │
//!                               ▼                     ▼
//!                     ┌──────────────────┐   ┌─────────────────┐
//!                     │ OpenAIChatModel  │◀──│ AnalysisService │ (TTL cache)
//!                     └──────────────────┘   └────────┬────────┘
//!                                                     ▼
//!                                            ┌─────────────────┐
//!                                            │ notes markdown  │
//!                                            └─────────────────┘
//!
//!            CLI (tutor)  ─┬─  HTTP (axum, /api/*)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! tutor segment episode.srt --output scenario.json
//! tutor analyze scenario.json --block 1 --output analyses.json
//! tutor notes export scenario.json --analyses analyses.json --output notes.md
//! tutor serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup (`TUTOR_LOG`) |
//! | [`llm`] | OpenAI-compatible chat completions client |
//! | [`services`] | Builds the core services from configuration |
//! | [`server`] | HTTP API |
//! | [`segment_cmd`] | `tutor segment` |
//! | [`analyze_cmd`] | `tutor analyze` |
//! | [`scenario_cmd`] | `tutor scenario normalize\|validate` |
//! | [`notes_cmd`] | `tutor notes export\|import` |
//! | [`output`] | File-or-stdout output helpers |

pub mod analyze_cmd;
pub mod config;
pub mod llm;
pub mod logging;
pub mod notes_cmd;
pub mod output;
pub mod scenario_cmd;
pub mod segment_cmd;
pub mod server;
pub mod services;
