//! # Subtitle Tutor Core
//!
//! Shared logic for Subtitle Tutor: data models, subtitle parsing, scenario
//! normalization, model-response repair and validation, the analysis cache,
//! the language-model seam, the segmentation and analysis services, and the
//! notes markdown codec.
//!
//! This crate contains no tokio, HTTP client, or filesystem dependencies
//! outside of tests. The application crate supplies a concrete
//! [`model::LanguageModel`] and the configuration values.
//!
//! ## Pipeline
//!
//! ```text
//! raw subtitle ──▶ subtitle::parse_subtitle ──▶ SegmentationService
//!                                                  │  (model call)
//!                                                  ▼
//!                         response::extract_json + schema validation
//!                                                  │
//!                                                  ▼
//!                            scenario::normalize ──▶ ScenarioSegmentation
//!                                                  │
//!                          AnalysisService ◀───────┘  (cached per block)
//!                                                  │
//!                                                  ▼
//!                                 notes::export_markdown / import_markdown
//! ```

pub mod analysis;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod markdown;
pub mod model;
pub mod models;
pub mod notes;
pub mod prompt;
pub mod response;
pub mod scenario;
pub mod schema;
pub mod segmentation;
pub mod subtitle;

pub use error::{Error, Result, Violation, Violations};
