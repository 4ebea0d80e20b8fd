//! # SOW Analyzer
//!
//! Backend service that reads Statement of Work documents and asks a
//! language model for hidden risks, unclear items and suggested remediation.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌───────────────────┐
//! │  Upload  │──▶│ Extract  │──▶│  Chunk  │──▶│ Analyze per chunk │
//! │ or text  │   │ PDF/DOCX │   │ ~2500 t │   │   then combine    │
//! └──────────┘   └──────────┘   └─────────┘   └─────────┬─────────┘
//!                                                       │
//!                          ┌────────────────────────────┤
//!                          ▼            ▼               ▼
//!                     ┌────────┐  ┌──────────┐  ┌───────────────┐
//!                     │  mock  │  │  OpenAI  │  │ Ollama/textgen│
//!                     └────────┘  └──────────┘  └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction per file format |
//! | [`chunk`] | Token-budgeted chunking |
//! | [`runtime`] | Shared backend selection |
//! | [`llm`] | Chat model backends and router |
//! | [`json_extract`] | JSON recovery from model output |
//! | [`analysis`] | Chunk-then-combine orchestration |
//! | [`error`] | HTTP error contract |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI commands |

pub mod analysis;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod json_extract;
pub mod llm;
pub mod logging;
pub mod models;
pub mod runtime;
pub mod server;
