//! Trace Engine
//!
//! Multi-pass processing of captured performance traces.
//! A trace (a flat list of timestamped event records) is fed through
//! a dependency-ordered set of handlers, each of which builds one domain
//! model: renderer call trees, frames, interactions, user timings,
//! network requests, layout shifts and more.
//!
//! This crate provides the core implementation for the
//! `trace-engine` CLI tool.
//!
//! ## Getting Started
//!
//! ```bash
//! trace-engine process --trace page.json.gz --summary
//! trace-engine --help
//! ```
//!
//! Library users drive [`processor::Processor`] directly and read the
//! per-domain outputs from [`processor::TraceParseData`].

pub mod aggregator;
pub mod annotations;
pub mod commands;
pub mod handlers;
pub mod helpers;
pub mod output;
pub mod parser;
pub mod processor;
pub mod utils;
