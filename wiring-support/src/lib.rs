//! # Wiring Support
//!
//! Shared utilities for the Wiring resolution engine.
//!
//! This crate provides:
//! - The injection tag parser used by the registry and by `#[derive(Inject)]`
//! - Text rendering for error messages

pub mod rendering;
pub mod tag;
