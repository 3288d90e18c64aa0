//! rulepool scheduler service library.
//!
//! This crate primarily ships a `scheduler` binary, but we expose a small
//! library surface to enable integration testing and embedding with a
//! custom task handler.

pub mod api;
pub mod config;
pub mod handler;
pub mod placer;
pub mod state;
pub mod sweeper;
