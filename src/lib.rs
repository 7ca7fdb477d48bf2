//! Core library for the finsheet-tools command line application.
//!
//! The library exposes the orchestration that powers the command-line
//! interface as well as the tests. Responsibilities are kept narrow: file
//! discovery lives in [`discovery`], format adapters under [`io`], sheet name
//! allocation in [`naming`], the merge pipeline in [`consolidate`], and the
//! financial metrics with their renderers in [`analytics`] and [`report`].

pub mod analytics;
pub mod config;
pub mod consolidate;
pub mod discovery;
pub mod error;
pub mod io;
pub mod model;
pub mod naming;
pub mod report;

pub use error::{Result, ToolError};
