#![doc = "media-backup-core: incremental backup engine for paginated remote media collections."]

//! This crate walks the pages of a remote media list, stops once it reaches
//! content a previous run already captured, merges the result over the last
//! snapshot and renders it to files. Network, disk and progress display are
//! reached only through the traits in [`contract`].
//!
//! # Usage
//! Build a [`backup::Collaborators`] from the local implementations in
//! [`local`] and [`fetcher::HttpPageSource`] (or mocks), then call
//! [`backup::run_module_backup`] once per module.

pub mod assets;
pub mod backup;
pub mod collector;
pub mod config;
pub mod contract;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod frontier;
pub mod local;
pub mod merge;
pub mod model;
pub mod progress;
pub mod registrar;
