// ABOUTME: Library module for pg-packager
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod migration;
pub mod package;
pub mod postgres;
pub mod scripting;
pub mod utils;
