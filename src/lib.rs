// ABOUTME: Library module for table-interchange
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod adapter;
pub mod commands;
pub mod config;
pub mod dialect;
pub mod error;
pub mod export;
pub mod filters;
pub mod formats;
pub mod import;
pub mod mysql;
pub mod postgres;
pub mod quoting;
pub mod sqlite;
pub mod utils;
pub mod where_clause;
