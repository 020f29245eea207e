//! SQLite schema and the library store built on it.

mod db;
mod migrations;

pub use db::{Database, LibraryCounts};
pub use migrations::{Migration, MIGRATIONS};
