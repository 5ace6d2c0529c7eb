//! Model file discovery, download and layout migration

pub mod download;
pub mod locator;
pub mod migrate;

pub use download::{file_name_from_url, HttpFetcher, UrlFetcher};
pub use locator::{friendly_name, ModelCandidate, ModelLocator, ModelQuery};
pub use migrate::{legacy_moves, migrate_legacy_layout, move_files, LegacyMove, MoveReport};
