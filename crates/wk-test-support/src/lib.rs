//! Shared test doubles for WandererKills: a mock RefStream/ESI HTTP
//! upstream and killmail JSON fixture builders. Dev-dependency only — never
//! linked into a shipping binary.

pub mod fixtures;
mod mock_upstream;

pub use mock_upstream::MockUpstream;
