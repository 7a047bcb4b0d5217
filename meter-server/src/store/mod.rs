//! Case store implementations of [`meter_core::CaseStore`].

mod sqlite;

pub use sqlite::SqliteStore;
