//! Graph store implementations

mod sqlite;

pub use sqlite::SqliteGraphRepository;
