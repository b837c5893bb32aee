//! redb table definitions for the SPD document store.
//!
//! Each table uses `&str` keys (document ids) and `&[u8]` values
//! (JSON-serialized documents).

use redb::TableDefinition;

/// The authoritative forecast. Holds at most one record.
pub const FORECASTS: TableDefinition<&str, &[u8]> = TableDefinition::new("forecasts");

/// Performance-profile catalogues. Holds at most one record.
pub const PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("profiles");

/// Policies selected for execution.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");
