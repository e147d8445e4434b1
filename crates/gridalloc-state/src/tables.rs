//! redb table definitions for the registries.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Shape shared by every registry table: string key, JSON value.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Peer node status keyed by `{node_id}`.
pub const NODES: JsonTable = TableDefinition::new("nodes");

/// Function metadata keyed by `{function_name}`.
pub const FUNCTIONS: JsonTable = TableDefinition::new("functions");
