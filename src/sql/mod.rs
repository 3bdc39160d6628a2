//! SQL utilities for underlying tables
//!
//! DDL generation, identifier sanitization, WHERE-clause building and the
//! visitor that migrates underlying tables.

pub mod condition;
pub mod ddl;
pub mod sanitize;
pub mod visitor;

pub use condition::build_record_clause;
pub use ddl::DdlGenerator;
pub use sanitize::{POSTGRES_RESERVED_WORDS, quote_identifier, validate_identifier};
pub use visitor::{SchemaExecutor, UnderlyingTable, UnderlyingTableVisitor};
