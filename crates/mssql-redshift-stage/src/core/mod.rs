//! Core types shared across the staging engine.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, FieldChoice, FieldSelection, SourceTable, TableSchema};
pub use traits::Liveness;
pub use value::{SqlValue, NULL_TOKEN};
