//! Model ⇄ agent wire protocol
//!
//! - `schema` - the closed set of actions and their required fields
//! - `parser` - raw model text → validated [`Action`]

pub mod parser;
pub mod schema;

pub use parser::{parse, ParseError};
pub use schema::{check_semantics, Action, ActionKind, ACTION_SCHEMA};
