//! Dialogue Engine — branching dialogue graphs for games.
//!
//! Authors build a graph of npc lines, player decisions and conditional
//! content, save it as JSON or as a Yarn-style script, and play it back
//! against a store of flags that the dialogue itself reads and mutates.
//!
//! ```
//! use dialogue_engine::core::parser::parse;
//! use dialogue_engine::core::runner::DialogueRunner;
//!
//! let tree = parse("title: start\n---\nGuard: Halt!\n===\n");
//! let mut runner = DialogueRunner::builder().with_tree(tree).build().unwrap();
//! assert_eq!(runner.current().unwrap().content, "Halt!");
//! ```

pub mod core;
pub mod schema;

pub use crate::core::parser::{parse, parse_with, ParseOptions, ScriptError};
pub use crate::core::processor::{apply_choice, step, ProcessedNode};
pub use crate::core::runner::DialogueRunner;
pub use crate::core::serializer::serialize;
pub use crate::core::variables::VariableStore;
pub use crate::schema::flag::FlagSchema;
pub use crate::schema::tree::DialogueTree;
