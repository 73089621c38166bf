pub mod commands;
pub mod evaluator;
pub mod flags;
pub mod integrity;
pub mod lint;
pub mod parser;
pub mod processor;
pub mod runner;
pub mod serializer;
pub mod variables;
