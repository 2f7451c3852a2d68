//! materia-core
//!
//! Domain types, text normalization, corpus loading, configuration and the
//! traits the embedding and lexical engines plug into.

pub mod config;
pub mod corpus;
pub mod error;
pub mod normalize;
pub mod traits;
pub mod types;
