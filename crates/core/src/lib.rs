//! Organization engine: detection, routing, destination policy, moves and the file index.

pub mod category;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod executor;
pub mod indexer;
pub mod models;
pub mod organizer;
pub mod pipeline;
pub mod resolver;
pub mod scanner;

pub use organizer::Organizer;
