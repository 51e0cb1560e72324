//! Synthetic feed implementations

pub mod generator;
pub mod replay;

pub use generator::GeneratorFeed;
pub use replay::ReplayFeed;
