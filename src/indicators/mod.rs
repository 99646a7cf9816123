// Technical indicators module
// Rolling support/resistance levels

pub mod levels;

pub use levels::{identify_key_levels, KeyLevels, DEFAULT_LEVEL_WINDOW};
