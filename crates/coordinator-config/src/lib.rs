//! Parses and validates the buildmaster configuration artifact.
//!
//! The artifact is TOML. [`loader::ConfigLoader`] is the only public entry
//! point; [`raw`] and [`validate`] are the two stages it runs the text
//! through (parse into [`raw::RawConfig`], then check every invariant and
//! normalise into a [`coordinator_core::ConfigModel`]).

pub mod loader;
pub mod raw;
pub mod validate;

pub use loader::ConfigLoader;
