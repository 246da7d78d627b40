//! Bakes environment variables into source files before a build and puts the
//! original files back afterwards.
pub mod builders;
pub mod core;
pub mod utils;
