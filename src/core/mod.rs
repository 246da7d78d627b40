// This file is the module declaration file for the `core` module.
// It declares the submodules in `src/core/` and exposes them to the crate.

// `config` module:
// Defines the configuration structure (`BundleEnvConfig`), the
// `ConfigProvider` trait, and the `ConfigManager` that loads and saves the
// configuration file in TOML, JSON or YAML.
pub mod config;

// `engine` module:
// The run coordinator. `BundleEngine` resolves the targets, walks them,
// substitutes, backs up and later restores.
pub mod engine;

// `error` module:
// The typed conditions that fail a build.
pub mod error;

// `walker` module:
// Recursive enumeration of the files under a root.
pub mod walker;
