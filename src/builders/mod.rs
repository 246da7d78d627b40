// This file is the module declaration file for the `builders` module.
// It declares and makes public all the sub-modules within the `src/builders`
// directory. These modules hold the pieces the engine composes.

// `environment` module:
// The environment snapshot a run substitutes from.
pub mod environment;

// `policy` module:
// The include/exclude rules deciding which variables may be substituted.
pub mod policy;

// `reporter` module:
// Summaries of a run and the `StatusReporter` trait with its
// `ConsoleReporter` implementation, including value masking.
pub mod reporter;

// `storage` module:
// The `StorageProvider` trait and its sibling (`.bak`) and mirrored
// directory (`.path` sidecar) implementations.
pub mod storage;

// `substitution` module:
// Detection of `process.env` references and the two rewrite strategies.
pub mod substitution;

// `validator` module:
// The `ConfigValidator` trait and `StandardValidator`, which normalize
// extensions and flag conflicting options.
pub mod validator;
