//! Core package-manager engine: the transactional installation engine
//! described in spec.md §1.

/// C1: path validator.
pub(crate) mod path;

/// C2: safe tar+zstd archive extractor.
pub(crate) mod archive;

/// C3: version algebra.
pub(crate) mod version;

/// C4: on-disk state store.
pub(crate) mod store;

/// C5: repository index.
pub(crate) mod repo;

/// C6: cross-process exclusive lock.
pub(crate) mod lock;

/// C7: dependency resolver / planner.
pub(crate) mod resolver;

/// C8: per-package installation task.
pub(crate) mod install;

/// C9: transaction engine.
pub(crate) mod transaction;

/// C10: removal engine.
pub(crate) mod remove;

/// C11: post-install/pre-remove hook runner.
pub(crate) mod hooks;
