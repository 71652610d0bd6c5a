//! Shared infrastructure utilities for Vow.
//!
//! Cross-cutting helpers that don't belong in the domain-pure `vow-types`
//! crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename) and
//!   recovery of interrupted writes

pub mod atomic_write;

pub use atomic_write::{
    BackupRecovery, FileMode, WriteOptions, ensure_private_dir, recover_backup, write_atomic,
    write_atomic_with_options,
};
