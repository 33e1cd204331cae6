//! Baton Config
//!
//! This crate contains the serializable input types shared by the baton
//! crates. They describe a flow run's inputs before any remote lookup or
//! execution happens:
//!
//! - [`StorageRef`] - where a flow definition lives and which secrets it needs
//! - [`Context`] - the ambient key/value context a flow runs under
//! - [`RunOptions`] - caller-supplied options forwarded to the flow runner
//!
//! All types round-trip through JSON so they can be stored alongside a flow
//! run record or read from a file by the CLI.

mod context;
mod options;
mod storage;

pub use context::{Context, SECRETS_KEY};
pub use options::RunOptions;
pub use storage::StorageRef;
