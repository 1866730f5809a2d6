//! Cluster bus: the mesh that keeps back-office nodes in sync.
//!
//! Every node speaks the same remote-procedure surface: string-named
//! functions with positional, typed arguments ([`Program`]). The master
//! side ([`ClusterNode`]) verifies logins, tracks peers in the
//! `_Cluster` table, replays and fans out table subscriptions, routes
//! push data by node class and sweeps everything a lost peer owned.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod login;
pub mod node;
pub mod program;

use thiserror::Error;

pub use login::ClusterLogin;
pub use node::{ClusterAction, ClusterNode};
pub use program::Program;

/// Errors raised on the cluster bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// Account or password mismatch.
    #[error("cluster login refused for account '{0}'")]
    LoginRefused(String),

    /// A program could not be decoded.
    #[error("malformed program: {0}")]
    MalformedProgram(&'static str),

    /// A program addressed an unknown function.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A peer addressed a table that does not exist.
    #[error("no such table '{0}'")]
    NoSuchTable(String),
}
