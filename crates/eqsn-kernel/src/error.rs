//! Error types for the simulation kernel.

use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::QubitKey;

/// Errors produced at the kernel boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// The key is not routed to any live group.
    #[error("unknown qubit '{0}'")]
    UnknownQubit(QubitKey),

    /// `create` was called for a key that is still live.
    #[error("qubit '{0}' already exists")]
    DuplicateKey(QubitKey),

    /// A process-wide kernel is already running.
    #[error("kernel already initialized; use Kernel::get_or_create or shut the running instance down first")]
    AlreadyInitialized,

    /// An actor received a command it cannot execute. Fatal to that actor.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A gate payload does not have the dimension the operation needs.
    #[error("{operation} expects a {expected}x{expected} matrix, got {rows}x{cols}")]
    InvalidMatrix {
        /// Boundary operation that rejected the payload.
        operation: &'static str,
        /// Required side length.
        expected: usize,
        /// Rows of the supplied matrix.
        rows: usize,
        /// Columns of the supplied matrix.
        cols: usize,
    },

    /// A multi-qubit operation named the same key more than once.
    #[error("invalid operands: {0}")]
    InvalidOperands(String),

    /// The actor owning the key went away before replying.
    #[error("actor owning qubit '{0}' terminated before replying")]
    ActorTerminated(QubitKey),

    /// The kernel has been shut down.
    #[error("kernel has been shut down")]
    ShutDown,

    /// An execution context could not be started.
    #[error("failed to start execution context: {0}")]
    Runtime(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
