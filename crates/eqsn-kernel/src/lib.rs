//! `eqsn-kernel`: actor-based simulation of entangled qubits.
//!
//! Every qubit starts in its own group: one state vector owned by one actor.
//! Multi-qubit operations first merge the operands' groups, after which the
//! surviving actor applies the operation to the joint vector. Groups stay as
//! small as the entanglement they carry, and unrelated groups run in
//! parallel across a fixed pool of execution contexts.
//!
//! - [`registry`] maps each qubit key to the actor owning it
//! - [`actor`] runs one group's commands strictly in order
//! - [`merge`] joins two groups under the registry's exclusive section
//! - [`pool`] hosts actors on per-thread tokio runtimes
//! - [`linalg`], [`gates`] and [`group`] hold the numerics
//!
//! # Quick start
//!
//! ```rust
//! use eqsn_kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default().with_workers(2)).unwrap();
//! kernel.create("a").unwrap();
//! kernel.create("b").unwrap();
//!
//! // EPR pair
//! kernel.h_gate("b").unwrap();
//! kernel.cnot_gate("a", "b").unwrap();
//!
//! let a = kernel.measure("a", true).unwrap();
//! let b = kernel.measure("b", true).unwrap();
//! assert_eq!(a, b);
//! kernel.shutdown();
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod gates;
pub mod group;
pub mod kernel;
pub mod linalg;
pub mod merge;
pub mod pool;
pub mod registry;

pub use actor::ExitReason;
pub use config::{ConfigError, KernelConfig};
pub use error::{KernelError, KernelResult};
pub use gates::GateMatrix;
pub use group::{Group, Snapshot};
pub use kernel::Kernel;
pub use merge::MergeOutcome;
pub use pool::ContextId;
pub use registry::{GroupId, QubitKey, Release};
