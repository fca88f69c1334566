//! Error taxonomy for the provisioning run.
//!
//! Errors split into three layers: [`ContractError`] for on-ledger invariant
//! violations, [`LedgerError`] for the submission/confirmation surface, and
//! [`DeployError`] for everything the orchestrator reports to its caller.

use std::path::PathBuf;
use std::time::Duration;

use alloy_core::primitives::Address;
use thiserror::Error;

use crate::artifacts::ContractKind;
use crate::ledger::TxRef;
use crate::records::RunReport;

/// Invariant violation raised by a contract entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractError {
    /// `initialize` was called on an instance that already ran it.
    #[error("already initialized")]
    AlreadyInitialized,
    /// An operation requiring `initialize` ran before it.
    #[error("not initialized")]
    NotInitialized,
    /// Proxy creation was requested before any bytecode was installed.
    #[error("no bytecode installed")]
    NoBytecode,
    /// A forward had neither a per-call target nor a configured default.
    #[error("no forwarding target")]
    MissingTarget,
    /// The contract does not expose the invoked entry point.
    #[error("unknown selector")]
    UnknownSelector,
    /// The entry point exists but the argument shape is wrong.
    #[error("invalid arguments")]
    InvalidArguments,
}

/// Error surfaced by a [`LedgerClient`](crate::ledger::LedgerClient).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger did not accept the transaction. Transient: retried with
    /// backoff by the orchestrator.
    #[error("submission failed: {0}")]
    Submission(String),
    /// Contract execution rejected the transaction. Never retried.
    #[error("execution rejected: {0}")]
    Rejected(#[from] ContractError),
    /// The declared gas exceeds the configured ceiling.
    #[error("gas {wanted} exceeds ceiling {ceiling}")]
    GasCeiling { wanted: u64, ceiling: u64 },
    /// No contract is deployed at the call target.
    #[error("no contract at {0}")]
    NoContract(Address),
    /// A confirmation poll referenced a transaction the ledger never saw.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxRef),
}

impl LedgerError {
    /// Whether the orchestrator may retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Submission(_))
    }
}

/// Error reported by the orchestrator, always naming the offending node.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Two specs in the graph share a name.
    #[error("duplicate contract name `{0}`")]
    DuplicateName(String),
    /// A spec depends on a name not present in the graph.
    #[error("`{node}` depends on unknown contract `{dependency}`")]
    UnknownDependency { node: String, dependency: String },
    /// The declared dependencies contain a cycle.
    #[error("dependency cycle through: {}", .0.join(", "))]
    Cycle(Vec<String>),
    /// No artifact is registered for the contract kind.
    #[error("no artifact registered for `{0}`")]
    UnknownArtifact(ContractKind),
    /// An install step names a payload the bytecode store never published.
    #[error("no bytecode payload published under `{0}`")]
    UnknownPayload(String),
    /// An install step names a node that is not a factory.
    #[error("install target `{node}` is `{kind}`, not a factory")]
    NotAFactory { node: String, kind: ContractKind },

    /// Submission kept failing after the bounded retries.
    #[error("submission for `{node}` failed after {attempts} attempt(s): {source}")]
    Submission {
        node: String,
        attempts: u32,
        source: LedgerError,
    },
    /// The transaction never confirmed within the bounded wait.
    #[error("`{node}` not confirmed after {waited:?}")]
    ConfirmationTimeout { node: String, waited: Duration },
    /// The node's `initialize` hit an instance that already ran it.
    #[error("`{node}` is already initialized")]
    AlreadyInitialized { node: String },
    /// Initialization referenced an address that is not confirmed. Indicates
    /// a graph-ordering bug, never retried.
    #[error("`{node}` references dependency `{dependency}` with no confirmed address")]
    MissingDependency { node: String, dependency: String },
    /// The run-level cancellation signal fired while this node was in flight.
    #[error("run cancelled while deploying `{node}`")]
    Cancelled { node: String },

    /// Reading or writing a TOML file failed.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A TOML or JSON document did not parse.
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    /// Serializing a TOML document failed.
    #[error("failed to serialize: {0}")]
    Serialize(String),
}

/// Terminal result of a failed run: the aggregated root cause plus the full
/// per-node report. Partial success is never silent; every node's terminal
/// state is enumerated in `report`.
#[derive(Debug, Error)]
#[error("provisioning failed at `{failed}`: {cause}; unresolved: [{}]", .skipped.join(", "))]
pub struct RunFailure {
    /// The root-cause node: the first to reach `Failed`, or `preflight` when
    /// validation rejected the run before anything was submitted.
    pub failed: String,
    /// The error that failed it.
    #[source]
    pub cause: Box<DeployError>,
    /// Every dependent left unresolved because of the failure.
    pub skipped: Vec<String>,
    /// Terminal state of every node in the graph.
    pub report: RunReport,
}
