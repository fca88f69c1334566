//! stampede-deploy - provisioning library for the identity contract set.
//!
//! This crate deploys and wires together the on-ledger contracts backing the
//! identity system: the registry, the call router, the factory holding
//! versioned proxy logic, and the proxy instances themselves. The heart of it
//! is the [`Orchestrator`], which walks an explicit dependency graph in
//! topological waves, gates every dependent on its dependencies' confirmed
//! addresses, retries transient submission failures, survives partial
//! failure without corrupting ledger state, and makes re-runs idempotent
//! through a persisted address book.

pub mod artifacts;
pub mod config;
pub mod contracts;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod memory;
pub mod orchestrator;
pub mod records;
pub mod standard;

pub use artifacts::{
    Artifact, ArtifactSet, BytecodePayload, BytecodeStore, BytecodeVersion, ContractKind,
};
pub use config::{LedgerSettings, RetryPolicy, RunConfig};
pub use contracts::{
    ContractInstance, FactoryState, InstallOutcome, ProxyState, RegistryState, RouterState,
};
pub use error::{ContractError, DeployError, LedgerError, RunFailure};
pub use graph::{ContractSpec, DependencyGraph, InitArg, SealedGraph};
pub use ledger::{CallKind, ContractCall, DeployRequest, LedgerClient, Receipt, TxRef};
pub use memory::{FaultPlan, MemoryLedger};
pub use orchestrator::{CancelHandle, CancelSignal, InstallStep, Orchestrator, cancellation};
pub use records::{AddressBook, DeployStatus, DeploymentRecord, InstallRecord, RunReport};
pub use standard::{
    ProvisioningPlan, minimal_plan, standard_artifacts, standard_bytecode, standard_plan,
};
