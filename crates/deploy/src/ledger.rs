//! The ledger client seam.
//!
//! The real client (transport, signing, nonce management) is an external
//! collaborator; the orchestrator only needs the three operations below.
//! [`MemoryLedger`](crate::memory::MemoryLedger) is the in-repo
//! implementation used by tests and dry-runs.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::artifacts::{BytecodePayload, ContractKind};
use crate::error::LedgerError;

/// Reference to a submitted transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("{_0}")]
pub struct TxRef(pub B256);

/// A contract-creation request.
///
/// Gas and pricing are passthrough values from the run configuration; the
/// orchestrator does not interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Graph node name, for client-side logging and diagnostics.
    pub label: String,
    /// The kind being instantiated.
    pub kind: ContractKind,
    /// Creation bytecode.
    pub creation_code: Bytes,
    /// Opaque ABI-encoded constructor arguments.
    pub constructor_args: Bytes,
    /// Declared gas for this transaction.
    pub gas: u64,
    /// Gas price in wei.
    pub gas_price: u64,
    /// Sending account.
    pub from: Address,
}

/// The entry points the orchestrator drives on deployed contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// `initialize(args...)`, with dependency addresses already resolved.
    Initialize { args: Vec<Address> },
    /// `setBytecode(payload)` on a factory.
    SetBytecode { payload: BytecodePayload },
    /// `createProxy()` on a factory.
    CreateProxy,
    /// Forward an opaque call through a router.
    Forward { target: Option<Address> },
}

/// A call against an already-deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Graph node name of the target, for diagnostics.
    pub label: String,
    /// Address of the target contract.
    pub to: Address,
    /// Which entry point to invoke.
    pub kind: CallKind,
    /// Sending account.
    pub from: Address,
}

/// Durable acceptance of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// The confirmed transaction.
    pub tx: TxRef,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
}

/// Submission/confirmation surface of the target ledger.
///
/// Implementations must tolerate repeated `confirmation` polls for the same
/// transaction; `Ok(None)` means not yet confirmed.
pub trait LedgerClient: Send + Sync {
    /// Submit a contract-creation transaction.
    fn submit_deployment(
        &self,
        request: DeployRequest,
    ) -> impl Future<Output = Result<TxRef, LedgerError>> + Send;

    /// Submit a call against a deployed contract.
    fn submit_call(
        &self,
        call: ContractCall,
    ) -> impl Future<Output = Result<TxRef, LedgerError>> + Send;

    /// Poll whether a transaction has been durably accepted.
    fn confirmation(
        &self,
        tx: TxRef,
    ) -> impl Future<Output = Result<Option<Receipt>, LedgerError>> + Send;
}

impl<L: LedgerClient> LedgerClient for &L {
    fn submit_deployment(
        &self,
        request: DeployRequest,
    ) -> impl Future<Output = Result<TxRef, LedgerError>> + Send {
        (**self).submit_deployment(request)
    }

    fn submit_call(
        &self,
        call: ContractCall,
    ) -> impl Future<Output = Result<TxRef, LedgerError>> + Send {
        (**self).submit_call(call)
    }

    fn confirmation(
        &self,
        tx: TxRef,
    ) -> impl Future<Output = Result<Option<Receipt>, LedgerError>> + Send {
        (**self).confirmation(tx)
    }
}
