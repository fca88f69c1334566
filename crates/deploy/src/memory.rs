//! In-memory ledger used by tests and dry-runs.
//!
//! Executes deployments and calls against the contract models, with
//! deterministic addresses and configurable fault injection so orchestration
//! edge cases (transient submission failures, confirmation timeouts,
//! contract-level rejections) can be exercised without a live chain.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_core::primitives::{Address, B256};
use sha2::{Digest, Sha256};

use crate::config::LedgerSettings;
use crate::contracts::ContractInstance;
use crate::error::{ContractError, LedgerError};
use crate::ledger::{CallKind, ContractCall, DeployRequest, LedgerClient, Receipt, TxRef};

/// Faults to inject for a given node label.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail the next N submissions with a transient error.
    pub failing_submissions: u32,
    /// Accept submissions but never confirm them.
    pub never_confirm: bool,
    /// Reject every submission with a contract error.
    pub reject: Option<ContractError>,
}

impl FaultPlan {
    /// Fail the next `n` submissions, then behave normally.
    pub fn failing(n: u32) -> Self {
        Self {
            failing_submissions: n,
            ..Self::default()
        }
    }

    /// Accept submissions but leave them unconfirmed forever.
    pub fn stalled() -> Self {
        Self {
            never_confirm: true,
            ..Self::default()
        }
    }

    /// Reject every submission with a contract error.
    pub fn rejecting(error: ContractError) -> Self {
        Self {
            reject: Some(error),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct PendingTx {
    receipt: Receipt,
    /// Confirmation polls left before the receipt is handed out.
    polls_remaining: u32,
    /// Stalled transactions never confirm.
    stalled: bool,
}

#[derive(Debug, Default)]
struct Inner {
    nonce: u64,
    contracts: HashMap<Address, ContractInstance>,
    txs: HashMap<TxRef, PendingTx>,
    faults: HashMap<String, FaultPlan>,
    /// Labels of accepted submissions, in acceptance order.
    log: Vec<String>,
}

/// In-memory [`LedgerClient`] implementation.
#[derive(Debug)]
pub struct MemoryLedger {
    settings: LedgerSettings,
    confirmation_delay: u32,
    submissions: AtomicU64,
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            settings,
            confirmation_delay: 1,
            submissions: AtomicU64::new(0),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of confirmation polls a transaction stays pending for.
    pub fn with_confirmation_delay(mut self, polls: u32) -> Self {
        self.confirmation_delay = polls;
        self
    }

    /// Inject a fault plan for submissions labelled `label`.
    pub fn inject_fault(&self, label: impl Into<String>, plan: FaultPlan) {
        self.inner.lock().unwrap().faults.insert(label.into(), plan);
    }

    /// Total accepted submissions, deployments and calls alike.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Labels of accepted submissions, in acceptance order.
    pub fn submission_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    /// Snapshot of the contract deployed at `address`.
    pub fn contract(&self, address: Address) -> Option<ContractInstance> {
        self.inner.lock().unwrap().contracts.get(&address).cloned()
    }

    fn next_address(&self, inner: &mut Inner) -> Address {
        inner.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.settings.network_id.to_be_bytes());
        hasher.update(inner.nonce.to_be_bytes());
        let digest = hasher.finalize();
        Address::from_slice(&digest[..Address::len_bytes()])
    }

    fn next_tx(&self, inner: &mut Inner, contract_address: Option<Address>, stalled: bool) -> TxRef {
        let mut hasher = Sha256::new();
        hasher.update(b"tx");
        hasher.update(self.settings.network_id.to_be_bytes());
        hasher.update(inner.nonce.to_be_bytes());
        hasher.update(inner.txs.len().to_be_bytes());
        let tx = TxRef(B256::from_slice(&hasher.finalize()));
        inner.txs.insert(
            tx,
            PendingTx {
                receipt: Receipt {
                    tx,
                    contract_address,
                },
                polls_remaining: self.confirmation_delay,
                stalled,
            },
        );
        tx
    }

    /// Apply the fault plan for a label. Returns whether the transaction
    /// should stall unconfirmed.
    fn check_faults(&self, inner: &mut Inner, label: &str) -> Result<bool, LedgerError> {
        let Some(plan) = inner.faults.get_mut(label) else {
            return Ok(false);
        };
        if plan.failing_submissions > 0 {
            plan.failing_submissions -= 1;
            return Err(LedgerError::Submission(format!(
                "connection reset while submitting `{label}`"
            )));
        }
        if let Some(error) = plan.reject {
            return Err(LedgerError::Rejected(error));
        }
        Ok(plan.never_confirm)
    }
}

impl LedgerClient for MemoryLedger {
    async fn submit_deployment(&self, request: DeployRequest) -> Result<TxRef, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let stalled = self.check_faults(&mut inner, &request.label)?;

        if request.gas > self.settings.gas_ceiling {
            return Err(LedgerError::GasCeiling {
                wanted: request.gas,
                ceiling: self.settings.gas_ceiling,
            });
        }

        let address = self.next_address(&mut inner);
        let instance = ContractInstance::instantiate(
            request.kind,
            &request.creation_code,
            &request.constructor_args,
        );
        inner.contracts.insert(address, instance);
        let tx = self.next_tx(&mut inner, Some(address), stalled);
        inner.log.push(request.label.clone());
        self.submissions.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            label = %request.label,
            kind = %request.kind,
            address = %address,
            tx = %tx,
            "Deployment submitted"
        );
        Ok(tx)
    }

    async fn submit_call(&self, call: ContractCall) -> Result<TxRef, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let stalled = self.check_faults(&mut inner, &call.label)?;

        let mut created = None;
        match &call.kind {
            CallKind::Initialize { args } => {
                let instance = inner
                    .contracts
                    .get_mut(&call.to)
                    .ok_or(LedgerError::NoContract(call.to))?;
                instance.initialize(args)?;
            }
            CallKind::SetBytecode { payload } => {
                let instance = inner
                    .contracts
                    .get_mut(&call.to)
                    .ok_or(LedgerError::NoContract(call.to))?;
                let outcome = instance.set_bytecode(payload.clone())?;
                tracing::debug!(label = %call.label, outcome = %outcome, "Bytecode install executed");
            }
            CallKind::CreateProxy => {
                let address = self.next_address(&mut inner);
                let instance = inner
                    .contracts
                    .get_mut(&call.to)
                    .ok_or(LedgerError::NoContract(call.to))?;
                let proxy = instance.create_proxy(address)?;
                inner.contracts.insert(address, ContractInstance::Proxy(proxy));
                created = Some(address);
            }
            CallKind::Forward { target } => {
                let instance = inner
                    .contracts
                    .get_mut(&call.to)
                    .ok_or(LedgerError::NoContract(call.to))?;
                instance.forward(*target)?;
            }
        }

        let tx = self.next_tx(&mut inner, created, stalled);
        inner.log.push(call.label.clone());
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(tx)
    }

    async fn confirmation(&self, tx: TxRef) -> Result<Option<Receipt>, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let pending = inner
            .txs
            .get_mut(&tx)
            .ok_or(LedgerError::UnknownTransaction(tx))?;
        if pending.stalled {
            return Ok(None);
        }
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return Ok(None);
        }
        Ok(Some(pending.receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::Bytes;
    use crate::artifacts::{BytecodePayload, ContractKind};

    fn ledger() -> MemoryLedger {
        MemoryLedger::new(LedgerSettings::ganache_dev()).with_confirmation_delay(0)
    }

    fn deploy_request(label: &str, kind: ContractKind) -> DeployRequest {
        DeployRequest {
            label: label.to_string(),
            kind,
            creation_code: Bytes::from(vec![0x60, 0x80]),
            constructor_args: Bytes::new(),
            gas: 1_000_000,
            gas_price: 1,
            from: Address::ZERO,
        }
    }

    async fn deploy(ledger: &MemoryLedger, label: &str, kind: ContractKind) -> Address {
        let tx = ledger.submit_deployment(deploy_request(label, kind)).await.unwrap();
        ledger
            .confirmation(tx)
            .await
            .unwrap()
            .unwrap()
            .contract_address
            .unwrap()
    }

    #[tokio::test]
    async fn deploys_are_deterministic_and_confirmable() {
        let ledger = ledger();
        let address = deploy(&ledger, "registry", ContractKind::Registry).await;
        assert!(matches!(
            ledger.contract(address),
            Some(ContractInstance::Registry(_))
        ));
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn confirmation_delay_keeps_receipts_pending() {
        let ledger = MemoryLedger::new(LedgerSettings::ganache_dev()).with_confirmation_delay(2);
        let tx = ledger
            .submit_deployment(deploy_request("registry", ContractKind::Registry))
            .await
            .unwrap();
        assert!(ledger.confirmation(tx).await.unwrap().is_none());
        assert!(ledger.confirmation(tx).await.unwrap().is_none());
        assert!(ledger.confirmation(tx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transient_faults_clear_after_the_planned_failures() {
        let ledger = ledger();
        ledger.inject_fault("registry", FaultPlan::failing(2));

        for _ in 0..2 {
            let err = ledger
                .submit_deployment(deploy_request("registry", ContractKind::Registry))
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        ledger
            .submit_deployment(deploy_request("registry", ContractKind::Registry))
            .await
            .unwrap();
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn initialize_rejections_surface_as_contract_errors() {
        let ledger = ledger();
        let address = deploy(&ledger, "factory", ContractKind::Factory).await;
        let call = ContractCall {
            label: "factory".to_string(),
            to: address,
            kind: CallKind::Initialize {
                args: vec![Address::repeat_byte(0x01)],
            },
            from: Address::ZERO,
        };
        ledger.submit_call(call.clone()).await.unwrap();
        let err = ledger.submit_call(call).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(ContractError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn create_proxy_stamps_an_instance_with_current_logic() {
        let ledger = ledger();
        let factory = deploy(&ledger, "factory", ContractKind::Factory).await;

        ledger
            .submit_call(ContractCall {
                label: "factory".to_string(),
                to: factory,
                kind: CallKind::Initialize {
                    args: vec![Address::repeat_byte(0x01)],
                },
                from: Address::ZERO,
            })
            .await
            .unwrap();

        let payload = BytecodePayload::new(vec![0xAA, 0xBB]);
        ledger
            .submit_call(ContractCall {
                label: "factory".to_string(),
                to: factory,
                kind: CallKind::SetBytecode {
                    payload: payload.clone(),
                },
                from: Address::ZERO,
            })
            .await
            .unwrap();

        let tx = ledger
            .submit_call(ContractCall {
                label: "factory".to_string(),
                to: factory,
                kind: CallKind::CreateProxy,
                from: Address::ZERO,
            })
            .await
            .unwrap();
        let proxy_address = ledger
            .confirmation(tx)
            .await
            .unwrap()
            .unwrap()
            .contract_address
            .unwrap();

        match ledger.contract(proxy_address) {
            Some(ContractInstance::Proxy(proxy)) => {
                assert_eq!(proxy.logic_version(), payload.version)
            }
            other => panic!("expected a proxy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gas_ceiling_is_enforced() {
        let ledger = ledger();
        let mut request = deploy_request("registry", ContractKind::Registry);
        request.gas = LedgerSettings::ganache_dev().gas_ceiling + 1;
        let err = ledger.submit_deployment(request).await.unwrap_err();
        assert!(matches!(err, LedgerError::GasCeiling { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unknown_transactions_are_rejected() {
        let ledger = ledger();
        let bogus = TxRef(B256::repeat_byte(0xFF));
        assert!(matches!(
            ledger.confirmation(bogus).await,
            Err(LedgerError::UnknownTransaction(_))
        ));
    }
}
