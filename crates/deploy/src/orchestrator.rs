//! The deployment orchestrator.
//!
//! Drives a sealed dependency graph against a ledger client: wave by wave,
//! a node is submitted only once every dependency is confirmed, independent
//! nodes confirm concurrently, and the bytecode install into the factory runs
//! as the final step once the whole graph is live. Already-confirmed nodes
//! from a prior run are reused, never resubmitted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use alloy_core::primitives::Address;
use backon::Retryable;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;

use crate::artifacts::{ArtifactSet, BytecodePayload, BytecodeStore, ContractKind};
use crate::config::RunConfig;
use crate::contracts::InstallOutcome;
use crate::error::{ContractError, DeployError, LedgerError, RunFailure};
use crate::graph::{ContractSpec, InitArg, SealedGraph};
use crate::ledger::{CallKind, ContractCall, DeployRequest, LedgerClient, Receipt, TxRef};
use crate::records::{AddressBook, DeployStatus, DeploymentRecord, InstallRecord, RunReport};

/// Run-level cancellation switch.
///
/// Cancelling stops the orchestrator from waiting further or submitting new
/// transactions; anything already submitted stays on the ledger.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of the cancellation switch, observed by in-flight waits.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires, for runs without external cancellation.
    pub fn dormant() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation fires. Never resolves on a dormant signal.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Handle dropped without ever firing.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked cancellation handle/signal pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// A deferred bytecode installation: runs only once both the factory address
/// and the payload are known, i.e. after the whole graph completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    /// Graph node name of the target factory.
    pub factory: String,
    /// Name of the payload in the bytecode store.
    pub payload: String,
}

impl InstallStep {
    pub fn new(factory: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            payload: payload.into(),
        }
    }

    fn label(&self) -> String {
        format!("{} bytecode", self.factory)
    }
}

/// Outcome of one node's confirm-and-initialize pipeline.
struct NodeOutcome {
    name: String,
    attempts: u32,
    tx: Option<TxRef>,
    address: Option<Address>,
    confirmed_at: Option<DateTime<Utc>>,
    result: Result<(), DeployError>,
}

/// Top-level driver for one provisioning run.
///
/// The orchestrator exclusively owns the deployment record table for the
/// duration of the run; callers observe state only through the final
/// [`RunReport`].
pub struct Orchestrator<L: LedgerClient> {
    config: RunConfig,
    ledger: L,
    graph: SealedGraph,
    artifacts: ArtifactSet,
    store: BytecodeStore,
    installs: Vec<InstallStep>,
    book: AddressBook,
    cancel: CancelSignal,
}

impl<L: LedgerClient> Orchestrator<L> {
    pub fn new(config: RunConfig, ledger: L, graph: SealedGraph, artifacts: ArtifactSet) -> Self {
        Self {
            config,
            ledger,
            graph,
            artifacts,
            store: BytecodeStore::new(),
            installs: Vec::new(),
            book: AddressBook::new(),
            cancel: CancelSignal::dormant(),
        }
    }

    /// Provide the payload store and the install steps to run after the
    /// graph completes.
    pub fn with_bytecode(mut self, store: BytecodeStore, installs: Vec<InstallStep>) -> Self {
        self.store = store;
        self.installs = installs;
        self
    }

    /// Seed the run with a prior address book. Nodes recorded there are
    /// reused instead of resubmitted.
    pub fn with_address_book(mut self, book: AddressBook) -> Self {
        self.book = book;
        self
    }

    /// Attach an external cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Access the ledger client, e.g. to inspect state after a dry-run.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Execute the run. On failure the returned [`RunFailure`] still carries
    /// the terminal state of every node.
    pub async fn run(mut self) -> Result<RunReport, RunFailure> {
        let mut records = self.seed_records();

        if let Err(error) = self.validate() {
            let skipped = mark_pending_skipped(&mut records, "run aborted before submission");
            return Err(RunFailure {
                failed: "preflight".to_string(),
                cause: Box::new(error),
                skipped,
                report: self.into_report(records, Vec::new()),
            });
        }

        tracing::info!(
            nodes = self.graph.len(),
            waves = self.graph.waves().len(),
            network_id = self.config.ledger.network_id,
            "Starting provisioning run..."
        );

        let mut abort: Option<(String, DeployError)> = None;

        for (wave_index, wave) in self.graph.waves().to_vec().into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            let runnable = self.partition_wave(&wave, &mut records);
            if runnable.is_empty() {
                continue;
            }

            tracing::info!(wave = wave_index, nodes = ?runnable, "Deploying wave...");

            for outcome in self.deploy_wave(&runnable, &mut records).await {
                let record = records.get_mut(&outcome.name).expect("record exists");
                record.attempts = outcome.attempts;
                if outcome.tx.is_some() {
                    record.tx = outcome.tx;
                }
                record.confirmed_at = outcome.confirmed_at;
                match outcome.result {
                    Ok(()) => {
                        record.status = DeployStatus::Confirmed;
                        record.address = outcome.address;
                    }
                    Err(error) => {
                        record.status = DeployStatus::Failed;
                        record.error = Some(error.to_string());
                        tracing::error!(node = %outcome.name, error = %error, "Deployment failed");
                        // The first failure is the root cause, except that a
                        // structural error is never displaced by a later one.
                        let displace = match &abort {
                            None => true,
                            Some((_, existing)) => {
                                !is_structural(existing) && is_structural(&error)
                            }
                        };
                        if displace {
                            abort = Some((outcome.name.clone(), error));
                        }
                    }
                }
            }

            // Structural errors indicate a wiring bug, not chain weather;
            // stop submitting anything further.
            if abort.as_ref().is_some_and(|(_, e)| is_structural(e)) {
                break;
            }
        }

        // Anything still pending is downstream of a failure, a cancellation,
        // or a structural abort.
        let skipped = mark_pending_skipped(&mut records, "dependency not confirmed");

        let mut installs = Vec::new();
        if abort.is_none() && skipped.is_empty() {
            match self.run_installs(&records).await {
                Ok(done) => installs = done,
                Err((step, error)) => abort = Some((step, error)),
            }
        }

        let report = self.into_report(records, installs);
        match abort {
            None if report.succeeded() => {
                tracing::info!("Provisioning complete");
                Ok(report)
            }
            abort => {
                // An unset abort here means cancellation fired between waves
                // without catching any node in flight.
                let (failed, cause) = abort.unwrap_or_else(|| {
                    let node = "run".to_string();
                    (node.clone(), DeployError::Cancelled { node })
                });
                Err(RunFailure {
                    failed,
                    cause: Box::new(cause),
                    skipped,
                    report,
                })
            }
        }
    }

    /// Build the initial record table: `Pending` everywhere, except nodes
    /// already confirmed in the prior address book.
    fn seed_records(&self) -> BTreeMap<String, DeploymentRecord> {
        self.graph
            .specs()
            .iter()
            .map(|spec| {
                let record = match self.book.address(&spec.name) {
                    Some(address) => {
                        tracing::info!(
                            node = %spec.name,
                            address = %address,
                            "Confirmed in a prior run, reusing"
                        );
                        DeploymentRecord::reused(&spec.name, address)
                    }
                    None => DeploymentRecord::pending(&spec.name),
                };
                (spec.name.clone(), record)
            })
            .collect()
    }

    /// Fail fast on anything resolvable before touching the ledger.
    fn validate(&self) -> Result<(), DeployError> {
        for spec in self.graph.specs() {
            self.artifacts.get(spec.kind)?;
        }
        for step in &self.installs {
            self.store.latest(&step.payload)?;
            match self.graph.spec(&step.factory) {
                None => {
                    return Err(DeployError::UnknownDependency {
                        node: step.label(),
                        dependency: step.factory.clone(),
                    });
                }
                Some(spec) if spec.kind != ContractKind::Factory => {
                    return Err(DeployError::NotAFactory {
                        node: step.factory.clone(),
                        kind: spec.kind,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Split a wave into the nodes to deploy now. Nodes with a failed or
    /// skipped dependency are marked `Skipped` in place.
    fn partition_wave(
        &self,
        wave: &[String],
        records: &mut BTreeMap<String, DeploymentRecord>,
    ) -> Vec<String> {
        let mut runnable = Vec::new();
        for name in wave {
            if records[name].status != DeployStatus::Pending {
                continue;
            }
            let blocked = self
                .graph
                .dependencies(name)
                .into_iter()
                .find(|dep| !records[*dep].is_confirmed())
                .map(str::to_string);
            match blocked {
                Some(dep) => {
                    let record = records.get_mut(name).expect("record exists");
                    record.status = DeployStatus::Skipped;
                    record.error = Some(format!("dependency `{dep}` not confirmed"));
                    tracing::warn!(node = %name, dependency = %dep, "Skipping, dependency unresolved");
                }
                None => runnable.push(name.clone()),
            }
        }
        runnable
    }

    /// Deploy all nodes of a wave: submissions run in order, confirmations
    /// and initializations are awaited concurrently.
    async fn deploy_wave(
        &self,
        runnable: &[String],
        records: &mut BTreeMap<String, DeploymentRecord>,
    ) -> Vec<NodeOutcome> {
        let mut confirming = Vec::new();
        let mut outcomes = Vec::new();

        for name in runnable {
            let spec = self.graph.spec(name).expect("validated");
            let init_args = match self.resolve_init_args(name, records) {
                Ok(args) => args,
                Err(error) => {
                    outcomes.push(failed_outcome(name, 0, error));
                    continue;
                }
            };

            match self.submit_node(name, spec).await {
                Ok((tx, attempts)) => {
                    let record = records.get_mut(name).expect("record exists");
                    record.status = DeployStatus::Submitted;
                    record.tx = Some(tx);
                    record.attempts = attempts;
                    record.submitted_at = Some(Utc::now());
                    confirming.push((name.clone(), tx, attempts, init_args));
                }
                Err((attempts, error)) => {
                    outcomes.push(failed_outcome(name, attempts, error));
                }
            }
        }

        let futures = confirming.into_iter().map(|(name, tx, attempts, init_args)| {
            self.confirm_and_initialize(name, tx, attempts, init_args)
        });
        outcomes.extend(join_all(futures).await);
        outcomes
    }

    /// Submit one node's creation transaction, retrying transient failures
    /// with exponential backoff.
    async fn submit_node(
        &self,
        name: &str,
        spec: &ContractSpec,
    ) -> Result<(TxRef, u32), (u32, DeployError)> {
        let artifact = self.artifacts.get(spec.kind).expect("validated");
        let request = DeployRequest {
            label: name.to_string(),
            kind: spec.kind,
            creation_code: artifact.creation_code.clone(),
            constructor_args: spec.constructor_args.clone(),
            gas: spec.gas.unwrap_or(self.config.ledger.gas_ceiling),
            gas_price: self.config.ledger.gas_price,
            from: self.config.ledger.deployer(),
        };

        let attempts = AtomicU32::new(0);
        let result = self
            .submit_with_retry(name, &attempts, || {
                let request = request.clone();
                async move { self.ledger.submit_deployment(request).await }
            })
            .await;

        match result {
            Ok(tx) => Ok((tx, attempts.load(Ordering::Relaxed))),
            Err(error) => {
                let tries = attempts.load(Ordering::Relaxed);
                Err((tries, error))
            }
        }
    }

    /// Retry a submission closure under the configured backoff, observing
    /// cancellation between attempts.
    async fn submit_with_retry<F, Fut>(
        &self,
        name: &str,
        attempts: &AtomicU32,
        submit: F,
    ) -> Result<TxRef, DeployError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<TxRef, LedgerError>>,
    {
        let mut submit = submit;
        let counted = || {
            attempts.fetch_add(1, Ordering::Relaxed);
            submit()
        };

        let mut cancel = self.cancel.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(DeployError::Cancelled { node: name.to_string() });
            }
            result = counted
                .retry(self.config.retry.backoff())
                .when(LedgerError::is_transient)
                .notify(|error, delay| {
                    tracing::warn!(node = %name, error = %error, retry_in = ?delay, "Submission failed, retrying...");
                }) => result,
        };

        result.map_err(|error| classify(name, attempts.load(Ordering::Relaxed), error))
    }

    /// Await a node's confirmation, then run its `initialize` call.
    async fn confirm_and_initialize(
        &self,
        name: String,
        tx: TxRef,
        attempts: u32,
        init_args: Option<Vec<Address>>,
    ) -> NodeOutcome {
        let mut outcome = NodeOutcome {
            name: name.clone(),
            attempts,
            tx: Some(tx),
            address: None,
            confirmed_at: None,
            result: Ok(()),
        };

        let receipt = match self.await_confirmation(&name, tx).await {
            Ok(receipt) => receipt,
            Err(error) => {
                outcome.result = Err(error);
                return outcome;
            }
        };
        let Some(address) = receipt.contract_address else {
            outcome.result = Err(DeployError::Submission {
                node: name.clone(),
                attempts,
                source: LedgerError::Submission("creation receipt carries no address".to_string()),
            });
            return outcome;
        };
        outcome.address = Some(address);
        outcome.confirmed_at = Some(Utc::now());
        tracing::info!(node = %name, address = %address, "Confirmed");

        if let Some(args) = init_args {
            if let Err(error) = self.initialize_node(&name, address, args).await {
                outcome.result = Err(error);
                return outcome;
            }
        }

        outcome
    }

    /// Submit and confirm a node's `initialize` call.
    async fn initialize_node(
        &self,
        name: &str,
        address: Address,
        args: Vec<Address>,
    ) -> Result<(), DeployError> {
        let call = ContractCall {
            label: name.to_string(),
            to: address,
            kind: CallKind::Initialize { args },
            from: self.config.ledger.deployer(),
        };

        let attempts = AtomicU32::new(0);
        let tx = self
            .submit_with_retry(name, &attempts, || {
                let call = call.clone();
                async move { self.ledger.submit_call(call).await }
            })
            .await?;

        self.await_confirmation(name, tx).await?;
        tracing::info!(node = %name, "Initialized");
        Ok(())
    }

    /// Poll until the transaction confirms or the bounded wait elapses.
    /// Suspends between polls; cancellation aborts the wait.
    async fn await_confirmation(&self, name: &str, tx: TxRef) -> Result<Receipt, DeployError> {
        let started = Instant::now();
        let mut cancel = self.cancel.clone();
        loop {
            match self.ledger.confirmation(tx).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {
                    tracing::trace!(node = %name, tx = %tx, "Not yet confirmed");
                }
                Err(error) if error.is_transient() => {
                    tracing::trace!(node = %name, error = %error, "Confirmation poll failed");
                }
                Err(error) => return Err(classify(name, 0, error)),
            }

            if started.elapsed() >= self.config.confirmation_timeout {
                return Err(DeployError::ConfirmationTimeout {
                    node: name.to_string(),
                    waited: started.elapsed(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DeployError::Cancelled { node: name.to_string() });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Resolve a spec's init args against confirmed records.
    fn resolve_init_args(
        &self,
        name: &str,
        records: &BTreeMap<String, DeploymentRecord>,
    ) -> Result<Option<Vec<Address>>, DeployError> {
        let Some(init) = &self.graph.spec(name).expect("validated").init else {
            return Ok(None);
        };
        let mut resolved = Vec::with_capacity(init.len());
        for arg in init {
            match arg {
                InitArg::Address(address) => resolved.push(*address),
                InitArg::DependencyAddress(dep) => {
                    let address = records
                        .get(dep)
                        .filter(|r| r.is_confirmed())
                        .and_then(|r| r.address)
                        .ok_or_else(|| DeployError::MissingDependency {
                            node: name.to_string(),
                            dependency: dep.clone(),
                        })?;
                    resolved.push(address);
                }
            }
        }
        Ok(Some(resolved))
    }

    /// The final step: push payloads into their factories. Steps whose
    /// version the address book already shows as installed are skipped;
    /// a differing recorded version is replaced, last writer wins.
    async fn run_installs(
        &mut self,
        records: &BTreeMap<String, DeploymentRecord>,
    ) -> Result<Vec<InstallRecord>, (String, DeployError)> {
        let mut done = Vec::new();
        for step in self.installs.clone() {
            let payload = self.store.latest(&step.payload).expect("validated").clone();
            let factory_address = records
                .get(&step.factory)
                .and_then(|r| r.address)
                .ok_or_else(|| {
                    (
                        step.label(),
                        DeployError::MissingDependency {
                            node: step.label(),
                            dependency: step.factory.clone(),
                        },
                    )
                })?;

            let previous = self.book.installed_version(&step.factory);
            if previous == Some(payload.version) {
                tracing::info!(
                    factory = %step.factory,
                    version = %payload.version.short(),
                    "Bytecode already installed, skipping"
                );
                done.push(InstallRecord {
                    factory: step.factory.clone(),
                    payload: step.payload.clone(),
                    version: payload.version,
                    submitted: false,
                    replaced: None,
                });
                continue;
            }
            if let Some(previous) = previous {
                tracing::warn!(
                    factory = %step.factory,
                    previous = %previous.short(),
                    current = %payload.version.short(),
                    "Version conflict, replacing installed bytecode"
                );
            }

            let version = payload.version;
            self.install_payload(&step, factory_address, payload)
                .await
                .map_err(|e| (step.label(), e))?;

            let outcome = match previous {
                Some(p) => InstallOutcome::Replaced {
                    previous: p,
                    current: version,
                },
                None => InstallOutcome::Installed(version),
            };
            tracing::info!(factory = %step.factory, outcome = %outcome, "Bytecode installed");

            self.book.record_install(&step.factory, version);
            done.push(InstallRecord {
                factory: step.factory.clone(),
                payload: step.payload.clone(),
                version,
                submitted: true,
                replaced: previous,
            });
        }
        Ok(done)
    }

    /// Submit and confirm one `setBytecode` call.
    async fn install_payload(
        &self,
        step: &InstallStep,
        factory: Address,
        payload: BytecodePayload,
    ) -> Result<(), DeployError> {
        let label = step.label();
        let call = ContractCall {
            label: label.clone(),
            to: factory,
            kind: CallKind::SetBytecode { payload },
            from: self.config.ledger.deployer(),
        };

        let attempts = AtomicU32::new(0);
        let tx = self
            .submit_with_retry(&label, &attempts, || {
                let call = call.clone();
                async move { self.ledger.submit_call(call).await }
            })
            .await?;

        self.await_confirmation(&label, tx).await?;
        Ok(())
    }

    fn into_report(
        &self,
        records: BTreeMap<String, DeploymentRecord>,
        installs: Vec<InstallRecord>,
    ) -> RunReport {
        // Report rows follow graph insertion order, not map order.
        let ordered = self
            .graph
            .specs()
            .iter()
            .map(|spec| records[&spec.name].clone())
            .collect();
        RunReport::new(ordered, installs)
    }
}

/// Map a terminal ledger error onto the orchestrator taxonomy.
fn classify(name: &str, attempts: u32, error: LedgerError) -> DeployError {
    match error {
        LedgerError::Rejected(ContractError::AlreadyInitialized) => {
            DeployError::AlreadyInitialized {
                node: name.to_string(),
            }
        }
        other => DeployError::Submission {
            node: name.to_string(),
            attempts,
            source: other,
        },
    }
}

/// Structural errors abort the run; everything else only fails the node and
/// its dependents.
fn is_structural(error: &DeployError) -> bool {
    matches!(
        error,
        DeployError::AlreadyInitialized { .. } | DeployError::MissingDependency { .. }
    )
}

fn failed_outcome(name: &str, attempts: u32, error: DeployError) -> NodeOutcome {
    NodeOutcome {
        name: name.to_string(),
        attempts,
        tx: None,
        address: None,
        confirmed_at: None,
        result: Err(error),
    }
}

/// Mark every still-pending record `Skipped` and return every unresolved
/// (skipped) name.
fn mark_pending_skipped(
    records: &mut BTreeMap<String, DeploymentRecord>,
    reason: &str,
) -> Vec<String> {
    let mut skipped = Vec::new();
    for record in records.values_mut() {
        match record.status {
            DeployStatus::Pending => {
                record.status = DeployStatus::Skipped;
                record.error = Some(reason.to_string());
                skipped.push(record.name.clone());
            }
            DeployStatus::Skipped => skipped.push(record.name.clone()),
            _ => {}
        }
    }
    skipped
}
