//! Deployment records, the persistable address book, and the run report.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use alloy_core::primitives::Address;
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::artifacts::BytecodeVersion;
use crate::error::DeployError;
use crate::ledger::TxRef;

/// Terminal and in-flight states of a node during a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DeployStatus {
    /// Not yet submitted.
    Pending,
    /// Submitted, awaiting confirmation.
    Submitted,
    /// Durably accepted; the address is trustworthy for dependents.
    Confirmed,
    /// Submission exhausted its retries, confirmation timed out, or the run
    /// was cancelled while this node was in flight.
    Failed,
    /// Never submitted because a transitive dependency failed.
    Skipped,
}

/// Per-node ledger of one run. Created when the run starts, mutated only by
/// the orchestrator, never deleted within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub status: DeployStatus,
    /// Set once the creation transaction confirms.
    pub address: Option<Address>,
    /// The creation transaction, once submitted.
    pub tx: Option<TxRef>,
    /// Submission attempts, including retries.
    pub attempts: u32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Human-readable failure cause, for failed and skipped nodes.
    pub error: Option<String>,
}

impl DeploymentRecord {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: DeployStatus::Pending,
            address: None,
            tx: None,
            attempts: 0,
            submitted_at: None,
            confirmed_at: None,
            error: None,
        }
    }

    /// A record pre-seeded from a prior run's address book.
    pub fn reused(name: impl Into<String>, address: Address) -> Self {
        Self {
            status: DeployStatus::Confirmed,
            address: Some(address),
            ..Self::pending(name)
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == DeployStatus::Confirmed
    }
}

/// Confirmed addresses and installed bytecode versions of prior runs.
///
/// Feeding a book into the orchestrator makes a re-run idempotent: nodes with
/// a recorded address are not resubmitted, and an install step whose version
/// already matches is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    /// Node name to confirmed address.
    addresses: BTreeMap<String, Address>,
    /// Factory node name to the bytecode version installed into it.
    bytecode: BTreeMap<String, BytecodeVersion>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.addresses.get(name).copied()
    }

    pub fn record_address(&mut self, name: impl Into<String>, address: Address) {
        self.addresses.insert(name.into(), address);
    }

    pub fn installed_version(&self, factory: &str) -> Option<BytecodeVersion> {
        self.bytecode.get(factory).copied()
    }

    pub fn record_install(&mut self, factory: impl Into<String>, version: BytecodeVersion) {
        self.bytecode.insert(factory.into(), version);
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.bytecode.is_empty()
    }

    /// Save the book to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DeployError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeployError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| DeployError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Address book saved");
        Ok(())
    }

    /// Load a book from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path).map_err(|source| DeployError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| DeployError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Outcome of one bytecode install step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRecord {
    /// The factory node the payload went into.
    pub factory: String,
    /// The published payload name.
    pub payload: String,
    /// The version that is current after the step.
    pub version: BytecodeVersion,
    /// False when the step was skipped because the book already showed the
    /// version as installed.
    pub submitted: bool,
    /// The differing version the install displaced, when one was recorded.
    pub replaced: Option<BytecodeVersion>,
}

/// Final state of every node and install step of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    records: Vec<DeploymentRecord>,
    installs: Vec<InstallRecord>,
}

impl RunReport {
    pub fn new(records: Vec<DeploymentRecord>, installs: Vec<InstallRecord>) -> Self {
        Self { records, installs }
    }

    /// Records in graph insertion order.
    pub fn records(&self) -> &[DeploymentRecord] {
        &self.records
    }

    pub fn installs(&self) -> &[InstallRecord] {
        &self.installs
    }

    pub fn record(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// The confirmed address of a node.
    pub fn address(&self, name: &str) -> Option<Address> {
        self.record(name).and_then(|r| r.address)
    }

    /// True iff every node confirmed.
    pub fn succeeded(&self) -> bool {
        self.records.iter().all(DeploymentRecord::is_confirmed)
    }

    /// Names of nodes in a given state.
    pub fn with_status(&self, status: DeployStatus) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Distill the report into an address book for the next run.
    pub fn address_book(&self) -> AddressBook {
        let mut book = AddressBook::new();
        for record in &self.records {
            if let (DeployStatus::Confirmed, Some(address)) = (record.status, record.address) {
                book.record_address(&record.name, address);
            }
        }
        for install in &self.installs {
            book.record_install(&install.factory, install.version);
        }
        book
    }

    /// Render the report as a table.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["contract", "status", "address", "attempts", "detail"]);
        for record in &self.records {
            table.add_row(vec![
                record.name.clone(),
                record.status.to_string(),
                record
                    .address
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                record.attempts.to_string(),
                record.error.clone().unwrap_or_default(),
            ]);
        }
        for install in &self.installs {
            let detail = if install.submitted {
                match install.replaced {
                    Some(previous) => format!("replaced {}", previous.short()),
                    None => "installed".to_string(),
                }
            } else {
                "already current".to_string()
            };
            table.add_row(vec![
                format!("{} bytecode", install.factory),
                install.version.short(),
                "-".to_string(),
                "-".to_string(),
                detail,
            ]);
        }
        table.to_string()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(name: &str, byte: u8) -> DeploymentRecord {
        DeploymentRecord {
            status: DeployStatus::Confirmed,
            address: Some(Address::repeat_byte(byte)),
            ..DeploymentRecord::pending(name)
        }
    }

    #[test]
    fn report_success_requires_every_node_confirmed() {
        let mut failed = DeploymentRecord::pending("factory");
        failed.status = DeployStatus::Failed;
        failed.error = Some("confirmation timed out".to_string());

        let report = RunReport::new(vec![confirmed("registry", 0x01), failed], Vec::new());
        assert!(!report.succeeded());
        assert_eq!(report.with_status(DeployStatus::Failed), vec!["factory"]);

        let report = RunReport::new(vec![confirmed("registry", 0x01)], Vec::new());
        assert!(report.succeeded());
    }

    #[test]
    fn address_book_round_trips_through_toml() {
        let mut book = AddressBook::new();
        book.record_address("registry", Address::repeat_byte(0x01));
        book.record_address("factory", Address::repeat_byte(0x02));
        book.record_install("factory", BytecodeVersion::of(&[0x60, 0x80]));

        let dir = std::env::temp_dir().join("stampede-book-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("addresses.toml");
        book.save_to_file(&path).unwrap();
        let loaded = AddressBook::load_from_file(&path).unwrap();
        assert_eq!(loaded, book);
    }

    #[test]
    fn report_distills_into_a_book() {
        let mut records = vec![confirmed("registry", 0x01), confirmed("factory", 0x02)];
        records.push(DeploymentRecord::pending("proxy"));
        let version = BytecodeVersion::of(&[0x01]);
        let installs = vec![InstallRecord {
            factory: "factory".to_string(),
            payload: "proxy-logic".to_string(),
            version,
            submitted: true,
            replaced: None,
        }];

        let book = RunReport::new(records, installs).address_book();
        assert_eq!(book.address("registry"), Some(Address::repeat_byte(0x01)));
        assert_eq!(book.address("proxy"), None);
        assert_eq!(book.installed_version("factory"), Some(version));
    }

    #[test]
    fn render_mentions_every_node() {
        let report = RunReport::new(
            vec![confirmed("registry", 0x01), DeploymentRecord::pending("proxy")],
            Vec::new(),
        );
        let rendered = report.render();
        assert!(rendered.contains("registry"));
        assert!(rendered.contains("proxy"));
        assert!(rendered.contains("confirmed"));
        assert!(rendered.contains("pending"));
    }
}
