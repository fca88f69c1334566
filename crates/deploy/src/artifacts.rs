//! Typed contract artifacts and versioned bytecode payloads.
//!
//! The artifact set is the compile-time registry: every contract kind the
//! graph can reference maps to exactly one compiled interface, resolved once
//! at startup instead of looked up by string at each use site.

use std::collections::HashMap;
use std::fmt;

use alloy_core::primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DeployError;

/// The contract kinds the provisioning graph can deploy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ContractKind {
    /// Identity registry. External collaborator: only its `initialize`
    /// entry point and confirmed address matter here.
    Registry,
    /// Forwarding indirection between a proxy and its ultimate target.
    Router,
    /// Holds the current logic payload and stamps out proxy instances.
    Factory,
    /// Delegate-execution unit with its own storage.
    Proxy,
}

/// A compiled contract interface: the creation code plus the name it was
/// compiled under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Which node kind this artifact backs.
    pub kind: ContractKind,
    /// The contract name in the compiled output, e.g. `EthereumDIDRegistry`.
    pub contract_name: String,
    /// Creation bytecode submitted on deployment.
    pub creation_code: Bytes,
}

impl Artifact {
    pub fn new(kind: ContractKind, contract_name: impl Into<String>, creation_code: impl Into<Bytes>) -> Self {
        Self {
            kind,
            contract_name: contract_name.into(),
            creation_code: creation_code.into(),
        }
    }
}

/// Registry mapping each [`ContractKind`] to its compiled artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactSet {
    artifacts: HashMap<ContractKind, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact, replacing any previous one of the same kind.
    pub fn insert(&mut self, artifact: Artifact) -> Option<Artifact> {
        self.artifacts.insert(artifact.kind, artifact)
    }

    /// Resolve the artifact for a kind.
    pub fn get(&self, kind: ContractKind) -> Result<&Artifact, DeployError> {
        self.artifacts
            .get(&kind)
            .ok_or(DeployError::UnknownArtifact(kind))
    }

    pub fn contains(&self, kind: ContractKind) -> bool {
        self.artifacts.contains_key(&kind)
    }

    /// Parse a JSON manifest produced by the contract build, of the shape
    /// `{"registry": {"contract_name": "...", "creation_code": "0x..."}, ...}`.
    pub fn from_manifest(json: &str) -> Result<Self, DeployError> {
        #[derive(Deserialize)]
        struct Entry {
            contract_name: String,
            creation_code: Bytes,
        }

        let entries: HashMap<ContractKind, Entry> =
            serde_json::from_str(json).map_err(|e| DeployError::Parse {
                path: "<artifact manifest>".into(),
                message: e.to_string(),
            })?;

        let mut set = Self::new();
        for (kind, entry) in entries {
            set.insert(Artifact::new(kind, entry.contract_name, entry.creation_code));
        }
        Ok(set)
    }
}

/// Content-derived version identifier of a bytecode payload.
///
/// Versions are sha-256 digests of the payload, so identical payloads always
/// carry identical versions and re-installation can be detected cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BytecodeVersion(B256);

impl BytecodeVersion {
    /// Derive the version of a payload.
    pub fn of(code: &[u8]) -> Self {
        let digest = Sha256::digest(code);
        Self(B256::from_slice(&digest))
    }

    /// The short form used in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for BytecodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A versioned, immutable blob of executable logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodePayload {
    /// Digest of `code`.
    pub version: BytecodeVersion,
    /// The raw payload bytes.
    pub code: Bytes,
}

impl BytecodePayload {
    pub fn new(code: impl Into<Bytes>) -> Self {
        let code = code.into();
        Self {
            version: BytecodeVersion::of(&code),
            code,
        }
    }
}

/// Append-only store of named payloads awaiting installation into a factory.
///
/// Publishing never mutates an existing version; the newest payload under a
/// name is the installation candidate.
#[derive(Debug, Clone, Default)]
pub struct BytecodeStore {
    payloads: HashMap<String, Vec<BytecodePayload>>,
}

impl BytecodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload under a name and return its version.
    ///
    /// Re-publishing bytes identical to the current latest is a no-op.
    pub fn publish(&mut self, name: impl Into<String>, code: impl Into<Bytes>) -> BytecodeVersion {
        let name = name.into();
        let payload = BytecodePayload::new(code);
        let version = payload.version;
        let versions = self.payloads.entry(name).or_default();
        if versions.last().map(|p| p.version) != Some(version) {
            versions.push(payload);
        }
        version
    }

    /// The newest payload published under a name.
    pub fn latest(&self, name: &str) -> Result<&BytecodePayload, DeployError> {
        self.payloads
            .get(name)
            .and_then(|v| v.last())
            .ok_or_else(|| DeployError::UnknownPayload(name.to_string()))
    }

    /// Look up a specific version of a named payload.
    pub fn get(&self, name: &str, version: BytecodeVersion) -> Option<&BytecodePayload> {
        self.payloads
            .get(name)?
            .iter()
            .find(|p| p.version == version)
    }

    /// Number of versions published under a name.
    pub fn version_count(&self, name: &str) -> usize {
        self.payloads.get(name).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_content_derived() {
        let a = BytecodeVersion::of(&[0x60, 0x80]);
        let b = BytecodeVersion::of(&[0x60, 0x80]);
        let c = BytecodeVersion::of(&[0x60, 0x81]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn store_is_append_only() {
        let mut store = BytecodeStore::new();
        let v1 = store.publish("proxy-logic", vec![0x01]);
        let v2 = store.publish("proxy-logic", vec![0x02]);
        assert_ne!(v1, v2);
        assert_eq!(store.version_count("proxy-logic"), 2);
        assert_eq!(store.latest("proxy-logic").unwrap().version, v2);
        // The earlier version stays reachable, unmodified.
        assert_eq!(store.get("proxy-logic", v1).unwrap().code, Bytes::from(vec![0x01]));
    }

    #[test]
    fn republishing_identical_code_is_a_noop() {
        let mut store = BytecodeStore::new();
        let v1 = store.publish("proxy-logic", vec![0x01]);
        let v1_again = store.publish("proxy-logic", vec![0x01]);
        assert_eq!(v1, v1_again);
        assert_eq!(store.version_count("proxy-logic"), 1);
    }

    #[test]
    fn unknown_payload_is_an_error() {
        let store = BytecodeStore::new();
        assert!(matches!(
            store.latest("missing"),
            Err(DeployError::UnknownPayload(_))
        ));
    }

    #[test]
    fn manifest_round_trip() {
        let json = r#"{
            "registry": {"contract_name": "EthereumDIDRegistry", "creation_code": "0x6080"},
            "factory": {"contract_name": "ContractFactory", "creation_code": "0x6081"}
        }"#;
        let set = ArtifactSet::from_manifest(json).unwrap();
        assert_eq!(
            set.get(ContractKind::Registry).unwrap().contract_name,
            "EthereumDIDRegistry"
        );
        assert!(set.get(ContractKind::Proxy).is_err());
    }
}
