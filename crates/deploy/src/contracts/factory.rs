//! Factory model: holds the registry pointer and the current logic payload,
//! and stamps out proxy instances embedding that payload.

use std::fmt;

use alloy_core::primitives::Address;

use crate::artifacts::{BytecodePayload, BytecodeVersion};
use crate::contracts::proxy::ProxyState;
use crate::error::ContractError;

/// Result of a `set_bytecode` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// First payload installed into this factory.
    Installed(BytecodeVersion),
    /// The payload matches the current version; nothing changed.
    AlreadyCurrent(BytecodeVersion),
    /// The current-version pointer moved. Last writer wins; instances
    /// created under `previous` keep their logic reference.
    Replaced {
        previous: BytecodeVersion,
        current: BytecodeVersion,
    },
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallOutcome::Installed(v) => write!(f, "installed {}", v.short()),
            InstallOutcome::AlreadyCurrent(v) => write!(f, "already current {}", v.short()),
            InstallOutcome::Replaced { previous, current } => {
                write!(f, "replaced {} with {}", previous.short(), current.short())
            }
        }
    }
}

/// On-ledger state of the factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryState {
    registry: Option<Address>,
    current: Option<BytecodePayload>,
    proxies: Vec<Address>,
}

impl FactoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the registry pointer. Callable exactly once, before any proxy
    /// creation references this factory.
    pub fn initialize(&mut self, registry: Address) -> Result<(), ContractError> {
        if self.registry.is_some() {
            return Err(ContractError::AlreadyInitialized);
        }
        self.registry = Some(registry);
        Ok(())
    }

    /// Replace the current-version pointer. Callable any number of times;
    /// already-created proxies keep the logic reference they were stamped
    /// with.
    pub fn set_bytecode(&mut self, payload: BytecodePayload) -> InstallOutcome {
        let outcome = match self.current.as_ref().map(|p| p.version) {
            None => InstallOutcome::Installed(payload.version),
            Some(previous) if previous == payload.version => {
                return InstallOutcome::AlreadyCurrent(previous);
            }
            Some(previous) => InstallOutcome::Replaced {
                previous,
                current: payload.version,
            },
        };
        self.current = Some(payload);
        outcome
    }

    /// Stamp out a proxy at `at`, embedding the current payload version.
    pub fn create_proxy(&mut self, at: Address) -> Result<ProxyState, ContractError> {
        if self.registry.is_none() {
            return Err(ContractError::NotInitialized);
        }
        let payload = self.current.as_ref().ok_or(ContractError::NoBytecode)?;
        self.proxies.push(at);
        Ok(ProxyState::new(payload.version))
    }

    pub fn registry(&self) -> Option<Address> {
        self.registry
    }

    pub fn current_version(&self) -> Option<BytecodeVersion> {
        self.current.as_ref().map(|p| p.version)
    }

    /// Addresses of proxies stamped out so far.
    pub fn proxies(&self) -> &[Address] {
        &self.proxies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(byte: u8) -> BytecodePayload {
        BytecodePayload::new(vec![byte; 8])
    }

    #[test]
    fn initialize_is_one_shot() {
        let registry = Address::repeat_byte(0x01);
        let mut factory = FactoryState::new();
        factory.initialize(registry).unwrap();
        assert_eq!(
            factory.initialize(registry),
            Err(ContractError::AlreadyInitialized)
        );
        assert_eq!(factory.registry(), Some(registry));
    }

    #[test]
    fn set_bytecode_moves_the_current_pointer() {
        let mut factory = FactoryState::new();
        let v1 = payload(1);
        let v2 = payload(2);

        assert_eq!(
            factory.set_bytecode(v1.clone()),
            InstallOutcome::Installed(v1.version)
        );
        assert_eq!(
            factory.set_bytecode(v1.clone()),
            InstallOutcome::AlreadyCurrent(v1.version)
        );
        assert_eq!(
            factory.set_bytecode(v2.clone()),
            InstallOutcome::Replaced {
                previous: v1.version,
                current: v2.version
            }
        );
        assert_eq!(factory.current_version(), Some(v2.version));
    }

    #[test]
    fn create_proxy_requires_initialize_and_bytecode() {
        let mut factory = FactoryState::new();
        let at = Address::repeat_byte(0xCC);

        assert_eq!(
            factory.create_proxy(at).unwrap_err(),
            ContractError::NotInitialized
        );

        factory.initialize(Address::repeat_byte(0x01)).unwrap();
        assert_eq!(factory.create_proxy(at).unwrap_err(), ContractError::NoBytecode);

        factory.set_bytecode(payload(1));
        let proxy = factory.create_proxy(at).unwrap();
        assert_eq!(proxy.logic_version(), payload(1).version);
        assert_eq!(factory.proxies(), &[at]);
    }

    #[test]
    fn stamped_proxies_keep_their_logic_reference() {
        let mut factory = FactoryState::new();
        factory.initialize(Address::repeat_byte(0x01)).unwrap();

        let v1 = payload(1);
        let v2 = payload(2);
        factory.set_bytecode(v1.clone());
        let early = factory.create_proxy(Address::repeat_byte(0xA1)).unwrap();

        factory.set_bytecode(v2.clone());
        let late = factory.create_proxy(Address::repeat_byte(0xA2)).unwrap();

        assert_eq!(early.logic_version(), v1.version);
        assert_eq!(late.logic_version(), v2.version);
        assert_eq!(factory.current_version(), Some(v2.version));
    }
}
