//! Identity registry model.
//!
//! The registry is an external collaborator: its identity-attribute semantics
//! live in the real contract. This model covers only what the orchestrator
//! drives, the one-shot `initialize(owner)` entry point.

use alloy_core::primitives::Address;

use crate::error::ContractError;

/// On-ledger state of the registry, as far as provisioning is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryState {
    owner: Option<Address>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owning controller. Callable exactly once.
    pub fn initialize(&mut self, owner: Address) -> Result<(), ContractError> {
        if self.owner.is_some() {
            return Err(ContractError::AlreadyInitialized);
        }
        self.owner = Some(owner);
        Ok(())
    }

    pub fn owner(&self) -> Option<Address> {
        self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_one_shot() {
        let owner = Address::repeat_byte(0x11);
        let mut registry = RegistryState::new();
        registry.initialize(owner).unwrap();
        assert_eq!(registry.owner(), Some(owner));

        assert_eq!(
            registry.initialize(Address::repeat_byte(0x22)),
            Err(ContractError::AlreadyInitialized)
        );
        // Repeat attempts keep failing and the owner stays put.
        assert_eq!(
            registry.initialize(owner),
            Err(ContractError::AlreadyInitialized)
        );
        assert_eq!(registry.owner(), Some(owner));
    }
}
