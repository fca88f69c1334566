//! Proxy model: independent storage, delegated execution.
//!
//! The logic reference is fixed at creation and never moves afterwards, even
//! when the factory's current-version pointer does.

use alloy_core::primitives::Address;

use crate::artifacts::BytecodeVersion;
use crate::error::ContractError;

/// On-ledger state of a proxy instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyState {
    logic: BytecodeVersion,
    registry: Option<Address>,
    router: Option<Address>,
}

impl ProxyState {
    pub fn new(logic: BytecodeVersion) -> Self {
        Self {
            logic,
            registry: None,
            router: None,
        }
    }

    /// Wire the registry and, optionally, a router. Callable exactly once.
    pub fn initialize(
        &mut self,
        registry: Address,
        router: Option<Address>,
    ) -> Result<(), ContractError> {
        if self.registry.is_some() {
            return Err(ContractError::AlreadyInitialized);
        }
        self.registry = Some(registry);
        self.router = router;
        Ok(())
    }

    /// Where delegated calls leave this proxy: through the router when one
    /// was wired, directly to the registry otherwise.
    pub fn next_hop(&self) -> Result<Address, ContractError> {
        self.router
            .or(self.registry)
            .ok_or(ContractError::NotInitialized)
    }

    /// The logic payload version embedded at creation. Immutable.
    pub fn logic_version(&self) -> BytecodeVersion {
        self.logic
    }

    pub fn registry(&self) -> Option<Address> {
        self.registry
    }

    pub fn router(&self) -> Option<Address> {
        self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logic() -> BytecodeVersion {
        BytecodeVersion::of(&[0x60, 0x80, 0x60, 0x40])
    }

    #[test]
    fn initialize_is_one_shot() {
        let registry = Address::repeat_byte(0x01);
        let mut proxy = ProxyState::new(logic());
        proxy.initialize(registry, None).unwrap();

        assert_eq!(
            proxy.initialize(registry, None),
            Err(ContractError::AlreadyInitialized)
        );
        assert_eq!(
            proxy.initialize(Address::repeat_byte(0x02), Some(Address::repeat_byte(0x03))),
            Err(ContractError::AlreadyInitialized)
        );
    }

    #[test]
    fn routed_proxy_forwards_through_the_router() {
        let registry = Address::repeat_byte(0x01);
        let router = Address::repeat_byte(0x02);

        let mut direct = ProxyState::new(logic());
        direct.initialize(registry, None).unwrap();
        assert_eq!(direct.next_hop(), Ok(registry));

        let mut routed = ProxyState::new(logic());
        routed.initialize(registry, Some(router)).unwrap();
        assert_eq!(routed.next_hop(), Ok(router));
    }

    #[test]
    fn next_hop_requires_initialization() {
        let proxy = ProxyState::new(logic());
        assert_eq!(proxy.next_hop(), Err(ContractError::NotInitialized));
    }
}
