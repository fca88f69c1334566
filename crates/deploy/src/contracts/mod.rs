//! On-ledger contract models.
//!
//! These are the state machines the in-memory ledger executes; their
//! invariants (initialize-once, immutable per-proxy logic references) are
//! exactly what the real contracts enforce.

mod factory;
mod proxy;
mod registry;
mod router;

pub use factory::{FactoryState, InstallOutcome};
pub use proxy::ProxyState;
pub use registry::RegistryState;
pub use router::RouterState;

use alloy_core::primitives::{Address, Bytes};

use crate::artifacts::{BytecodePayload, BytecodeVersion, ContractKind};
use crate::error::ContractError;

/// A deployed contract instance, dispatching the modeled ABI by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractInstance {
    Registry(RegistryState),
    Router(RouterState),
    Factory(FactoryState),
    Proxy(ProxyState),
}

impl ContractInstance {
    /// Execute the creation code of `kind`.
    ///
    /// A router's constructor accepts an optional 20-byte default target; a
    /// directly-deployed proxy embeds the digest of its own creation code as
    /// the logic reference.
    pub fn instantiate(kind: ContractKind, creation_code: &Bytes, constructor_args: &Bytes) -> Self {
        match kind {
            ContractKind::Registry => Self::Registry(RegistryState::new()),
            ContractKind::Router => {
                let target = (constructor_args.len() == Address::len_bytes())
                    .then(|| Address::from_slice(constructor_args));
                Self::Router(RouterState::new(target))
            }
            ContractKind::Factory => Self::Factory(FactoryState::new()),
            ContractKind::Proxy => Self::Proxy(ProxyState::new(BytecodeVersion::of(creation_code))),
        }
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            Self::Registry(_) => ContractKind::Registry,
            Self::Router(_) => ContractKind::Router,
            Self::Factory(_) => ContractKind::Factory,
            Self::Proxy(_) => ContractKind::Proxy,
        }
    }

    /// Dispatch `initialize(args...)`. Argument shape is positional:
    /// registry and factory take one address, a proxy takes its registry and
    /// optionally a router, and a router has no initializer at all.
    pub fn initialize(&mut self, args: &[Address]) -> Result<(), ContractError> {
        match self {
            Self::Registry(state) => match args {
                [owner] => state.initialize(*owner),
                _ => Err(ContractError::InvalidArguments),
            },
            Self::Factory(state) => match args {
                [registry] => state.initialize(*registry),
                _ => Err(ContractError::InvalidArguments),
            },
            Self::Proxy(state) => match args {
                [registry] => state.initialize(*registry, None),
                [registry, router] => state.initialize(*registry, Some(*router)),
                _ => Err(ContractError::InvalidArguments),
            },
            Self::Router(_) => Err(ContractError::UnknownSelector),
        }
    }

    /// Dispatch `setBytecode(payload)`. Factory only.
    pub fn set_bytecode(&mut self, payload: BytecodePayload) -> Result<InstallOutcome, ContractError> {
        match self {
            Self::Factory(state) => Ok(state.set_bytecode(payload)),
            _ => Err(ContractError::UnknownSelector),
        }
    }

    /// Dispatch `createProxy()`. Factory only; `at` is the address the new
    /// instance will live at.
    pub fn create_proxy(&mut self, at: Address) -> Result<ProxyState, ContractError> {
        match self {
            Self::Factory(state) => state.create_proxy(at),
            _ => Err(ContractError::UnknownSelector),
        }
    }

    /// Dispatch a forwarded call. Router only.
    pub fn forward(&mut self, target: Option<Address>) -> Result<Address, ContractError> {
        match self {
            Self::Router(state) => state.forward(target),
            _ => Err(ContractError::UnknownSelector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_constructor_accepts_a_default_target() {
        let target = Address::repeat_byte(0x42);
        let args = Bytes::from(target.to_vec());
        let instance =
            ContractInstance::instantiate(ContractKind::Router, &Bytes::new(), &args);
        match instance {
            ContractInstance::Router(router) => {
                assert_eq!(router.default_target(), Some(target))
            }
            other => panic!("expected a router, got {:?}", other.kind()),
        }
    }

    #[test]
    fn initialize_dispatch_checks_arity() {
        let mut registry =
            ContractInstance::instantiate(ContractKind::Registry, &Bytes::new(), &Bytes::new());
        assert_eq!(
            registry.initialize(&[]),
            Err(ContractError::InvalidArguments)
        );
        assert_eq!(
            registry.initialize(&[Address::repeat_byte(1), Address::repeat_byte(2)]),
            Err(ContractError::InvalidArguments)
        );
        registry.initialize(&[Address::repeat_byte(1)]).unwrap();
    }

    #[test]
    fn selectors_are_kind_specific() {
        let mut router =
            ContractInstance::instantiate(ContractKind::Router, &Bytes::new(), &Bytes::new());
        assert_eq!(
            router.initialize(&[Address::repeat_byte(1)]),
            Err(ContractError::UnknownSelector)
        );
        assert_eq!(
            router.set_bytecode(BytecodePayload::new(vec![0x01])),
            Err(ContractError::UnknownSelector)
        );

        let mut proxy =
            ContractInstance::instantiate(ContractKind::Proxy, &Bytes::from(vec![0x60]), &Bytes::new());
        assert_eq!(
            proxy.forward(None),
            Err(ContractError::UnknownSelector)
        );
    }
}
