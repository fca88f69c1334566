//! Router model: a forwarding indirection layer with no dependencies of its
//! own. The target is supplied per call or configured at construction.

use alloy_core::primitives::Address;

use crate::error::ContractError;

/// On-ledger state of a router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterState {
    default_target: Option<Address>,
    forwarded: u64,
}

impl RouterState {
    pub fn new(default_target: Option<Address>) -> Self {
        Self {
            default_target,
            forwarded: 0,
        }
    }

    /// Resolve the destination of a forwarded call: the per-call target wins,
    /// else the configured default.
    pub fn forward(&mut self, target: Option<Address>) -> Result<Address, ContractError> {
        let destination = target
            .or(self.default_target)
            .ok_or(ContractError::MissingTarget)?;
        self.forwarded += 1;
        Ok(destination)
    }

    pub fn default_target(&self) -> Option<Address> {
        self.default_target
    }

    /// Number of calls forwarded so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}
