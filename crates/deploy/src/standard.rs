//! The production contract graph.
//!
//! Two variants exist: the full wiring routes proxy traffic through a router,
//! the minimal wiring points proxies straight at the registry. Both defer the
//! proxy logic install into the factory until the whole graph is live, since
//! the payload and the factory address are only both known at that point.

use alloy_core::primitives::{Address, Bytes};

use crate::artifacts::{Artifact, ArtifactSet, BytecodeStore, ContractKind};
use crate::error::DeployError;
use crate::graph::{ContractSpec, DependencyGraph, InitArg, SealedGraph};
use crate::orchestrator::InstallStep;

/// Node name of the identity registry.
pub const REGISTRY: &str = "registry";
/// Node name of the router.
pub const ROUTER: &str = "router";
/// Node name of the factory.
pub const FACTORY: &str = "factory";
/// Node name of the proxy instance.
pub const PROXY: &str = "proxy";
/// Store name of the proxy logic payload installed into the factory.
pub const PROXY_LOGIC: &str = "proxy-logic";

/// A sealed graph plus the deferred install steps that complete it.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub graph: SealedGraph,
    pub installs: Vec<InstallStep>,
}

/// The full wiring: registry and router first, then the factory wired to the
/// registry, then a proxy wired to both, and finally the proxy logic payload
/// into the factory.
pub fn standard_plan(owner: Address) -> Result<ProvisioningPlan, DeployError> {
    let mut graph = DependencyGraph::new();
    graph.add(
        ContractSpec::new(REGISTRY, ContractKind::Registry)
            .with_init(vec![InitArg::Address(owner)]),
    )?;
    graph.add(ContractSpec::new(ROUTER, ContractKind::Router))?;
    graph.add(
        ContractSpec::new(FACTORY, ContractKind::Factory)
            .with_dependency(REGISTRY)
            .with_init(vec![InitArg::DependencyAddress(REGISTRY.to_string())]),
    )?;
    // The proxy's logic is sourced from the factory, so it deploys strictly
    // after it even though its initializer only takes the other two.
    graph.add(
        ContractSpec::new(PROXY, ContractKind::Proxy)
            .with_dependency(REGISTRY)
            .with_dependency(ROUTER)
            .with_dependency(FACTORY)
            .with_init(vec![
                InitArg::DependencyAddress(REGISTRY.to_string()),
                InitArg::DependencyAddress(ROUTER.to_string()),
            ]),
    )?;

    Ok(ProvisioningPlan {
        graph: graph.seal()?,
        installs: vec![InstallStep::new(FACTORY, PROXY_LOGIC)],
    })
}

/// The minimal wiring: no router, proxies call the registry directly.
pub fn minimal_plan(owner: Address) -> Result<ProvisioningPlan, DeployError> {
    let mut graph = DependencyGraph::new();
    graph.add(
        ContractSpec::new(REGISTRY, ContractKind::Registry)
            .with_init(vec![InitArg::Address(owner)]),
    )?;
    graph.add(
        ContractSpec::new(FACTORY, ContractKind::Factory)
            .with_dependency(REGISTRY)
            .with_init(vec![InitArg::DependencyAddress(REGISTRY.to_string())]),
    )?;
    graph.add(
        ContractSpec::new(PROXY, ContractKind::Proxy)
            .with_dependency(REGISTRY)
            .with_dependency(FACTORY)
            .with_init(vec![InitArg::DependencyAddress(REGISTRY.to_string())]),
    )?;

    Ok(ProvisioningPlan {
        graph: graph.seal()?,
        installs: vec![InstallStep::new(FACTORY, PROXY_LOGIC)],
    })
}

// Placeholder creation code, stable across runs so content-derived versions
// stay comparable. Real deployments load compiled output via
// `ArtifactSet::from_manifest`.
const REGISTRY_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x01];
const ROUTER_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x02];
const FACTORY_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x03];
const PROXY_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x04];

/// Built-in artifact set for the four stock contracts.
pub fn standard_artifacts() -> ArtifactSet {
    let mut set = ArtifactSet::new();
    set.insert(Artifact::new(
        ContractKind::Registry,
        "EthereumDIDRegistry",
        Bytes::from_static(REGISTRY_CODE),
    ));
    set.insert(Artifact::new(
        ContractKind::Router,
        "TransactionRouter",
        Bytes::from_static(ROUTER_CODE),
    ));
    set.insert(Artifact::new(
        ContractKind::Factory,
        "ContractFactory",
        Bytes::from_static(FACTORY_CODE),
    ));
    set.insert(Artifact::new(
        ContractKind::Proxy,
        "TransactionProxy",
        Bytes::from_static(PROXY_CODE),
    ));
    set
}

/// Publish the proxy artifact's creation code as the factory's logic
/// payload, the way the original wiring sourced it.
pub fn standard_bytecode(artifacts: &ArtifactSet) -> Result<BytecodeStore, DeployError> {
    let proxy = artifacts.get(ContractKind::Proxy)?;
    let mut store = BytecodeStore::new();
    store.publish(PROXY_LOGIC, proxy.creation_code.clone());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_plan_waves_group_independent_roots() {
        let plan = standard_plan(Address::repeat_byte(0x01)).unwrap();
        assert_eq!(
            plan.graph.waves(),
            &[
                vec![REGISTRY.to_string(), ROUTER.to_string()],
                vec![FACTORY.to_string()],
                vec![PROXY.to_string()],
            ]
        );
        assert_eq!(plan.installs, vec![InstallStep::new(FACTORY, PROXY_LOGIC)]);
    }

    #[test]
    fn minimal_plan_has_no_router() {
        let plan = minimal_plan(Address::repeat_byte(0x01)).unwrap();
        assert!(plan.graph.spec(ROUTER).is_none());
        assert_eq!(
            plan.graph.waves(),
            &[
                vec![REGISTRY.to_string()],
                vec![FACTORY.to_string()],
                vec![PROXY.to_string()],
            ]
        );
    }

    #[test]
    fn standard_bytecode_publishes_the_proxy_logic() {
        let artifacts = standard_artifacts();
        let store = standard_bytecode(&artifacts).unwrap();
        let payload = store.latest(PROXY_LOGIC).unwrap();
        assert_eq!(
            payload.code,
            artifacts.get(ContractKind::Proxy).unwrap().creation_code
        );
    }
}
