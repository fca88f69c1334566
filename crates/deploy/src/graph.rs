//! The dependency graph over contract specs and its wave schedule.
//!
//! A sealed graph is validated (unique names, known dependencies, acyclic)
//! and carries its topological waves: nodes within a wave share no dependency
//! edge and may be deployed concurrently; a node never appears in a wave
//! before all of its dependencies.

use std::collections::{HashMap, HashSet, VecDeque};

use alloy_core::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::artifacts::ContractKind;
use crate::error::DeployError;

/// How a single `initialize` argument is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitArg {
    /// The confirmed address of a named graph node, resolved at
    /// initialization time.
    DependencyAddress(String),
    /// A fixed address known before the run starts, e.g. the owner account.
    Address(Address),
}

/// Immutable description of one contract to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Unique node name within the graph.
    pub name: String,
    /// Which artifact backs this node.
    pub kind: ContractKind,
    /// Opaque ABI-encoded constructor arguments.
    pub constructor_args: Bytes,
    /// Arguments for the post-deployment `initialize` call, or `None` when
    /// the contract has no initialization entry point.
    pub init: Option<Vec<InitArg>>,
    /// Names of nodes that must be confirmed before this one is submitted.
    pub depends_on: Vec<String>,
    /// Per-node gas override. Defaults to the configured ceiling.
    pub gas: Option<u64>,
}

impl ContractSpec {
    pub fn new(name: impl Into<String>, kind: ContractKind) -> Self {
        Self {
            name: name.into(),
            kind,
            constructor_args: Bytes::new(),
            init: None,
            depends_on: Vec::new(),
            gas: None,
        }
    }

    pub fn with_constructor_args(mut self, args: impl Into<Bytes>) -> Self {
        self.constructor_args = args.into();
        self
    }

    pub fn with_init(mut self, args: Vec<InitArg>) -> Self {
        self.init = Some(args);
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    /// All edges this spec induces: declared dependencies plus every node
    /// named by an `InitArg::DependencyAddress`.
    fn edges(&self) -> Vec<&str> {
        let mut edges: Vec<&str> = self.depends_on.iter().map(String::as_str).collect();
        if let Some(init) = &self.init {
            for arg in init {
                if let InitArg::DependencyAddress(name) = arg {
                    if !edges.contains(&name.as_str()) {
                        edges.push(name);
                    }
                }
            }
        }
        edges
    }
}

/// Mutable collection of specs, sealed into a [`SealedGraph`] before a run.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    specs: Vec<ContractSpec>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spec. Names must be unique.
    pub fn add(&mut self, spec: ContractSpec) -> Result<&mut Self, DeployError> {
        if self.specs.iter().any(|s| s.name == spec.name) {
            return Err(DeployError::DuplicateName(spec.name));
        }
        self.specs.push(spec);
        Ok(self)
    }

    /// Validate the graph and compute its wave schedule.
    pub fn seal(self) -> Result<SealedGraph, DeployError> {
        let index: HashMap<String, usize> = self
            .specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        for spec in &self.specs {
            for dep in spec.edges() {
                if !index.contains_key(dep) {
                    return Err(DeployError::UnknownDependency {
                        node: spec.name.clone(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        let waves = compute_waves(&self.specs, &index)?;

        Ok(SealedGraph {
            specs: self.specs,
            index,
            waves,
        })
    }
}

/// Kahn layering: wave N holds every node whose dependencies all sit in
/// earlier waves. Leftover nodes mean a cycle.
fn compute_waves(
    specs: &[ContractSpec],
    index: &HashMap<String, usize>,
) -> Result<Vec<Vec<String>>, DeployError> {
    let mut indegree = vec![0usize; specs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];

    for (i, spec) in specs.iter().enumerate() {
        for dep in spec.edges() {
            let d = index[dep];
            indegree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut waves = Vec::new();
    let mut placed = 0usize;
    let mut ready: Vec<usize> = (0..specs.len()).filter(|&i| indegree[i] == 0).collect();

    while !ready.is_empty() {
        let wave: Vec<String> = ready.iter().map(|&i| specs[i].name.clone()).collect();
        let mut next = Vec::new();
        for &i in &ready {
            for &dep in &dependents[i] {
                indegree[dep] -= 1;
                if indegree[dep] == 0 {
                    next.push(dep);
                }
            }
        }
        next.sort_unstable();
        placed += wave.len();
        waves.push(wave);
        ready = next;
    }

    if placed != specs.len() {
        let mut stuck: Vec<String> = specs
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, s)| s.name.clone())
            .collect();
        stuck.sort();
        return Err(DeployError::Cycle(stuck));
    }

    Ok(waves)
}

/// A validated graph with its wave schedule.
#[derive(Debug, Clone)]
pub struct SealedGraph {
    specs: Vec<ContractSpec>,
    index: HashMap<String, usize>,
    waves: Vec<Vec<String>>,
}

impl SealedGraph {
    /// Waves in deployment order.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Specs in insertion order.
    pub fn specs(&self) -> &[ContractSpec] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Option<&ContractSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Every dependency edge of a node, declared or induced by init args.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.spec(name).map(|s| s.edges()).unwrap_or_default()
    }

    /// All nodes transitively depending on `name`, in insertion order.
    pub fn transitive_dependents(&self, name: &str) -> Vec<String> {
        let mut out = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);
        while let Some(current) = queue.pop_front() {
            for spec in &self.specs {
                if spec.edges().contains(&current) && out.insert(spec.name.clone()) {
                    queue.push_back(&spec.name);
                }
            }
        }
        self.specs
            .iter()
            .filter(|s| out.contains(&s.name))
            .map(|s| s.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, kind: ContractKind) -> ContractSpec {
        ContractSpec::new(name, kind)
    }

    fn standard_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add(node("registry", ContractKind::Registry)).unwrap();
        graph.add(node("router", ContractKind::Router)).unwrap();
        graph
            .add(
                node("factory", ContractKind::Factory)
                    .with_dependency("registry")
                    .with_init(vec![InitArg::DependencyAddress("registry".into())]),
            )
            .unwrap();
        graph
            .add(
                node("proxy", ContractKind::Proxy)
                    .with_dependency("registry")
                    .with_dependency("router")
                    .with_dependency("factory")
                    .with_init(vec![
                        InitArg::DependencyAddress("registry".into()),
                        InitArg::DependencyAddress("router".into()),
                    ]),
            )
            .unwrap();
        graph
    }

    #[test]
    fn standard_graph_waves() {
        let sealed = standard_graph().seal().unwrap();
        assert_eq!(
            sealed.waves(),
            &[
                vec!["registry".to_string(), "router".to_string()],
                vec!["factory".to_string()],
                vec!["proxy".to_string()],
            ]
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add(node("registry", ContractKind::Registry)).unwrap();
        let err = graph.add(node("registry", ContractKind::Router)).unwrap_err();
        assert!(matches!(err, DeployError::DuplicateName(name) if name == "registry"));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let mut graph = DependencyGraph::new();
        graph
            .add(node("factory", ContractKind::Factory).with_dependency("registry"))
            .unwrap();
        let err = graph.seal().unwrap_err();
        assert!(matches!(
            err,
            DeployError::UnknownDependency { node, dependency }
                if node == "factory" && dependency == "registry"
        ));
    }

    #[test]
    fn init_args_induce_edges() {
        let mut graph = DependencyGraph::new();
        graph.add(node("registry", ContractKind::Registry)).unwrap();
        // No declared dependency, only the init reference.
        graph
            .add(
                node("factory", ContractKind::Factory)
                    .with_init(vec![InitArg::DependencyAddress("registry".into())]),
            )
            .unwrap();
        let sealed = graph.seal().unwrap();
        assert_eq!(sealed.waves().len(), 2);
        assert_eq!(sealed.dependencies("factory"), vec!["registry"]);
    }

    #[test]
    fn cycle_rejected() {
        let mut graph = DependencyGraph::new();
        graph
            .add(node("a", ContractKind::Registry).with_dependency("b"))
            .unwrap();
        graph
            .add(node("b", ContractKind::Router).with_dependency("a"))
            .unwrap();
        let err = graph.seal().unwrap_err();
        assert!(matches!(err, DeployError::Cycle(nodes) if nodes == vec!["a", "b"]));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph
            .add(node("a", ContractKind::Registry).with_dependency("a"))
            .unwrap();
        assert!(matches!(graph.seal(), Err(DeployError::Cycle(_))));
    }

    #[test]
    fn transitive_dependents_cover_the_whole_downstream() {
        let sealed = standard_graph().seal().unwrap();
        assert_eq!(
            sealed.transitive_dependents("registry"),
            vec!["factory".to_string(), "proxy".to_string()]
        );
        assert_eq!(sealed.transitive_dependents("router"), vec!["proxy".to_string()]);
        assert!(sealed.transitive_dependents("proxy").is_empty());
    }
}
