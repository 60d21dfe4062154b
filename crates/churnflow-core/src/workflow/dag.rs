//! DAG validation and parallel wave computation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph.
//! Topological sort detects cycles, and depth-based grouping produces
//! parallel execution waves where all steps in a wave can run
//! concurrently. Beyond acyclicity, a flow must have exactly one start
//! node, exactly one terminal node, and every step reachable from the
//! start; all of this is checked at definition time, before any step runs.

use std::collections::{HashMap, HashSet};

use churnflow_types::workflow::StepDefinition;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that steps form a well-shaped flow DAG.
///
/// Checks, in order: non-empty, unique step ids, known dependency
/// references, acyclicity, exactly one start node (no dependencies),
/// exactly one terminal node (no successors), and reachability of every
/// step from the start.
pub fn validate_flow(steps: &[StepDefinition]) -> Result<(), GraphError> {
    if steps.is_empty() {
        return Err(GraphError::EmptyFlow);
    }

    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.id.as_str()) {
            return Err(GraphError::DuplicateStepId(step.id.clone()));
        }
    }

    let graph = build_graph(steps)?;

    toposort(&graph, None).map_err(|cycle| {
        GraphError::CycleDetected(graph[cycle.node_id()].to_string())
    })?;

    // Exactly one start node
    let starts: Vec<&str> = steps
        .iter()
        .filter(|s| s.depends_on.is_empty())
        .map(|s| s.id.as_str())
        .collect();
    match starts.len() {
        0 => return Err(GraphError::NoStartNode),
        1 => {}
        _ => {
            return Err(GraphError::MultipleStartNodes(
                starts.iter().map(|s| s.to_string()).collect(),
            ));
        }
    }

    // Exactly one terminal node (no successors)
    let mut has_successor: HashSet<&str> = HashSet::new();
    for step in steps {
        for dep in &step.depends_on {
            has_successor.insert(dep.as_str());
        }
    }
    let terminals: Vec<&str> = steps
        .iter()
        .filter(|s| !has_successor.contains(s.id.as_str()))
        .map(|s| s.id.as_str())
        .collect();
    match terminals.len() {
        0 => return Err(GraphError::NoTerminalNode),
        1 => {}
        _ => {
            return Err(GraphError::MultipleTerminalNodes(
                terminals.iter().map(|s| s.to_string()).collect(),
            ));
        }
    }

    // Every step reachable from the start
    let successors: HashMap<&str, Vec<&str>> = {
        let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in steps {
            for dep in &step.depends_on {
                map.entry(dep.as_str()).or_default().push(step.id.as_str());
            }
        }
        map
    };
    let mut reachable = HashSet::new();
    let mut stack = vec![starts[0]];
    while let Some(current) = stack.pop() {
        if reachable.insert(current) {
            if let Some(next) = successors.get(current) {
                stack.extend(next.iter().copied());
            }
        }
    }
    for step in steps {
        if !reachable.contains(step.id.as_str()) {
            return Err(GraphError::UnreachableStep(step.id.clone()));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Execution plan (wave computation)
// ---------------------------------------------------------------------------

/// Build an execution plan from a validated flow, grouping steps into
/// parallel waves.
///
/// Each wave contains steps whose dependencies are all satisfied by prior
/// waves; steps within a wave may execute concurrently. Wave index is the
/// step's dependency depth (max predecessor depth + 1).
pub fn build_execution_plan<'a>(
    steps: &'a [StepDefinition],
) -> Result<Vec<Vec<&'a StepDefinition>>, GraphError> {
    validate_flow(steps)?;

    let graph = build_graph(steps)?;
    let id_to_step: HashMap<&str, &StepDefinition> =
        steps.iter().map(|s| (s.id.as_str(), s)).collect();

    // Safe: validate_flow already rejected cycles.
    let sorted = toposort(&graph, None).map_err(|cycle| {
        GraphError::CycleDetected(graph[cycle.node_id()].to_string())
    })?;

    let mut depths: HashMap<&str, usize> = HashMap::new();
    for &node_idx in &sorted {
        let step_id = graph[node_idx];
        let step = id_to_step[step_id];
        let depth = step
            .depends_on
            .iter()
            .map(|dep| depths.get(dep.as_str()).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depths.insert(step_id, depth);
    }

    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&StepDefinition>> = vec![vec![]; max_depth + 1];
    for step in steps {
        waves[depths[step.id.as_str()]].push(step);
    }

    Ok(waves)
}

/// Build the petgraph representation: edge from dependency to dependent.
fn build_graph(steps: &[StepDefinition]) -> Result<DiGraph<&str, ()>, GraphError> {
    let id_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = steps.iter().map(|s| graph.add_node(s.id.as_str())).collect();

    for step in steps {
        let to_idx = id_to_idx[step.id.as_str()];
        for dep in &step.depends_on {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                GraphError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                }
            })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    Ok(graph)
}

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// Malformed flow definitions, caught before execution.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The flow has no steps.
    #[error("flow has no steps")]
    EmptyFlow,

    /// Two steps share an id.
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    /// A step depends on an id that is not defined.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// The dependency graph contains a cycle.
    #[error("cycle detected involving step '{0}'")]
    CycleDetected(String),

    /// No step without dependencies exists.
    #[error("flow has no start node")]
    NoStartNode,

    /// More than one step has no dependencies.
    #[error("flow has multiple start nodes: {0:?}")]
    MultipleStartNodes(Vec<String>),

    /// No step without successors exists (implies a cycle was missed).
    #[error("flow has no terminal node")]
    NoTerminalNode,

    /// More than one step has no successors.
    #[error("flow has multiple terminal nodes: {0:?}")]
    MultipleTerminalNodes(Vec<String>),

    /// A step cannot be reached from the start node.
    #[error("step '{0}' is not reachable from the start node")]
    UnreachableStep(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, depends_on: &[&str]) -> StepDefinition {
        StepDefinition::after(id, id, depends_on)
    }

    // -----------------------------------------------------------------------
    // Wave computation
    // -----------------------------------------------------------------------

    #[test]
    fn linear_chain_one_step_per_wave() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        let waves = build_execution_plan(&steps).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0][0].id, "a");
        assert_eq!(waves[1][0].id, "b");
        assert_eq!(waves[2][0].id, "c");
    }

    #[test]
    fn diamond_fans_out_in_middle_wave() {
        // a -> {b, c} -> d
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ];
        let waves = build_execution_plan(&steps).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[1].len(), 2, "b and c share a wave");
        let mid: Vec<&str> = waves[1].iter().map(|s| s.id.as_str()).collect();
        assert!(mid.contains(&"b") && mid.contains(&"c"));
        assert_eq!(waves[2][0].id, "d");
    }

    #[test]
    fn uneven_branches_join_waits_for_deepest() {
        // a -> b -> d, a -> c -> e -> d would have two terminals; keep one:
        // a -> {b, c}; c -> e; {b, e} -> d
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("e", &["c"]),
            step("d", &["b", "e"]),
        ];
        let waves = build_execution_plan(&steps).unwrap();
        assert_eq!(waves.len(), 4);
        assert_eq!(waves[3][0].id, "d");
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn empty_flow_rejected() {
        assert!(matches!(validate_flow(&[]), Err(GraphError::EmptyFlow)));
    }

    #[test]
    fn duplicate_id_rejected() {
        let steps = vec![step("a", &[]), step("a", &[])];
        assert!(matches!(
            validate_flow(&steps),
            Err(GraphError::DuplicateStepId(_))
        ));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let steps = vec![step("a", &["missing"])];
        let err = validate_flow(&steps).unwrap_err();
        assert!(err.to_string().contains("unknown step 'missing'"));
    }

    #[test]
    fn cycle_rejected() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert!(matches!(
            validate_flow(&steps),
            Err(GraphError::CycleDetected(_))
        ));
    }

    #[test]
    fn multiple_start_nodes_rejected() {
        let steps = vec![step("a", &[]), step("b", &[]), step("c", &["a", "b"])];
        let err = validate_flow(&steps).unwrap_err();
        assert!(matches!(err, GraphError::MultipleStartNodes(ref ids) if ids.len() == 2));
    }

    #[test]
    fn multiple_terminal_nodes_rejected() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["a"])];
        assert!(matches!(
            validate_flow(&steps),
            Err(GraphError::MultipleTerminalNodes(_))
        ));
    }

    #[test]
    fn diamond_is_valid() {
        let steps = vec![
            step("start", &[]),
            step("load-data", &["start"]),
            step("load-model", &["start"]),
            step("batch-score", &["load-data", "load-model"]),
        ];
        assert!(validate_flow(&steps).is_ok());
    }
}
