// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! DAG validation and dependency queries over a workflow's steps.

use crate::error::{CoreError, Result};
use crate::model::{JobStatus, Workflow};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// A graph view of a workflow's step dependencies, built fresh per query.
pub struct WorkflowDag {
    graph: DiGraph<String, ()>,
    step_to_node: HashMap<String, NodeIndex>,
    node_to_step: HashMap<NodeIndex, String>,
}

impl WorkflowDag {
    /// Build and validate the DAG for a workflow.
    ///
    /// Validated at creation only (§3): every `dependencies` entry must name
    /// a step in the same workflow, and the resulting graph must be acyclic.
    pub fn from_workflow(workflow: &Workflow) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut step_to_node = HashMap::new();
        let mut node_to_step = HashMap::new();

        for step in &workflow.steps {
            let idx = graph.add_node(step.id.clone());
            step_to_node.insert(step.id.clone(), idx);
            node_to_step.insert(idx, step.id.clone());
        }

        for step in &workflow.steps {
            let target = step_to_node[&step.id];
            for dep in &step.dependencies {
                let source = step_to_node.get(dep).ok_or_else(|| {
                    CoreError::validation(format!(
                        "step '{}' depends on unknown step '{}'",
                        step.id, dep
                    ))
                })?;
                graph.add_edge(*source, target, ());
            }
        }

        let dag = Self {
            graph,
            step_to_node,
            node_to_step,
        };

        toposort(&dag.graph, None)
            .map_err(|_| CoreError::CyclicDependency(workflow.id.clone()))?;

        Ok(dag)
    }

    /// Direct and transitive successors of `step_id` (used for cascade, §4.4 step 9).
    pub fn transitive_successors(&self, step_id: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let Some(&start) = self.step_to_node.get(step_id) else {
            return result;
        };

        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for neighbor in self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
            {
                let id = self.node_to_step[&neighbor].clone();
                if result.insert(id) {
                    stack.push(neighbor);
                }
            }
        }
        result
    }
}

/// Steps that are `PENDING` and whose dependencies are all `COMPLETED` (§4.4 step 10).
pub fn ready_steps(workflow: &Workflow) -> Vec<String> {
    let completed: HashSet<&str> = workflow
        .steps
        .iter()
        .filter(|s| s.status == JobStatus::Completed)
        .map(|s| s.id.as_str())
        .collect();

    workflow
        .steps
        .iter()
        .filter(|s| {
            s.status == JobStatus::Pending
                && s.dependencies.iter().all(|d| completed.contains(d.as_str()))
        })
        .map(|s| s.id.clone())
        .collect()
}

/// Validate that every `dependencies` entry refers to a step in the same
/// document and that the graph is acyclic, without constructing the graph
/// for later use (edge-side validation, §6 `POST /api/workflows`).
pub fn validate_acyclic(workflow: &Workflow) -> Result<()> {
    WorkflowDag::from_workflow(workflow).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;

    fn step(id: &str, deps: &[&str]) -> Step {
        let mut s = Step::new(id, id, "sim");
        s.dependencies = deps.iter().map(|d| d.to_string()).collect();
        s
    }

    #[test]
    fn detects_cycle() {
        let wf = Workflow::new(
            "w1",
            "cyclic",
            vec![step("a", &["b"]), step("b", &["a"])],
        );
        assert!(validate_acyclic(&wf).is_err());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let wf = Workflow::new("w1", "bad-dep", vec![step("a", &["ghost"])]);
        assert!(validate_acyclic(&wf).is_err());
    }

    #[test]
    fn ready_steps_respects_dependencies() {
        let mut wf = Workflow::new("w1", "fan", vec![step("a", &[]), step("b", &["a"])]);
        assert_eq!(ready_steps(&wf), vec!["a".to_string()]);

        wf.step_mut("a").unwrap().status = JobStatus::Completed;
        assert_eq!(ready_steps(&wf), vec!["b".to_string()]);
    }

    #[test]
    fn transitive_successors_follow_fan_out() {
        let wf = Workflow::new(
            "w1",
            "fan",
            vec![
                step("a", &[]),
                step("b", &["a"]),
                step("c", &["a"]),
                step("d", &["b", "c"]),
            ],
        );
        let dag = WorkflowDag::from_workflow(&wf).unwrap();
        let succ = dag.transitive_successors("a");
        assert_eq!(succ.len(), 3);
        assert!(succ.contains("b"));
        assert!(succ.contains("c"));
        assert!(succ.contains("d"));
    }
}
