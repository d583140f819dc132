//! Dependency DAG built from workstream descriptors.
//!
//! Construction validates the graph structure:
//! - every dependency must reference a known workstream
//! - no self-edges
//! - no cycles (depth-first search with an explicit recursion stack)
//!
//! The execution order comes from Kahn's algorithm with a FIFO ready queue,
//! so ties between simultaneously ready workstreams break by insertion order.

use crate::errors::ScheduleError;
use crate::workstream::Workstream;
use std::collections::{HashMap, HashSet, VecDeque};

/// Index into the node list.
type NodeIndex = usize;

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// The workstream descriptor
    pub workstream: Workstream,
    /// Indices of workstreams that depend on this one
    pub dependents: Vec<NodeIndex>,
    /// Count of distinct declared dependencies
    pub indegree: usize,
}

/// A validated dependency DAG for one feature.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build and validate a graph from descriptors.
    ///
    /// Fails with `CircularDependency` on a self-edge or cycle and
    /// `MissingDependency` on an edge to an unknown id, before any
    /// execution can start.
    pub fn build(workstreams: &[Workstream]) -> Result<Self, ScheduleError> {
        let mut index_map = HashMap::new();
        for (i, ws) in workstreams.iter().enumerate() {
            if index_map.insert(ws.id.clone(), i).is_some() {
                return Err(ScheduleError::DuplicateWorkstream { id: ws.id.clone() });
            }
        }

        let mut nodes: Vec<GraphNode> = workstreams
            .iter()
            .map(|ws| GraphNode {
                workstream: ws.clone(),
                dependents: Vec::new(),
                indegree: 0,
            })
            .collect();

        for (to_idx, ws) in workstreams.iter().enumerate() {
            let mut seen: HashSet<&str> = HashSet::new();
            for dep in &ws.depends_on {
                if dep == &ws.id {
                    return Err(ScheduleError::CircularDependency {
                        involved: vec![ws.id.clone()],
                    });
                }
                // Indegree counts distinct dependencies only
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| ScheduleError::MissingDependency {
                            workstream: ws.id.clone(),
                            dependency: dep.clone(),
                        })?;
                nodes[from_idx].dependents.push(to_idx);
                nodes[to_idx].indegree += 1;
            }
        }

        let graph = Self { nodes, index_map };
        graph.detect_cycles()?;
        Ok(graph)
    }

    /// Number of workstreams in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by workstream id.
    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.index_map.get(id).and_then(|&i| self.nodes.get(i))
    }

    /// Check whether the graph contains a workstream id.
    pub fn contains(&self, id: &str) -> bool {
        self.index_map.contains_key(id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Ids of workstreams that depend on the given id.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.get(id)
            .map(|node| {
                node.dependents
                    .iter()
                    .map(|&i| self.nodes[i].workstream.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Compute the execution order with Kahn's algorithm.
    ///
    /// The ready queue is seeded with indegree-0 nodes in insertion order
    /// and drained FIFO; successors are enqueued as their last dependency
    /// is emitted. If fewer than all nodes are emitted, the graph holds a
    /// cycle.
    pub fn topological_order(&self) -> Result<Vec<String>, ScheduleError> {
        let mut indegree: Vec<usize> = self.nodes.iter().map(|n| n.indegree).collect();
        let mut queue: VecDeque<NodeIndex> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(idx) = queue.pop_front() {
            order.push(self.nodes[idx].workstream.id.clone());
            for &dep_idx in &self.nodes[idx].dependents {
                indegree[dep_idx] -= 1;
                if indegree[dep_idx] == 0 {
                    queue.push_back(dep_idx);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let involved = indegree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| self.nodes[i].workstream.id.clone())
                .collect();
            return Err(ScheduleError::CircularDependency { involved });
        }

        Ok(order)
    }

    /// Depth-first cycle detection with an explicit recursion stack.
    ///
    /// Runs in O(V+E). On a back edge, the cycle members are read off the
    /// current path.
    fn detect_cycles(&self) -> Result<(), ScheduleError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut path: Vec<NodeIndex> = Vec::new();

        // Iterative DFS; each stack frame tracks the next dependent to visit.
        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            let mut stack: Vec<(NodeIndex, usize)> = vec![(start, 0)];
            marks[start] = Mark::OnStack;
            path.push(start);

            while !stack.is_empty() {
                // Advance the top frame; end its borrow before mutating the stack.
                let (idx, child) = {
                    let frame = stack.last_mut().expect("stack checked non-empty");
                    let idx = frame.0;
                    if frame.1 < self.nodes[idx].dependents.len() {
                        let child = self.nodes[idx].dependents[frame.1];
                        frame.1 += 1;
                        (idx, Some(child))
                    } else {
                        (idx, None)
                    }
                };

                match child {
                    Some(child) => match marks[child] {
                        Mark::Unvisited => {
                            marks[child] = Mark::OnStack;
                            path.push(child);
                            stack.push((child, 0));
                        }
                        Mark::OnStack => {
                            let cycle_start =
                                path.iter().position(|&p| p == child).unwrap_or(0);
                            let involved = path[cycle_start..]
                                .iter()
                                .map(|&i| self.nodes[i].workstream.id.clone())
                                .collect();
                            return Err(ScheduleError::CircularDependency { involved });
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[idx] = Mark::Done;
                        path.pop();
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }
}
