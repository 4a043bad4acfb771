//! Dependency graph validation.

use std::collections::{HashMap, VecDeque};

use crate::error::{SwarmError, SwarmResult};

/// Task ids and their dependencies, in registration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Returns `false` if `id` is already present.
    pub fn add(&mut self, id: impl Into<String>, dependencies: Vec<String>) -> bool {
        let id = id.into();
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push((id, dependencies));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(id, _)| id.as_str())
    }

    pub fn dependencies(&self, id: &str) -> Option<&[String]> {
        self.index.get(id).map(|&i| self.nodes[i].1.as_slice())
    }

    /// Check that every dependency exists and that the graph is acyclic.
    ///
    /// Returns the ids in a valid execution order. Ties keep registration order.
    pub fn topological_sort(&self) -> SwarmResult<Vec<String>> {
        for (id, deps) in &self.nodes {
            if let Some(missing) = deps.iter().find(|d| !self.index.contains_key(d.as_str())) {
                return Err(SwarmError::UnknownDependency {
                    task: id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let mut in_degree: Vec<usize> = self.nodes.iter().map(|(_, deps)| deps.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, (_, deps)) in self.nodes.iter().enumerate() {
            for dep in deps {
                dependents[self.index[dep.as_str()]].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = queue.pop_front() {
            order.push(self.nodes[i].0.clone());
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(SwarmError::CycleDetected(self.find_cycle(&in_degree)));
        }

        Ok(order)
    }

    /// Walk dependency edges between unresolved nodes until one repeats.
    ///
    /// Every node left with a non-zero in-degree has at least one unresolved
    /// dependency, so the walk always closes a loop.
    fn find_cycle(&self, in_degree: &[usize]) -> Vec<String> {
        let Some(start) = in_degree.iter().position(|&d| d > 0) else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&pos) = seen.get(&current) {
                let mut cycle: Vec<String> =
                    path[pos..].iter().map(|&i| self.nodes[i].0.clone()).collect();
                cycle.push(self.nodes[current].0.clone());
                return cycle;
            }
            seen.insert(current, path.len());
            path.push(current);

            let next = self.nodes[current]
                .1
                .iter()
                .map(|dep| self.index[dep.as_str()])
                .find(|&i| in_degree[i] > 0);

            match next {
                Some(next) => current = next,
                None => {
                    return path.iter().map(|&i| self.nodes[i].0.clone()).collect();
                }
            }
        }
    }
}
