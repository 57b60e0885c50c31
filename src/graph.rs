use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Direct dependencies of every calculation, keyed by result column name.
///
/// A dependency set may name raw row fields as well as other calculations;
/// only names that have their own entry are treated as calculations when
/// walking the graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the dependency set for `name`. Acyclicity is checked by the
    /// caller through [`DependencyGraph::cycle_through`].
    pub fn set(&mut self, name: &str, dependencies: BTreeSet<String>) {
        self.edges.insert(name.to_string(), dependencies);
    }

    /// Deletes `name`'s entry and severs every other entry's reference to it.
    pub fn remove(&mut self, name: &str) {
        self.edges.remove(name);
        for dependencies in self.edges.values_mut() {
            dependencies.remove(name);
        }
    }

    /// Deletes only `name`'s own entry; references from other entries stay.
    pub fn remove_entry(&mut self, name: &str) {
        self.edges.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(name)
    }

    /// Calculations that `name` transitively depends on.
    pub fn precedents(&self, name: &str) -> BTreeSet<String> {
        match self.edges.get(name) {
            Some(dependencies) => {
                let mut found = self.precedents_of(dependencies);
                found.remove(name);
                found
            }
            None => BTreeSet::new(),
        }
    }

    /// Calculations reachable from `roots` (the roots included when they are calculations).
    ///
    /// # Arguments
    /// * `roots` - Starting names, typically an expression's dependency list
    ///
    /// # Returns
    /// * Every calculation name reached by following dependency edges
    ///
    /// # Notes
    /// * The visited set keeps the walk finite even on a cyclic graph, but a
    ///   cyclic graph is never built through the manager
    pub fn precedents_of(&self, roots: &BTreeSet<String>) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<&str> = roots.iter().map(String::as_str).collect();

        while let Some(current) = stack.pop() {
            let Some(dependencies) = self.edges.get(current) else {
                continue;
            };
            if !visited.insert(current.to_string()) {
                continue;
            }
            for dependency in dependencies {
                if !visited.contains(dependency) {
                    stack.push(dependency);
                }
            }
        }

        visited
    }

    /// Calculations that transitively depend on `name`, found by scanning
    /// every entry for a reference to the current frontier.
    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![name];

        while let Some(current) = stack.pop() {
            for (calculation, dependencies) in &self.edges {
                if dependencies.contains(current) && visited.insert(calculation.clone()) {
                    stack.push(calculation);
                }
            }
        }

        visited.remove(name);
        visited
    }

    /// Looks for a cycle that giving `name` the dependency set `dependencies` would create.
    ///
    /// # Arguments
    /// * `name` - Calculation being added or updated
    /// * `dependencies` - Its prospective direct dependencies; any stored entry
    ///   for `name` is ignored
    ///
    /// # Returns
    /// * `Some(path)` starting and ending at the repeated name, e.g.
    ///   `["a", "b", "a"]`, or `None` when the graph would stay acyclic
    ///
    /// # Implementation Notes
    /// * Depth-first search with a "visiting" marker, so a cycle that already
    ///   exists elsewhere on the path is also reported instead of silently cut
    pub fn cycle_through<'g>(
        &'g self,
        name: &'g str,
        dependencies: &'g BTreeSet<String>,
    ) -> Option<Vec<String>> {
        fn visit<'g>(
            graph: &'g DependencyGraph,
            current: &'g str,
            target: &str,
            marks: &mut HashMap<&'g str, Mark>,
            path: &mut Vec<&'g str>,
        ) -> Option<Vec<String>> {
            if current == target {
                let mut cycle: Vec<String> = path.iter().map(|n| n.to_string()).collect();
                cycle.push(current.to_string());
                return Some(cycle);
            }
            match marks.get(current) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|n| *n == current).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(current.to_string());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(current, Mark::Visiting);
            path.push(current);
            if let Some(dependencies) = graph.edges.get(current) {
                for dependency in dependencies {
                    if let Some(cycle) = visit(graph, dependency, target, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(current, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut path = vec![name];
        for dependency in dependencies {
            if let Some(cycle) = visit(self, dependency, name, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    /// Orders `targets` so that every calculation comes after the calculations
    /// it depends on. Names outside `targets` are walked through but not emitted.
    pub fn topological_order(&self, targets: &BTreeSet<String>) -> Vec<String> {
        fn visit<'g>(
            graph: &'g DependencyGraph,
            name: &'g str,
            targets: &BTreeSet<String>,
            visited: &mut BTreeSet<&'g str>,
            order: &mut Vec<String>,
        ) {
            if !visited.insert(name) {
                return;
            }
            if let Some(dependencies) = graph.edges.get(name) {
                for dependency in dependencies {
                    visit(graph, dependency, targets, visited, order);
                }
            }
            if targets.contains(name) {
                order.push(name.to_string());
            }
        }

        let mut visited = BTreeSet::new();
        let mut order = Vec::with_capacity(targets.len());
        for target in targets {
            visit(self, target, targets, &mut visited, &mut order);
        }
        order
    }
}
