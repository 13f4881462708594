//! Usage graph with topological ordering
//!
//! Orders things that use each other (composites wrapping composites,
//! mixins depending on sibling mixins) so that every node comes after
//! everything it uses.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

/// A cycle found while walking the graph, first node repeated at the end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    pub cycle: Vec<T>,
}

impl<T: fmt::Display> fmt::Display for CycleError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cyclic usage: ")?;
        for (i, node) in self.cycle.iter().enumerate() {
            if i > 0 {
                f.write_str(" → ")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for CycleError<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed "uses" graph over a fixed node list
#[derive(Debug, Clone)]
pub struct UsageGraph<T> {
    nodes: Vec<T>,
    index: HashMap<T, usize>,
    uses: Vec<Vec<usize>>,
    allow_cycles: bool,
}

impl<T: Clone + Eq + Hash> UsageGraph<T> {
    /// Build the graph. Duplicate nodes are collapsed, and uses of
    /// anything outside `nodes` are ignored.
    pub fn new<N, F, I>(nodes: N, uses: F, allow_cycles: bool) -> Self
    where
        N: IntoIterator<Item = T>,
        F: Fn(&T) -> I,
        I: IntoIterator<Item = T>,
    {
        let mut index = HashMap::new();
        let mut ordered = Vec::new();
        for node in nodes {
            if !index.contains_key(&node) {
                index.insert(node.clone(), ordered.len());
                ordered.push(node);
            }
        }

        let edges = ordered
            .iter()
            .map(|node| {
                let mut targets = Vec::new();
                for used in uses(node) {
                    if let Some(&target) = index.get(&used) {
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                }
                targets
            })
            .collect();

        Self {
            nodes: ordered,
            index,
            uses: edges,
            allow_cycles,
        }
    }

    pub fn nodes(&self) -> &[T] {
        &self.nodes
    }

    pub fn allows_cycles(&self) -> bool {
        self.allow_cycles
    }

    /// Does `user` use `used`, directly or through other nodes?
    ///
    /// Fails on any cycle in the graph unless cycles are allowed.
    pub fn transitive_use(&self, user: &T, used: &T) -> Result<bool, CycleError<T>> {
        if !self.allow_cycles {
            self.walk(false)?;
        }

        let (Some(&from), Some(&to)) = (self.index.get(user), self.index.get(used)) else {
            return Ok(false);
        };

        let mut seen = vec![false; self.nodes.len()];
        let mut queue: VecDeque<usize> = self.uses[from].iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if next == to {
                return Ok(true);
            }
            if !seen[next] {
                seen[next] = true;
                queue.extend(self.uses[next].iter().copied());
            }
        }
        Ok(false)
    }

    /// All nodes, each one after everything it uses
    pub fn resolve_order(&self) -> Result<Vec<T>, CycleError<T>> {
        let order = self.walk(self.allow_cycles)?;
        Ok(order.into_iter().map(|i| self.nodes[i].clone()).collect())
    }

    fn walk(&self, allow_cycles: bool) -> Result<Vec<usize>, CycleError<T>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for start in 0..self.nodes.len() {
            self.visit(start, allow_cycles, &mut marks, &mut stack, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        allow_cycles: bool,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), CycleError<T>> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress if allow_cycles => return Ok(()),
            Mark::InProgress => {
                let start = stack.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<T> = stack[start..]
                    .iter()
                    .map(|&i| self.nodes[i].clone())
                    .collect();
                cycle.push(self.nodes[node].clone());
                return Err(CycleError { cycle });
            }
            Mark::Unvisited => {}
        }

        marks[node] = Mark::InProgress;
        stack.push(node);
        for &used in &self.uses[node] {
            self.visit(used, allow_cycles, marks, stack, order)?;
        }
        stack.pop();
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Edges = &'static [(&'static str, &'static str)];

    const OPEN_ENDED: Edges = &[
        ("thing1", "thing3"),
        ("thing2", "thing3"),
        ("thing3", "thing4"),
        ("thing4", "thing5"),
        ("thing1", "thing6"),
        ("thing7", "thing1"),
        ("thing7", "thing2"),
        ("thing7", "thing4"),
    ];

    const CYCLIC: Edges = &[
        ("thing1", "thing3"),
        ("thing2", "thing3"),
        ("thing3", "thing4"),
        ("thing4", "thing5"),
        ("thing5", "thing1"),
        ("thing1", "thing6"),
        ("thing7", "thing1"),
        ("thing7", "thing2"),
        ("thing7", "thing4"),
    ];

    const NODES: [&str; 7] = [
        "thing7", "thing4", "thing3", "thing1", "thing6", "thing5", "thing2",
    ];

    fn graph(edges: Edges, nodes: Vec<&'static str>, allow_cycles: bool) -> UsageGraph<&'static str> {
        UsageGraph::new(
            nodes,
            |node: &&'static str| {
                edges
                    .iter()
                    .filter(|(from, _)| from == node)
                    .map(|(_, to)| *to)
                    .collect::<Vec<_>>()
            },
            allow_cycles,
        )
    }

    /// Every rotation of the input order, so ordering never depends on it
    fn permutations() -> Vec<Vec<&'static str>> {
        (0..NODES.len())
            .map(|shift| {
                let mut nodes = NODES.to_vec();
                nodes.rotate_left(shift);
                nodes
            })
            .chain(std::iter::once(NODES.iter().rev().copied().collect()))
            .collect()
    }

    fn position(order: &[&str], node: &str) -> usize {
        order.iter().position(|n| *n == node).unwrap()
    }

    #[test]
    fn test_open_ended_graph_transitive_use() {
        let deps = graph(OPEN_ENDED, NODES.to_vec(), false);
        let uses = |a: &'static str, b: &'static str| deps.transitive_use(&a, &b).unwrap();

        assert!(!uses("thing1", "thing1"));
        assert!(!uses("thing1", "thing2"));
        assert!(uses("thing1", "thing3"));
        assert!(uses("thing1", "thing5"));
        assert!(uses("thing1", "thing6"));
        assert!(!uses("thing1", "thing7"));
        assert!(uses("thing2", "thing5"));
        assert!(!uses("thing2", "thing6"));
        assert!(!uses("thing3", "thing3"));
        assert!(uses("thing3", "thing5"));
        assert!(!uses("thing5", "thing4"));
        assert!(!uses("thing6", "thing1"));
        assert!(uses("thing7", "thing6"));
        assert!(!uses("thing7", "thing7"));
    }

    #[test]
    fn test_open_ended_graph_resolve_order() {
        for nodes in permutations() {
            let order = graph(OPEN_ENDED, nodes, false).resolve_order().unwrap();
            assert_eq!(order.len(), 7);
            for (user, used) in OPEN_ENDED {
                assert!(
                    position(&order, user) > position(&order, used),
                    "{} must come after {} in {:?}",
                    user,
                    used,
                    order
                );
            }
            assert!(position(&order, "thing7") > position(&order, "thing5"));
            assert!(position(&order, "thing2") > position(&order, "thing5"));
        }
    }

    #[test]
    fn test_resolve_order_is_stable_for_same_input() {
        let first = graph(OPEN_ENDED, NODES.to_vec(), false).resolve_order().unwrap();
        let second = graph(OPEN_ENDED, NODES.to_vec(), false).resolve_order().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cycle_detected_by_resolve_order() {
        for nodes in permutations() {
            let err = graph(CYCLIC, nodes, false).resolve_order().unwrap_err();
            assert_eq!(err.cycle.first(), err.cycle.last());
            assert!(err.cycle.len() >= 5);
        }
    }

    #[test]
    fn test_cycle_detected_by_transitive_use() {
        let deps = graph(CYCLIC, NODES.to_vec(), false);
        assert!(deps.transitive_use(&"thing1", &"thing3").is_err());
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let deps = graph(&[("a", "b"), ("b", "a")], vec!["a", "b"], false);
        let err = deps.resolve_order().unwrap_err();
        assert_eq!(err.to_string(), "cyclic usage: a → b → a");
    }

    #[test]
    fn test_cyclic_graph_allowed() {
        for nodes in permutations() {
            let deps = graph(CYCLIC, nodes, true);
            let uses = |a: &'static str, b: &'static str| deps.transitive_use(&a, &b).unwrap();

            assert!(uses("thing1", "thing1"));
            assert!(!uses("thing1", "thing2"));
            assert!(uses("thing2", "thing1"));
            assert!(!uses("thing2", "thing2"));
            assert!(uses("thing2", "thing6"));
            assert!(uses("thing3", "thing3"));
            assert!(uses("thing4", "thing6"));
            assert!(uses("thing5", "thing5"));
            assert!(!uses("thing6", "thing6"));
            assert!(!uses("thing7", "thing7"));
            assert!(uses("thing7", "thing6"));

            let order = deps.resolve_order().unwrap();
            assert_eq!(order.len(), 7);
            assert!(position(&order, "thing1") > position(&order, "thing6"));
            assert!(position(&order, "thing2") > position(&order, "thing3"));
            assert!(position(&order, "thing2") > position(&order, "thing4"));
            assert!(position(&order, "thing2") > position(&order, "thing5"));
            assert!(position(&order, "thing2") > position(&order, "thing1"));
            assert!(position(&order, "thing7") > position(&order, "thing1"));
            assert!(position(&order, "thing7") > position(&order, "thing2"));
            assert!(position(&order, "thing7") > position(&order, "thing4"));
        }
    }

    #[test]
    fn test_uses_outside_the_graph_are_ignored() {
        let deps = graph(&[("a", "missing")], vec!["a"], false);
        assert_eq!(deps.resolve_order().unwrap(), vec!["a"]);
        assert!(!deps.transitive_use(&"a", &"missing").unwrap());
    }
}
