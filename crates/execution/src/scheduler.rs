//! Deterministic ordering of a dependency graph.

use crate::dependency::DependencyGraph;
use crate::error::ResolveError;
use ignite_core::{UnitDescriptor, UnitName};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Orders the units of a [`DependencyGraph`] for setup.
pub struct Scheduler;

impl Scheduler {
    /// Get units in topological order (prerequisites first).
    ///
    /// Among units whose prerequisites are all placed, the one registered
    /// earliest goes next, so the same registry and request always produce
    /// the same order.
    pub fn order(graph: &DependencyGraph) -> Result<Vec<Arc<UnitDescriptor>>, ResolveError> {
        let units = graph.units();

        // node -> [nodes waiting on it]
        let mut dependents = vec![Vec::new(); units.len()];
        let mut in_degree = vec![0usize; units.len()];
        for node in 0..units.len() {
            for &prerequisite in graph.prerequisites(node) {
                dependents[prerequisite].push(node);
                in_degree[node] += 1;
            }
        }

        // Node indices follow registration order, so the smallest ready
        // index is the earliest registered ready unit.
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| Reverse(node))
            .collect();

        let mut sorted = Vec::with_capacity(units.len());
        while let Some(Reverse(node)) = ready.pop() {
            sorted.push(Arc::clone(&units[node]));

            for &dependent in &dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if sorted.len() < units.len() {
            return Err(ResolveError::CyclicDependency {
                cycle: Self::find_cycle(graph, &in_degree),
            });
        }

        Ok(sorted)
    }

    /// Walk unplaced prerequisites until a unit repeats.
    ///
    /// Every node left with a non-zero in-degree has at least one unplaced
    /// prerequisite, so the walk cannot dead-end.
    fn find_cycle(graph: &DependencyGraph, in_degree: &[usize]) -> Vec<UnitName> {
        let units = graph.units();
        let Some(start) = in_degree.iter().position(|&degree| degree > 0) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut seen_at = vec![None; units.len()];
        seen_at[start] = Some(0);

        let mut node = start;
        loop {
            let Some(&next) = graph
                .prerequisites(node)
                .iter()
                .find(|&&prerequisite| in_degree[prerequisite] > 0)
            else {
                break;
            };

            if let Some(index) = seen_at[next] {
                // The walk runs against the edges; reverse it so the cycle
                // reads in setup order and closes on `next`.
                return std::iter::once(next)
                    .chain(path[index..].iter().rev().copied())
                    .map(|n| units[n].name.clone())
                    .collect();
            }

            seen_at[next] = Some(path.len());
            path.push(next);
            node = next;
        }

        path.into_iter().map(|n| units[n].name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UnitRegistry;

    fn order(units: Vec<UnitDescriptor>, requested: &[&str]) -> Result<Vec<String>, ResolveError> {
        let mut registry = UnitRegistry::new();
        registry.register_all(units).unwrap();
        let requested: Vec<UnitName> = requested.iter().map(|&n| n.into()).collect();

        let graph = DependencyGraph::build(&registry, &requested)?;
        Ok(Scheduler::order(&graph)?
            .iter()
            .map(|u| u.name.to_string())
            .collect())
    }

    fn cycle_of(err: ResolveError) -> Vec<String> {
        match err {
            ResolveError::CyclicDependency { cycle } => cycle.iter().map(|n| n.to_string()).collect(),
            other => panic!("expected a cycle, got {other}"),
        }
    }

    #[test]
    fn test_dependency_first() {
        let sorted = order(
            vec![
                UnitDescriptor::marker("db"),
                UnitDescriptor::marker("cache").depends_on("db"),
            ],
            &["cache"],
        )
        .unwrap();
        assert_eq!(sorted, vec!["db", "cache"]);
    }

    #[test]
    fn test_dependency_registered_later() {
        let sorted = order(
            vec![
                UnitDescriptor::marker("cache").depends_on("db"),
                UnitDescriptor::marker("db"),
            ],
            &["cache"],
        )
        .unwrap();
        assert_eq!(sorted, vec!["db", "cache"]);
    }

    #[test]
    fn test_ties_break_by_registration_order() {
        let units = || {
            vec![
                UnitDescriptor::marker("c"),
                UnitDescriptor::marker("a"),
                UnitDescriptor::marker("b"),
                UnitDescriptor::marker("d").depends_on("b").depends_on("a"),
            ]
        };

        let sorted = order(units(), &["d", "c"]).unwrap();
        assert_eq!(sorted, vec!["c", "a", "b", "d"]);

        // Request order does not matter.
        assert_eq!(order(units(), &["c", "d"]).unwrap(), sorted);
    }

    #[test]
    fn test_ready_unit_registered_earlier_jumps_ahead() {
        // `late` only becomes ready after `first`; `second` was ready all
        // along but is registered after `late`.
        let sorted = order(
            vec![
                UnitDescriptor::marker("first"),
                UnitDescriptor::marker("late").depends_on("first"),
                UnitDescriptor::marker("second"),
            ],
            &["late", "second"],
        )
        .unwrap();
        assert_eq!(sorted, vec!["first", "late", "second"]);
    }

    #[test]
    fn test_after_and_before() {
        let sorted = order(
            vec![
                UnitDescriptor::marker("server").after("log"),
                UnitDescriptor::marker("log"),
                UnitDescriptor::marker("metrics"),
                UnitDescriptor::marker("config").before("log"),
            ],
            &["server", "log", "metrics", "config"],
        )
        .unwrap();
        assert_eq!(sorted, vec!["metrics", "config", "log", "server"]);
    }

    #[test]
    fn test_two_unit_cycle() {
        let err = order(
            vec![
                UnitDescriptor::marker("x").depends_on("y"),
                UnitDescriptor::marker("y").depends_on("x"),
            ],
            &["x"],
        )
        .unwrap_err();

        let cycle = cycle_of(err);
        assert_eq!(cycle.len(), 3);
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&"x".to_string()));
        assert!(cycle.contains(&"y".to_string()));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = order(vec![UnitDescriptor::marker("x").depends_on("x")], &["x"]).unwrap_err();
        assert_eq!(cycle_of(err), vec!["x", "x"]);
    }

    #[test]
    fn test_cycle_excludes_units_outside_it() {
        let err = order(
            vec![
                UnitDescriptor::marker("root"),
                UnitDescriptor::marker("a").depends_on("root").depends_on("c"),
                UnitDescriptor::marker("b").depends_on("a"),
                UnitDescriptor::marker("c").depends_on("b"),
                UnitDescriptor::marker("tail").depends_on("c"),
            ],
            &["tail"],
        )
        .unwrap_err();

        let cycle = cycle_of(err);
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        assert!(!cycle.contains(&"root".to_string()));
        assert!(!cycle.contains(&"tail".to_string()));
    }

    #[test]
    fn test_random_graphs_order_prerequisites_first() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};

        for seed in 0..64u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let count: usize = rng.random_range(2..12);

            // Edges only point from lower to higher node numbers, so the
            // graph is acyclic; registration order is shuffled.
            let mut edges = Vec::new();
            for later in 1..count {
                for earlier in 0..later {
                    if rng.random_bool(0.3) {
                        edges.push((earlier, later, rng.random_range(0..3u8)));
                    }
                }
            }
            let mut registration: Vec<usize> = (0..count).collect();
            registration.shuffle(&mut rng);

            let descriptors = || -> Vec<UnitDescriptor> {
                registration
                    .iter()
                    .map(|&node| {
                        let mut unit = UnitDescriptor::marker(format!("n{node}"));
                        for &(earlier, later, kind) in &edges {
                            match kind {
                                0 if later == node => unit = unit.depends_on(format!("n{earlier}")),
                                1 if later == node => unit = unit.after(format!("n{earlier}")),
                                2 if earlier == node => unit = unit.before(format!("n{later}")),
                                _ => {}
                            }
                        }
                        unit
                    })
                    .collect()
            };
            let names: Vec<String> = registration.iter().map(|node| format!("n{node}")).collect();
            let mut requested: Vec<&str> = names.iter().map(String::as_str).collect();

            let ordered = order(descriptors(), &requested).unwrap();
            assert_eq!(ordered.len(), count, "seed {seed}");

            let position = |node: usize| {
                let name = format!("n{node}");
                ordered.iter().position(|n| *n == name).unwrap()
            };
            for &(earlier, later, _) in &edges {
                assert!(
                    position(earlier) < position(later),
                    "seed {seed}: n{earlier} must precede n{later} in {ordered:?}"
                );
            }

            requested.reverse();
            assert_eq!(order(descriptors(), &requested).unwrap(), ordered, "seed {seed}");
        }
    }
}
