//! Dependency resolution for units.

use crate::error::ResolveError;
use crate::registry::UnitRegistry;
use ignite_core::{Relation, UnitDescriptor, UnitName};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// The induced dependency graph of one request.
///
/// Nodes are the transitive closure of the requested units, kept in
/// registration order. An edge `a -> b` means `a` must be set up before
/// `b`; it comes from `b` depending on `a`, `b` being declared after `a`,
/// or `a` being declared before `b`.
///
/// A reference to a group also stands for the group's planned members, and
/// members inherit the `after`/`before` constraints of their groups.
#[derive(Debug)]
pub struct DependencyGraph {
    units: Vec<Arc<UnitDescriptor>>,
    /// node -> [nodes that must precede it]
    prerequisites: Vec<BTreeSet<usize>>,
    /// Members of exclusive groups that lost to an earlier member
    excluded: BTreeSet<UnitName>,
}

impl DependencyGraph {
    /// Build the graph for `requested` against `registry`.
    ///
    /// Fails on the first unknown unit name and on any conflicting pair
    /// inside the closure. Cycles are left for the scheduler to detect.
    pub fn build(registry: &UnitRegistry, requested: &[UnitName]) -> Result<Self, ResolveError> {
        Self::build_skipping(registry, requested, &[])
    }

    /// Like [`build`](Self::build), but a `skipped` unit is never chosen as
    /// the member of an exclusive group.
    pub fn build_skipping(
        registry: &UnitRegistry,
        requested: &[UnitName],
        skipped: &[UnitName],
    ) -> Result<Self, ResolveError> {
        let skipped: HashSet<&str> = skipped.iter().map(UnitName::as_str).collect();

        let (closure, discovered) = Self::closure(registry, requested, &skipped)?;
        let excluded = Self::exclusive_losers(registry, &closure, &discovered, &skipped);
        let units: Vec<_> = closure.into_values().collect();

        Self::check_conflicts(&units)?;
        let prerequisites = Self::prerequisites_of(registry, &units);

        Ok(Self {
            units,
            prerequisites,
            excluded,
        })
    }

    /// Repeatedly add dependencies and group members until nothing new is
    /// found.
    ///
    /// Keyed by registration index so iteration follows declaration order;
    /// `discovered` keeps the order units were reached in.
    fn closure(
        registry: &UnitRegistry,
        requested: &[UnitName],
        skipped: &HashSet<&str>,
    ) -> Result<(BTreeMap<usize, Arc<UnitDescriptor>>, Vec<usize>), ResolveError> {
        let mut closure = BTreeMap::new();
        let mut discovered = Vec::new();
        let mut queue: VecDeque<(&UnitName, Option<&UnitName>)> =
            requested.iter().map(|name| (name, None)).collect();

        loop {
            while let Some((name, referrer)) = queue.pop_front() {
                let (index, unit) =
                    registry
                        .entry(name.as_str())
                        .ok_or_else(|| ResolveError::UnknownUnit {
                            name: name.clone(),
                            referenced_by: referrer.cloned(),
                        })?;

                if closure.contains_key(&index) {
                    continue;
                }

                for (relation, other) in unit.references() {
                    if relation != Relation::DependsOn && !registry.contains(other.as_str()) {
                        return Err(ResolveError::UnknownUnit {
                            name: other.clone(),
                            referenced_by: Some(unit.name.clone()),
                        });
                    }
                }

                queue.extend(unit.dependencies.iter().map(|dep| (dep, Some(&unit.name))));
                if !unit.exclusive {
                    let members = registry.members(unit.name.as_str());
                    queue.extend(members.into_iter().map(|(_, member)| (&member.name, Some(&unit.name))));
                }
                closure.insert(index, Arc::clone(unit));
                discovered.push(index);
            }

            // An exclusive group without an eligible planned member takes
            // its first registered one.
            let groups: Vec<&Arc<UnitDescriptor>> = closure
                .keys()
                .filter_map(|&index| registry.at(index))
                .filter(|unit| unit.exclusive)
                .collect();
            let vacant = groups.into_iter().find_map(|group| {
                let eligible = |member: &&Arc<UnitDescriptor>| !skipped.contains(member.name.as_str());
                let members = registry.members(group.name.as_str());
                if members
                    .iter()
                    .any(|(index, member)| closure.contains_key(index) && eligible(member))
                {
                    return None;
                }
                members
                    .into_iter()
                    .map(|(_, member)| member)
                    .find(eligible)
                    .map(|member| (&member.name, &group.name))
            });

            match vacant {
                Some((member, group)) => {
                    debug!(%group, %member, "Choosing member of exclusive group");
                    queue.push_back((member, Some(group)));
                }
                None => break,
            }
        }

        Ok((closure, discovered))
    }

    /// Members of an exclusive group planned after another member of it.
    fn exclusive_losers(
        registry: &UnitRegistry,
        closure: &BTreeMap<usize, Arc<UnitDescriptor>>,
        discovered: &[usize],
        skipped: &HashSet<&str>,
    ) -> BTreeSet<UnitName> {
        // group -> member that won it
        let mut chosen: HashMap<&UnitName, &UnitName> = HashMap::new();
        let mut excluded = BTreeSet::new();

        for index in discovered {
            let unit = &closure[index];
            if skipped.contains(unit.name.as_str()) {
                continue;
            }

            let groups: Vec<&UnitName> = unit
                .groups
                .iter()
                .filter(|group| registry.get(group.as_str()).is_some_and(|g| g.exclusive))
                .collect();

            let taken = groups
                .iter()
                .find_map(|group| chosen.get(*group).map(|winner| (*group, *winner)));
            match taken {
                Some((group, winner)) => {
                    debug!(unit = %unit.name, %group, %winner, "Dropping member of exclusive group");
                    excluded.insert(unit.name.clone());
                }
                None => {
                    for group in groups {
                        chosen.insert(group, &unit.name);
                    }
                }
            }
        }

        excluded
    }

    /// Edges from dependencies and ordering constraints, with group names
    /// standing for their planned members.
    fn prerequisites_of(registry: &UnitRegistry, units: &[Arc<UnitDescriptor>]) -> Vec<BTreeSet<usize>> {
        let mut stands_for: HashMap<&UnitName, Vec<usize>> = HashMap::new();
        for (index, unit) in units.iter().enumerate() {
            stands_for.entry(&unit.name).or_default().push(index);
            for group in &unit.groups {
                stands_for.entry(group).or_default().push(index);
            }
        }
        let positions = |name: &UnitName| stands_for.get(name).into_iter().flatten().copied();

        let mut prerequisites = vec![BTreeSet::new(); units.len()];
        for (index, unit) in units.iter().enumerate() {
            let groups: Vec<&Arc<UnitDescriptor>> = unit
                .groups
                .iter()
                .filter_map(|group| registry.get(group.as_str()))
                .collect();

            let earlier = unit
                .dependencies
                .iter()
                .chain(&unit.after)
                .chain(groups.iter().flat_map(|group| group.after.iter()));
            for from in earlier.flat_map(positions) {
                if from != index {
                    prerequisites[index].insert(from);
                }
            }

            let later = unit
                .before
                .iter()
                .chain(groups.iter().flat_map(|group| group.before.iter()));
            for to in later.flat_map(positions) {
                if to != index {
                    prerequisites[to].insert(index);
                }
            }
        }

        prerequisites
    }

    /// Conflicts are symmetric: either side declaring one is enough.
    fn check_conflicts(units: &[Arc<UnitDescriptor>]) -> Result<(), ResolveError> {
        for (index, first) in units.iter().enumerate() {
            for second in &units[index + 1..] {
                if first.declares_conflict(&second.name) || second.declares_conflict(&first.name) {
                    return Err(ResolveError::Conflict {
                        first: first.name.clone(),
                        second: second.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Units of the graph in registration order.
    pub fn units(&self) -> &[Arc<UnitDescriptor>] {
        &self.units
    }

    /// Positions of the units that must precede the unit at `node`.
    pub fn prerequisites(&self, node: usize) -> &BTreeSet<usize> {
        &self.prerequisites[node]
    }

    /// Whether `name` lost its exclusive group to another member and must
    /// not be entered.
    pub fn is_excluded(&self, name: &UnitName) -> bool {
        self.excluded.contains(name)
    }

    /// Units dropped from their exclusive group.
    pub fn excluded(&self) -> impl Iterator<Item = &UnitName> {
        self.excluded.iter()
    }

    /// Check if a unit is part of the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.units.iter().any(|unit| unit.name.as_str() == name)
    }

    /// All edges as `(earlier, later)` name pairs.
    pub fn edges(&self) -> Vec<(&UnitName, &UnitName)> {
        self.prerequisites
            .iter()
            .enumerate()
            .flat_map(|(later, earlier)| {
                earlier
                    .iter()
                    .map(move |&from| (&self.units[from].name, &self.units[later].name))
            })
            .collect()
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the graph has no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(units: Vec<UnitDescriptor>) -> UnitRegistry {
        let mut registry = UnitRegistry::new();
        registry.register_all(units).unwrap();
        registry
    }

    fn names(graph: &DependencyGraph) -> Vec<&str> {
        graph.units().iter().map(|u| u.name.as_str()).collect()
    }

    fn edges(graph: &DependencyGraph) -> Vec<(&str, &str)> {
        graph
            .edges()
            .into_iter()
            .map(|(from, to)| (from.as_str(), to.as_str()))
            .collect()
    }

    #[test]
    fn test_transitive_closure() {
        let registry = registry(vec![
            UnitDescriptor::marker("db"),
            UnitDescriptor::marker("unused"),
            UnitDescriptor::marker("cache").depends_on("db"),
            UnitDescriptor::marker("api").depends_on("cache"),
        ]);

        let graph = DependencyGraph::build(&registry, &["api".into()]).unwrap();
        assert_eq!(names(&graph), vec!["db", "cache", "api"]);
        assert!(!graph.contains("unused"));
        assert_eq!(edges(&graph), vec![("db", "cache"), ("cache", "api")]);
    }

    #[test]
    fn test_diamond_is_deduplicated() {
        let registry = registry(vec![
            UnitDescriptor::marker("base"),
            UnitDescriptor::marker("left").depends_on("base"),
            UnitDescriptor::marker("right").depends_on("base"),
            UnitDescriptor::marker("top").depends_on("left").depends_on("right"),
        ]);

        let graph = DependencyGraph::build(&registry, &["top".into(), "base".into()]).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.prerequisites(3).len(), 2);
    }

    #[test]
    fn test_unknown_requested_unit() {
        let registry = registry(vec![UnitDescriptor::marker("db")]);

        let err = DependencyGraph::build(&registry, &["queue".into()]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownUnit {
                name: "queue".into(),
                referenced_by: None,
            }
        );
    }

    #[test]
    fn test_unknown_dependency_names_referrer() {
        let registry = registry(vec![UnitDescriptor::marker("cache").depends_on("db")]);

        let err = DependencyGraph::build(&registry, &["cache".into()]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownUnit {
                name: "db".into(),
                referenced_by: Some("cache".into()),
            }
        );
    }

    #[test]
    fn test_unknown_ordering_reference() {
        let registry = registry(vec![UnitDescriptor::marker("cache").after("ghost")]);

        let err = DependencyGraph::build(&registry, &["cache".into()]).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownUnit { ref name, .. } if name.as_str() == "ghost"));
    }

    #[test]
    fn test_conflict_declared_on_one_side() {
        let registry = registry(vec![
            UnitDescriptor::marker("a"),
            UnitDescriptor::marker("b").conflicts_with("a"),
        ]);

        let err = DependencyGraph::build(&registry, &["a".into(), "b".into()]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Conflict {
                first: "a".into(),
                second: "b".into(),
            }
        );
    }

    #[test]
    fn test_conflict_pulled_in_by_dependency() {
        let registry = registry(vec![
            UnitDescriptor::marker("a").conflicts_with("b"),
            UnitDescriptor::marker("b").conflicts_with("a"),
            UnitDescriptor::marker("c").depends_on("b"),
        ]);

        let err = DependencyGraph::build(&registry, &["a".into(), "c".into()]).unwrap_err();
        assert!(matches!(err, ResolveError::Conflict { .. }));
    }

    #[test]
    fn test_conflict_outside_closure_is_ignored() {
        let registry = registry(vec![
            UnitDescriptor::marker("a").conflicts_with("b"),
            UnitDescriptor::marker("b"),
        ]);

        let graph = DependencyGraph::build(&registry, &["a".into()]).unwrap();
        assert_eq!(names(&graph), vec!["a"]);
    }

    #[test]
    fn test_ordering_constraints_only_apply_within_closure() {
        let registry = registry(vec![
            UnitDescriptor::marker("log"),
            UnitDescriptor::marker("server").after("log").before("metrics"),
            UnitDescriptor::marker("metrics"),
        ]);

        let graph = DependencyGraph::build(&registry, &["server".into()]).unwrap();
        assert_eq!(names(&graph), vec!["server"]);
        assert!(graph.prerequisites(0).is_empty());

        let graph =
            DependencyGraph::build(&registry, &["metrics".into(), "server".into(), "log".into()])
                .unwrap();
        assert_eq!(edges(&graph), vec![("log", "server"), ("server", "metrics")]);
    }

    fn storage() -> Vec<UnitDescriptor> {
        vec![
            UnitDescriptor::marker("storage").exclusive(),
            UnitDescriptor::marker("sqlite").belongs_to("storage"),
            UnitDescriptor::marker("postgres").belongs_to("storage"),
            UnitDescriptor::marker("api").depends_on("storage"),
        ]
    }

    #[test]
    fn test_group_plans_all_members() {
        let registry = registry(vec![
            UnitDescriptor::marker("web"),
            UnitDescriptor::marker("http").belongs_to("web"),
            UnitDescriptor::marker("assets").belongs_to("web"),
            UnitDescriptor::marker("unrelated"),
        ]);

        let graph = DependencyGraph::build(&registry, &["web".into()]).unwrap();
        assert_eq!(names(&graph), vec!["web", "http", "assets"]);
        assert_eq!(graph.excluded().count(), 0);
    }

    #[test]
    fn test_exclusive_group_plans_first_member() {
        let registry = registry(storage());

        let graph = DependencyGraph::build(&registry, &["api".into()]).unwrap();
        assert_eq!(names(&graph), vec!["storage", "sqlite", "api"]);
        assert!(!graph.contains("postgres"));
    }

    #[test]
    fn test_exclusive_group_prefers_requested_member() {
        let registry = registry(storage());

        let graph = DependencyGraph::build(&registry, &["postgres".into(), "api".into()]).unwrap();
        assert_eq!(names(&graph), vec!["storage", "postgres", "api"]);
        assert_eq!(graph.excluded().count(), 0);
    }

    #[test]
    fn test_exclusive_group_skips_disabled_member() {
        let registry = registry(storage());

        let graph =
            DependencyGraph::build_skipping(&registry, &["api".into()], &["sqlite".into()]).unwrap();
        assert_eq!(names(&graph), vec!["storage", "postgres", "api"]);
    }

    #[test]
    fn test_exclusive_group_drops_later_member() {
        let registry = registry(storage());

        let graph = DependencyGraph::build(
            &registry,
            &["sqlite".into(), "postgres".into(), "api".into()],
        )
        .unwrap();
        assert_eq!(names(&graph), vec!["storage", "sqlite", "postgres", "api"]);
        assert!(graph.is_excluded(&"postgres".into()));
        assert!(!graph.is_excluded(&"sqlite".into()));
    }

    #[test]
    fn test_group_ordering_applies_to_members() {
        let registry = registry(vec![
            UnitDescriptor::marker("log"),
            UnitDescriptor::marker("server"),
            UnitDescriptor::marker("storage").after("log").before("server"),
            UnitDescriptor::marker("db").belongs_to("storage"),
            UnitDescriptor::marker("backup").after("storage"),
        ]);

        let graph = DependencyGraph::build(
            &registry,
            &["server".into(), "backup".into(), "db".into(), "log".into()],
        )
        .unwrap();
        assert_eq!(names(&graph), vec!["log", "server", "db", "backup"]);
        assert_eq!(edges(&graph), vec![("db", "server"), ("log", "db"), ("db", "backup")]);
    }

    #[test]
    fn test_unknown_group() {
        let registry = registry(vec![UnitDescriptor::marker("db").belongs_to("ghost")]);

        let err = DependencyGraph::build(&registry, &["db".into()]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownUnit {
                name: "ghost".into(),
                referenced_by: Some("db".into()),
            }
        );
    }
}
