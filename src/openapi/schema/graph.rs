//! Name/dependency graph over declarations.
//!
//! Declarations are stored in registration order. A name is reserved before
//! its body is built so that cyclic references resolve to the name instead of
//! recursing forever.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::algo::kosaraju_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;

use super::expr::Declaration;

#[derive(Debug, Default)]
pub struct DeclarationGraph {
    declarations: IndexMap<String, Option<Declaration>>,
}

impl DeclarationGraph {
    /// Reserve `name` at the current registration position. Returns `false`
    /// when the name was already reserved or defined.
    pub fn reserve(&mut self, name: &str) -> bool {
        if self.declarations.contains_key(name) {
            return false;
        }
        self.declarations.insert(name.to_string(), None);
        true
    }

    /// Store a declaration, keeping the position of an earlier reservation.
    pub fn define(&mut self, declaration: Declaration) {
        let name = declaration.name.clone();
        self.declarations.insert(name, Some(declaration));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Declaration> {
        self.declarations.get_mut(name).and_then(Option::as_mut)
    }

    /// Defined declarations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values().filter_map(Option::as_ref)
    }

    fn edges(&self) -> DiGraphMap<&str, ()> {
        let mut graph = DiGraphMap::new();
        for declaration in self.iter() {
            graph.add_node(declaration.name.as_str());
            for dep in &declaration.depends_on {
                graph.add_edge(declaration.name.as_str(), dep.as_str(), ());
            }
        }
        graph
    }

    /// Every name reachable from `roots`, the roots included.
    pub fn closure<'a, I>(&self, roots: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let graph = self.edges();
        let mut reached = BTreeSet::new();
        for root in roots {
            if !graph.contains_node(root) {
                continue;
            }
            let mut dfs = Dfs::new(&graph, root);
            while let Some(node) = dfs.next(&graph) {
                reached.insert(node.to_string());
            }
        }
        reached
    }

    /// Groups of declarations that reference each other, self-loops included.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let graph = self.edges();
        kosaraju_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| scc.into_iter().map(String::from).collect())
            .collect()
    }

    /// Order `names` so dependencies come first, breaking ties by registration
    /// order. When only cycles remain, the earliest-registered member of a
    /// cycle whose outside dependencies are all emitted goes next, and its
    /// references inside the cycle become forward references.
    ///
    /// Dependencies outside `names` count as already available.
    pub fn emission_order(&self, names: &BTreeSet<String>) -> Vec<&Declaration> {
        let mut pending: Vec<&Declaration> = self
            .iter()
            .filter(|declaration| names.contains(&declaration.name))
            .collect();
        let mut waiting: HashSet<&str> = pending.iter().map(|d| d.name.as_str()).collect();
        let components = self.components();
        let mut order = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = |declaration: &&Declaration, within_cycle: bool| {
                declaration.depends_on.iter().all(|dep| {
                    *dep == declaration.name
                        || !waiting.contains(dep.as_str())
                        || (within_cycle
                            && components.get(dep.as_str()) == components.get(declaration.name.as_str()))
                })
            };
            let Some(next) = pending
                .iter()
                .position(|declaration| ready(declaration, false))
                .or_else(|| pending.iter().position(|declaration| ready(declaration, true)))
            else {
                break;
            };
            let declaration = pending.remove(next);
            waiting.remove(declaration.name.as_str());
            order.push(declaration);
        }
        order
    }

    /// Strongly connected component index of every declaration.
    fn components(&self) -> HashMap<&str, usize> {
        kosaraju_scc(&self.edges())
            .into_iter()
            .enumerate()
            .flat_map(|(index, scc)| scc.into_iter().map(move |name| (name, index)))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::openapi::schema::expr::{DeclarationKind, SchemaExpr};

    fn alias(name: &str, refs: &[&str]) -> Declaration {
        let expr = match refs {
            [] => SchemaExpr::String(vec![]),
            [single] => SchemaExpr::Ref((*single).to_string()),
            many => SchemaExpr::Union(many.iter().map(|r| SchemaExpr::Ref((*r).to_string())).collect()),
        };
        Declaration::new(name, DeclarationKind::Alias(expr), None)
    }

    fn graph(declarations: Vec<Declaration>) -> DeclarationGraph {
        let mut graph = DeclarationGraph::default();
        for declaration in declarations {
            graph.reserve(&declaration.name);
            graph.define(declaration);
        }
        graph
    }

    fn names(order: &[&Declaration]) -> Vec<String> {
        order.iter().map(|d| d.name.clone()).collect()
    }

    #[test]
    fn test_closure_skips_unreachable() {
        let g = graph(vec![alias("Foo", &["Baz"]), alias("Bar", &[]), alias("Baz", &[])]);
        let closure = g.closure(["Foo"]);
        assert!(closure.contains("Foo"));
        assert!(closure.contains("Baz"));
        assert!(!closure.contains("Bar"));
    }

    #[test]
    fn test_dependencies_first_then_registration_order() {
        let g = graph(vec![
            alias("A", &["C"]),
            alias("B", &[]),
            alias("C", &[]),
            alias("D", &["A"]),
        ]);
        let all: BTreeSet<String> = ["A", "B", "C", "D"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(names(&g.emission_order(&all)), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn test_cycles_fall_back_to_registration_order() {
        let g = graph(vec![alias("A", &["B"]), alias("B", &["A"]), alias("C", &["A"])]);
        let all: BTreeSet<String> = ["A", "B", "C"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(names(&g.emission_order(&all)), vec!["A", "B", "C"]);
        assert_eq!(g.cycles().len(), 1);
    }

    #[test]
    fn test_root_outside_cycle_waits_for_the_cycle() {
        let g = graph(vec![
            alias("Catalog", &["A"]),
            alias("A", &["B"]),
            alias("B", &["A"]),
        ]);
        let all: BTreeSet<String> = ["Catalog", "A", "B"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(names(&g.emission_order(&all)), vec!["A", "B", "Catalog"]);
    }

    #[test]
    fn test_cycle_waits_for_its_outside_dependencies() {
        let g = graph(vec![
            alias("A", &["B", "Leaf"]),
            alias("B", &["A"]),
            alias("Leaf", &[]),
        ]);
        let all: BTreeSet<String> = ["A", "B", "Leaf"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(names(&g.emission_order(&all)), vec!["Leaf", "A", "B"]);
    }

    #[test]
    fn test_self_reference_is_not_blocking() {
        let g = graph(vec![alias("Tree", &["Tree", "Leaf"]), alias("Leaf", &[])]);
        let all: BTreeSet<String> = ["Tree", "Leaf"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(names(&g.emission_order(&all)), vec!["Leaf", "Tree"]);
    }

    #[test]
    fn test_reservation_keeps_position() {
        let mut g = DeclarationGraph::default();
        assert!(g.reserve("Outer"));
        assert!(!g.reserve("Outer"));
        g.reserve("Inner");
        g.define(alias("Inner", &[]));
        assert!(g.get("Outer").is_none());
        g.define(alias("Outer", &["Inner"]));
        let order: Vec<_> = g.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, vec!["Outer", "Inner"]);
    }
}
