//! Depth-first topological ordering with selectable cycle handling.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use tracing::warn;

/// What to do when the sort reaches a node that is still being expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Abort with a [`CycleError`].
    #[default]
    Strict,
    /// Drop the back-edge and keep going. The node keeps the position of its
    /// first discovery.
    Lenient,
}

/// A back-edge found by a strict sort. `path` starts and ends with the same node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    pub path: Vec<T>,
}

impl<T: fmt::Display> fmt::Display for CycleError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.path.iter().map(|n| n.to_string()).collect();
        write!(f, "dependency cycle: {}", path.join(" -> "))
    }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for CycleError<T> {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Order `items` so that every item comes after all of its dependencies.
///
/// Items are visited in input order and dependencies in the order
/// `dependencies_of` yields them (depth-first post-order). Dependencies that
/// are not in `items` are still visited and appear in the output. Each
/// distinct item is emitted exactly once.
///
/// The walk keeps an explicit stack, so termination does not depend on the
/// graph being acyclic and long chains cannot overflow the call stack.
pub fn topological_order<T, F, I>(
    items: &[T],
    mut dependencies_of: F,
    policy: CyclePolicy,
) -> Result<Vec<T>, CycleError<T>>
where
    T: Clone + Eq + Hash + fmt::Debug,
    F: FnMut(&T) -> I,
    I: IntoIterator<Item = T>,
{
    let mut marks: HashMap<T, Mark> = HashMap::new();
    let mut output = Vec::new();

    for item in items {
        if marks.contains_key(item) {
            continue;
        }

        marks.insert(item.clone(), Mark::Visiting);
        let mut stack: Vec<(T, I::IntoIter)> =
            vec![(item.clone(), dependencies_of(item).into_iter())];

        loop {
            let next = match stack.last_mut() {
                Some((_, deps)) => deps.next(),
                None => break,
            };

            match next {
                Some(dep) => match marks.get(&dep) {
                    None => {
                        marks.insert(dep.clone(), Mark::Visiting);
                        let deps = dependencies_of(&dep).into_iter();
                        stack.push((dep, deps));
                    }
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        if policy == CyclePolicy::Strict {
                            let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                            let mut path: Vec<T> =
                                stack[start..].iter().map(|(n, _)| n.clone()).collect();
                            path.push(dep);
                            return Err(CycleError { path });
                        }
                        if let Some((node, _)) = stack.last() {
                            warn!("Ignoring cycle edge {:?} -> {:?}", node, dep);
                        }
                    }
                },
                None => {
                    if let Some((node, _)) = stack.pop() {
                        marks.insert(node.clone(), Mark::Done);
                        output.push(node);
                    }
                }
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps_from<'a>(edges: &'a [(&'a str, &'a str)]) -> impl FnMut(&&'a str) -> Vec<&'a str> {
        move |node: &&'a str| {
            edges
                .iter()
                .filter(|(from, _)| from == node)
                .map(|(_, to)| *to)
                .collect()
        }
    }

    fn position(order: &[&str], node: &str) -> usize {
        order.iter().position(|n| *n == node).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let edges = [("OrderLines", "Orders"), ("Orders", "Customers"), ("OrderLines", "Products")];
        let items = ["OrderLines", "Orders", "Customers", "Products"];

        let order = topological_order(&items, deps_from(&edges), CyclePolicy::Strict).unwrap();

        assert_eq!(order.len(), 4);
        for (from, to) in edges {
            assert!(position(&order, to) < position(&order, from), "{to} before {from}");
        }
    }

    #[test]
    fn test_post_order_follows_input_and_dependency_order() {
        let edges = [("C", "A"), ("C", "B")];
        let order = topological_order(&["C", "D"], deps_from(&edges), CyclePolicy::Strict).unwrap();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_each_item_appears_once() {
        let edges = [("B", "A"), ("C", "A"), ("D", "B"), ("D", "C")];
        let order =
            topological_order(&["D", "C", "B", "A", "D"], deps_from(&edges), CyclePolicy::Strict)
                .unwrap();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_dependencies_outside_items_are_included() {
        let edges = [("OrderLines", "Orders")];
        let order =
            topological_order(&["OrderLines"], deps_from(&edges), CyclePolicy::Strict).unwrap();
        assert_eq!(order, vec!["Orders", "OrderLines"]);
    }

    #[test]
    fn test_strict_rejects_two_node_cycle() {
        let edges = [("A", "B"), ("B", "A")];
        let err = topological_order(&["A", "B"], deps_from(&edges), CyclePolicy::Strict).unwrap_err();
        assert_eq!(err.path, vec!["A", "B", "A"]);
        assert_eq!(err.to_string(), "dependency cycle: A -> B -> A");
    }

    #[test]
    fn test_strict_reports_only_the_cycle() {
        let edges = [("Root", "A"), ("A", "B"), ("B", "C"), ("C", "A")];
        let err = topological_order(&["Root"], deps_from(&edges), CyclePolicy::Strict).unwrap_err();
        assert_eq!(err.path, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn test_lenient_terminates_without_duplicates() {
        let edges = [("A", "B"), ("B", "A")];
        let order = topological_order(&["A", "B"], deps_from(&edges), CyclePolicy::Lenient).unwrap();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_lenient_keeps_acyclic_part_ordered() {
        let edges = [("A", "B"), ("B", "A"), ("C", "A"), ("B", "D")];
        let order =
            topological_order(&["C", "A", "B", "D"], deps_from(&edges), CyclePolicy::Lenient)
                .unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "A") < position(&order, "C"));
        assert!(position(&order, "D") < position(&order, "B"));
    }

    #[test]
    fn test_self_dependency() {
        let edges = [("A", "A")];
        assert!(topological_order(&["A"], deps_from(&edges), CyclePolicy::Strict).is_err());
        let order = topological_order(&["A"], deps_from(&edges), CyclePolicy::Lenient).unwrap();
        assert_eq!(order, vec!["A"]);
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let nodes: Vec<u32> = (0..100_000).collect();
        let order = topological_order(
            &[99_999u32],
            |n: &u32| if *n == 0 { vec![] } else { vec![n - 1] },
            CyclePolicy::Strict,
        )
        .unwrap();
        assert_eq!(order, nodes);
    }

    #[test]
    fn test_empty_input() {
        let order: Vec<&str> =
            topological_order(&[], |_: &&str| Vec::new(), CyclePolicy::Strict).unwrap();
        assert!(order.is_empty());
    }
}
