use std::collections::BTreeMap;

use tracing::debug;

use crate::graph::{is_uuid, Edge, Graph, Node};

/// How a child graph's node ids are carried into a parent.
///
/// Chosen once from the child's full id set, never per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Every id is an opaque UUID: copy nodes and edges as they are.
    Verbatim,
    /// At least one id is human-readable: rename every id to `prefix:id`.
    Prefixed,
}

impl MergeStrategy {
    pub fn for_graph(graph: &Graph) -> Self {
        if graph.nodes.keys().all(|id| is_uuid(id)) {
            Self::Verbatim
        } else {
            Self::Prefixed
        }
    }
}

fn prefixed(prefix: &str, id: &str) -> String {
    format!("{prefix}:{id}")
}

impl Graph {
    /// Fold `child` into this graph and return the child's entry and exit
    /// nodes as they are now named in `self`.
    ///
    /// Both are `None` when the child is empty; either may be `None` when the
    /// child has no unique entry or exit.
    pub fn extend(&mut self, child: &Graph, prefix: &str) -> (Option<Node>, Option<Node>) {
        let strategy = MergeStrategy::for_graph(child);
        debug!(
            prefix,
            ?strategy,
            nodes = child.nodes.len(),
            edges = child.edges.len(),
            "Merging subgraph"
        );

        let edges_before = self.edges.len();
        let bounds = match strategy {
            MergeStrategy::Verbatim => {
                self.nodes
                    .extend(child.nodes.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.edges.extend(child.edges.iter().cloned());
                (child.first_node().cloned(), child.last_node().cloned())
            }
            MergeStrategy::Prefixed => {
                let nodes: BTreeMap<String, Node> = child
                    .nodes
                    .iter()
                    .map(|(k, v)| {
                        let id = prefixed(prefix, k);
                        (id.clone(), Node::new(id, v.data.clone()))
                    })
                    .collect();
                let edges = child.edges.iter().map(|e| Edge {
                    source: prefixed(prefix, &e.source),
                    target: prefixed(prefix, &e.target),
                    data: e.data.clone(),
                    conditional: e.conditional,
                });
                self.nodes.extend(nodes);
                self.edges.extend(edges);

                let rename = |n: &Node| Node::new(prefixed(prefix, &n.id), n.data.clone());
                (child.first_node().map(rename), child.last_node().map(rename))
            }
        };

        debug_assert!(
            child.validate().is_err()
                || self.edges[edges_before..].iter().all(|e| {
                    self.nodes.contains_key(&e.source) && self.nodes.contains_key(&e.target)
                }),
            "graph merge produced a dangling edge"
        );
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(a: &str, b: &str) -> Graph {
        let mut graph = Graph::new();
        graph.add_node(json!({"name": "first"}), Some(a)).unwrap();
        graph.add_node(json!({"name": "second"}), Some(b)).unwrap();
        graph.add_edge(a, b, Some(json!("next")), true).unwrap();
        graph
    }

    #[test]
    fn test_prefixed_merge_renames_nodes_and_edges() {
        let mut parent = Graph::new();
        let (first, last) = parent.extend(&pair("n1", "n2"), "p");

        assert!(parent.nodes.contains_key("p:n1"));
        assert!(parent.nodes.contains_key("p:n2"));
        assert!(!parent.nodes.contains_key("n1"));
        assert!(!parent.nodes.contains_key("n2"));

        let edge = &parent.edges[0];
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("p:n1", "p:n2"));
        assert_eq!(edge.data, Some(json!("next")));
        assert!(edge.conditional);

        assert_eq!(first.unwrap().id, "p:n1");
        assert_eq!(last.unwrap().id, "p:n2");
        assert!(parent.validate().is_ok());
    }

    #[test]
    fn test_prefixed_node_keeps_data() {
        let mut parent = Graph::new();
        parent.extend(&pair("n1", "n2"), "p");
        assert_eq!(parent.nodes["p:n1"].id, "p:n1");
        assert_eq!(parent.nodes["p:n1"].data, json!({"name": "first"}));
    }

    #[test]
    fn test_same_template_merged_twice_does_not_collide() {
        let template = pair("n1", "n2");
        let mut parent = Graph::new();
        parent.extend(&template, "left");
        parent.extend(&template, "right");
        assert_eq!(parent.nodes.len(), 4);
        assert_eq!(parent.edges.len(), 2);
        assert!(parent.validate().is_ok());
    }

    #[test]
    fn test_uuid_ids_merge_verbatim() {
        let a = uuid::Uuid::new_v4().to_string();
        let b = uuid::Uuid::new_v4().to_string();
        let child = pair(&a, &b);

        let mut parent = Graph::new();
        let (first, last) = parent.extend(&child, "ignored");

        assert!(parent.nodes.contains_key(&a));
        assert!(parent.nodes.contains_key(&b));
        assert_eq!(parent.edges[0].source, a);
        assert_eq!(first.unwrap().id, a);
        assert_eq!(last.unwrap().id, b);
    }

    #[test]
    fn test_mixed_ids_are_all_prefixed() {
        let a = uuid::Uuid::new_v4().to_string();
        let child = pair(&a, "readable");
        assert_eq!(MergeStrategy::for_graph(&child), MergeStrategy::Prefixed);

        let mut parent = Graph::new();
        parent.extend(&child, "p");
        assert!(parent.nodes.contains_key(&format!("p:{a}")));
        assert!(!parent.nodes.contains_key(&a));
    }

    #[test]
    fn test_empty_child_leaves_parent_unchanged() {
        let mut parent = pair("a", "b");
        let before = parent.clone();
        let (first, last) = parent.extend(&Graph::new(), "p");
        assert!(first.is_none());
        assert!(last.is_none());
        assert_eq!(parent, before);
    }

    #[test]
    fn test_parent_can_wire_into_merged_bounds() {
        let mut parent = Graph::new();
        parent.add_node(json!({"name": "start"}), Some("start")).unwrap();
        let (first, last) = parent.extend(&pair("n1", "n2"), "sub");
        parent
            .add_edge("start", &first.unwrap().id, None, false)
            .unwrap();
        parent.add_node(json!({"name": "end"}), Some("end")).unwrap();
        parent.add_edge(&last.unwrap().id, "end", None, false).unwrap();

        assert_eq!(parent.first_node().unwrap().id, "start");
        assert_eq!(parent.last_node().unwrap().id, "end");
    }
}
