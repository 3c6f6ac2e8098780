use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use strand_core::error::{Result, StrandError};

/// A node in a drawable graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id within its graph.
    pub id: String,
    /// Opaque payload. A `name` string field is used as the display label.
    #[serde(default)]
    pub data: Value,
}

impl Node {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Display label: the payload's `name` field, falling back to the id.
    pub fn label(&self) -> &str {
        self.data
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.id)
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Opaque payload, rendered as the edge label when it is a string.
    #[serde(default)]
    pub data: Option<Value>,
    /// Whether the edge is only taken under some condition.
    #[serde(default)]
    pub conditional: bool,
}

impl Edge {
    /// Create an unconditional, unlabelled edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            data: None,
            conditional: false,
        }
    }

    /// Create a conditional edge.
    pub fn conditional(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            conditional: true,
            ..Self::new(source, target)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Whether `id` is a collision-free opaque identifier.
pub fn is_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Nodes keyed by id plus an ordered edge list.
///
/// Every edge endpoint must name a node in `nodes`. The `add_*` methods
/// enforce this; [`Graph::validate`] checks graphs built any other way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphRepr", into = "GraphRepr")]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    pub edges: Vec<Edge>,
}

/// On-disk shape: nodes as a list, since each node already carries its id.
#[derive(Serialize, Deserialize)]
struct GraphRepr {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl From<GraphRepr> for Graph {
    fn from(repr: GraphRepr) -> Self {
        Self {
            nodes: repr.nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            edges: repr.edges,
        }
    }
}

impl From<Graph> for GraphRepr {
    fn from(graph: Graph) -> Self {
        Self {
            nodes: graph.nodes.into_values().collect(),
            edges: graph.edges,
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A fresh opaque node id.
    pub fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Add a node, generating an opaque id when none is given.
    pub fn add_node(&mut self, data: Value, id: Option<&str>) -> Result<Node> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.next_id(),
        };
        if self.nodes.contains_key(&id) {
            return Err(StrandError::DuplicateNode(id));
        }
        let node = Node::new(id.clone(), data);
        self.nodes.insert(id, node.clone());
        Ok(node)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let removed = self.nodes.remove(id)?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Some(removed)
    }

    /// Add an edge between two existing nodes.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        data: Option<Value>,
        conditional: bool,
    ) -> Result<Edge> {
        for id in [source, target] {
            if !self.nodes.contains_key(id) {
                return Err(StrandError::NodeNotFound(id.to_string()));
            }
        }
        let edge = Edge {
            source: source.to_string(),
            target: target.to_string(),
            data,
            conditional,
        };
        self.edges.push(edge.clone());
        Ok(edge)
    }

    /// The single node with no incoming edges, if exactly one exists.
    pub fn first_node(&self) -> Option<&Node> {
        self.first_node_excluding(&[])
    }

    /// The single node with no outgoing edges, if exactly one exists.
    pub fn last_node(&self) -> Option<&Node> {
        self.last_node_excluding(&[])
    }

    fn first_node_excluding(&self, exclude: &[&str]) -> Option<&Node> {
        let targets: HashSet<&str> = self
            .edges
            .iter()
            .filter(|e| !exclude.contains(&e.source.as_str()))
            .map(|e| e.target.as_str())
            .collect();
        single(
            self.nodes
                .values()
                .filter(|n| !exclude.contains(&n.id.as_str()) && !targets.contains(n.id.as_str())),
        )
    }

    fn last_node_excluding(&self, exclude: &[&str]) -> Option<&Node> {
        let sources: HashSet<&str> = self
            .edges
            .iter()
            .filter(|e| !exclude.contains(&e.target.as_str()))
            .map(|e| e.source.as_str())
            .collect();
        single(
            self.nodes
                .values()
                .filter(|n| !exclude.contains(&n.id.as_str()) && !sources.contains(n.id.as_str())),
        )
    }

    /// Drop the entry node when it leads to exactly one successor and the
    /// graph still has a unique entry without it.
    pub fn trim_first_node(&mut self) {
        let Some(first) = self.first_node().map(|n| n.id.clone()) else {
            return;
        };
        let outgoing = self.edges.iter().filter(|e| e.source == first).count();
        if outgoing == 1 && self.first_node_excluding(&[first.as_str()]).is_some() {
            self.remove_node(&first);
        }
    }

    /// Drop the exit node when it is reached from exactly one predecessor
    /// and the graph still has a unique exit without it.
    pub fn trim_last_node(&mut self) {
        let Some(last) = self.last_node().map(|n| n.id.clone()) else {
            return;
        };
        let incoming = self.edges.iter().filter(|e| e.target == last).count();
        if incoming == 1 && self.last_node_excluding(&[last.as_str()]).is_some() {
            self.remove_node(&last);
        }
    }

    /// Check that every edge endpoint names a node.
    pub fn validate(&self) -> Result<()> {
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                return Err(StrandError::DanglingEdge {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a graph.
    pub fn from_json(json: &str) -> Result<Self> {
        let graph: Graph = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }
}

fn single<'a>(mut nodes: impl Iterator<Item = &'a Node>) -> Option<&'a Node> {
    let first = nodes.next()?;
    match nodes.next() {
        Some(_) => None,
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain(ids: &[&str]) -> Graph {
        let mut graph = Graph::new();
        for id in ids {
            graph.add_node(json!({ "name": id }), Some(id)).unwrap();
        }
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1], None, false).unwrap();
        }
        graph
    }

    #[test]
    fn test_first_and_last_of_chain() {
        let graph = chain(&["a", "b", "c"]);
        assert_eq!(graph.first_node().unwrap().id, "a");
        assert_eq!(graph.last_node().unwrap().id, "c");
    }

    #[test]
    fn test_ambiguous_bounds_are_absent() {
        let mut graph = chain(&["a", "b"]);
        graph.add_node(json!(null), Some("loose")).unwrap();
        assert!(graph.first_node().is_none());
        assert!(graph.last_node().is_none());
    }

    #[test]
    fn test_empty_graph_has_no_bounds() {
        let graph = Graph::new();
        assert!(graph.first_node().is_none());
        assert!(graph.last_node().is_none());
    }

    #[test]
    fn test_add_node_generates_uuid() {
        let mut graph = Graph::new();
        let node = graph.add_node(json!({"name": "step"}), None).unwrap();
        assert!(is_uuid(&node.id));
        assert_eq!(node.label(), "step");
    }

    #[test]
    fn test_add_node_rejects_duplicate() {
        let mut graph = chain(&["a"]);
        let err = graph.add_node(json!(null), Some("a")).unwrap_err();
        assert!(matches!(err, StrandError::DuplicateNode(id) if id == "a"));
    }

    #[test]
    fn test_add_edge_requires_endpoints() {
        let mut graph = chain(&["a"]);
        let err = graph.add_edge("a", "missing", None, false).unwrap_err();
        assert!(matches!(err, StrandError::NodeNotFound(id) if id == "missing"));
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let mut graph = chain(&["a", "b", "c"]);
        graph.remove_node("b");
        assert!(graph.edges.is_empty());
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn test_trim_schema_nodes() {
        let mut graph = chain(&["input", "step", "output"]);
        graph.trim_first_node();
        graph.trim_last_node();
        assert_eq!(graph.nodes.keys().collect::<Vec<_>>(), vec!["step"]);
    }

    #[test]
    fn test_trim_keeps_branching_entry() {
        let mut graph = chain(&["input", "a"]);
        graph.add_node(json!(null), Some("b")).unwrap();
        graph.add_edge("input", "b", None, false).unwrap();
        graph.trim_first_node();
        assert!(graph.nodes.contains_key("input"));
    }

    #[test]
    fn test_validate_reports_dangling_edge() {
        let mut graph = chain(&["a"]);
        graph.edges.push(Edge::new("a", "ghost"));
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, StrandError::DanglingEdge { to, .. } if to == "ghost"));
    }

    #[test]
    fn test_json_shape_lists_nodes() {
        let graph = chain(&["a", "b"]);
        let value: Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();
        assert_eq!(value["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(value["edges"][0]["source"], "a");
        assert_eq!(Graph::from_json(&graph.to_json().unwrap()).unwrap(), graph);
    }

    #[test]
    fn test_from_json_rejects_dangling_edge() {
        let json = r#"{"nodes": [{"id": "a"}], "edges": [{"source": "a", "target": "b"}]}"#;
        assert!(Graph::from_json(json).is_err());
    }

    #[test]
    fn test_is_uuid() {
        assert!(is_uuid("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!is_uuid("agent"));
    }
}
