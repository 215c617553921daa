//! Per-scanner dependency graph.
//!
//! Nodes are keyed by [`NodeId`] (purl, else cpe, else `name@version`). Two
//! distinct components that reduce to the same id share one node and the
//! collision is reported in [`GraphMetadata::collisions`]. Edges whose
//! endpoints do not resolve to a node are dropped and counted.

use crate::model::{Component, IdSource, NodeId, NormalizedSbom, ScannerId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Edge type used when the schema does not name one.
pub const DEFAULT_EDGE_TYPE: &str = "depends-on";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProperties {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpe: Option<String>,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub licenses: Vec<String>,
    pub id_source: IdSource,
    /// Distance from the nearest root (1 = root); `None` for pure cycles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub properties: NodeProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

/// Distinct components that collapsed onto one node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCollision {
    pub id: String,
    /// `name@version` of every component sharing the id
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub scanner: ScannerId,
    pub sbom_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Set when at least one id collision occurred
    pub has_collisions: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<IdCollision>,
    /// Declared relationships that could not be resolved, plus self-loops
    pub dropped_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

impl Graph {
    /// Whether every edge endpoint is a node id.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges
            .iter()
            .all(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Builds a [`Graph`] from one scanner's normalized output.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn build(&self, sbom: &NormalizedSbom) -> Graph {
        let mut nodes: IndexMap<String, GraphNode> = IndexMap::new();
        let mut members: IndexMap<String, Vec<String>> = IndexMap::new();
        // scanner-local reference -> node id
        let mut refs: HashMap<&str, String> = HashMap::new();

        for component in &sbom.components {
            let node_id = NodeId::for_component(component);
            let id = node_id.value().to_string();
            members
                .entry(id.clone())
                .or_default()
                .push(component.display_name());

            if let Some(bom_ref) = &component.bom_ref {
                refs.insert(bom_ref.as_str(), id.clone());
            }
            if let Some(purl) = &component.purl {
                refs.entry(purl.as_str()).or_insert_with(|| id.clone());
            }

            match nodes.get_mut(&id) {
                Some(existing) => absorb(&mut existing.properties, component),
                None => {
                    nodes.insert(id.clone(), new_node(id, component, node_id.source()));
                }
            }
        }
        for id in nodes.keys() {
            refs.entry(id.as_str()).or_insert_with(|| id.clone());
        }

        let collisions: Vec<IdCollision> = members
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|(id, components)| {
                tracing::warn!(
                    scanner = %sbom.scanner,
                    id = %id,
                    count = components.len(),
                    "Distinct components share a graph node id"
                );
                IdCollision { id, components }
            })
            .collect();

        let mut seen: HashSet<GraphEdge> = HashSet::new();
        let mut edges = Vec::new();
        let mut dropped = 0usize;
        for rel in &sbom.relationships {
            let (Some(source), Some(target)) = (
                refs.get(rel.source.as_str()),
                refs.get(rel.target.as_str()),
            ) else {
                dropped += 1;
                continue;
            };
            if source == target {
                dropped += 1;
                continue;
            }
            let edge = GraphEdge {
                source: source.clone(),
                target: target.clone(),
                edge_type: rel
                    .kind
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EDGE_TYPE.to_string()),
            };
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
        if dropped > 0 {
            tracing::warn!(scanner = %sbom.scanner, dropped, "Dropped unresolvable graph edges");
        }

        let depths = calculate_depths(nodes.keys(), &edges);
        let nodes: Vec<GraphNode> = nodes
            .into_values()
            .map(|mut node| {
                node.properties.depth = depths.get(&node.id).copied();
                node
            })
            .collect();

        Graph {
            metadata: GraphMetadata {
                scanner: sbom.scanner.clone(),
                sbom_format: sbom.format.name().to_string(),
                spec_version: sbom.spec_version.clone(),
                total_nodes: nodes.len(),
                total_edges: edges.len(),
                has_collisions: !collisions.is_empty(),
                collisions,
                dropped_edges: dropped,
            },
            nodes,
            edges,
        }
    }
}

fn new_node(id: String, component: &Component, id_source: IdSource) -> GraphNode {
    GraphNode {
        label: component.name.clone(),
        properties: NodeProperties {
            name: component.name.clone(),
            version: component.version.clone(),
            purl: component.purl.clone(),
            cpe: component.cpe.clone(),
            component_type: component.component_type.clone(),
            description: component.description.clone(),
            licenses: component.licenses.clone(),
            id_source,
            depth: None,
        },
        id,
    }
}

fn absorb(properties: &mut NodeProperties, component: &Component) {
    if properties.purl.is_none() {
        properties.purl.clone_from(&component.purl);
    }
    if properties.cpe.is_none() {
        properties.cpe.clone_from(&component.cpe);
    }
    if properties.description.is_none() {
        properties.description.clone_from(&component.description);
    }
    for license in &component.licenses {
        if !properties.licenses.contains(license) {
            properties.licenses.push(license.clone());
        }
    }
}

/// BFS depth from roots (nodes without incoming edges). Nodes only reachable
/// through cycles get no depth.
fn calculate_depths<'a>(
    ids: impl Iterator<Item = &'a String>,
    edges: &'a [GraphEdge],
) -> HashMap<String, u32> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_parent: HashSet<&str> = HashSet::new();
    for edge in edges {
        children
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        has_parent.insert(edge.target.as_str());
    }

    let mut depths: HashMap<&str, u32> = HashMap::new();
    let mut queue: VecDeque<(&str, u32)> = ids
        .map(String::as_str)
        .filter(|id| !has_parent.contains(id))
        .map(|id| (id, 1))
        .collect();

    while let Some((id, depth)) = queue.pop_front() {
        if depths.contains_key(id) {
            continue;
        }
        depths.insert(id, depth);
        if let Some(kids) = children.get(id) {
            for kid in kids {
                if !depths.contains_key(kid) {
                    queue.push_back((kid, depth + 1));
                }
            }
        }
    }
    depths
        .into_iter()
        .map(|(id, depth)| (id.to_string(), depth))
        .collect()
}
