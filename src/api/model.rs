use std::collections::{BTreeSet, HashMap, HashSet};

use eframe::egui::Pos2;

pub type PointId = u32;
pub type NodeId = u32;

#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint {
    pub id: PointId,
    pub projected: Pos2,
    pub categories: BTreeSet<String>,
    pub label: String,
    pub concepts: Vec<String>,
}

impl DataPoint {
    pub fn in_any<S: AsRef<str>>(&self, categories: &[S]) -> bool {
        categories
            .iter()
            .any(|category| self.categories.contains(category.as_ref()))
    }
}

/// Points of one layer/dataset/threshold combination, indexed by id.
#[derive(Clone, Debug, Default)]
pub struct PointTable {
    points: Vec<DataPoint>,
    index_by_id: HashMap<PointId, usize>,
}

impl PointTable {
    pub fn new(points: Vec<DataPoint>) -> Self {
        let mut unique = Vec::with_capacity(points.len());
        let mut index_by_id = HashMap::with_capacity(points.len());
        for point in points {
            if index_by_id.contains_key(&point.id) {
                continue;
            }
            index_by_id.insert(point.id, unique.len());
            unique.push(point);
        }

        Self {
            points: unique,
            index_by_id,
        }
    }

    pub fn get(&self, id: PointId) -> Option<&DataPoint> {
        self.index_by_id
            .get(&id)
            .and_then(|&index| self.points.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphNode {
    pub id: NodeId,
    pub members: Vec<PointId>,
}

impl GraphNode {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Undirected; `shared` is never empty in a live snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphEdge {
    pub a: NodeId,
    pub b: NodeId,
    pub shared: BTreeSet<PointId>,
}

impl GraphEdge {
    pub fn touches(&self, node: NodeId) -> bool {
        self.a == node || self.b == node
    }

    pub fn same_endpoints(&self, other: &GraphEdge) -> bool {
        (self.a == other.a && self.b == other.b) || (self.a == other.b && self.b == other.a)
    }
}

#[derive(Clone, Debug, Default)]
pub struct GraphSnapshot {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    resolved_radius: f32,
    index_by_id: HashMap<NodeId, usize>,
}

impl GraphSnapshot {
    /// Builds a snapshot whose edges satisfy the shared-subset invariant.
    pub fn normalized(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>, resolved_radius: f32) -> Self {
        let mut index_by_id = HashMap::with_capacity(nodes.len());
        let mut unique_nodes = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            if index_by_id.contains_key(&node.id) {
                continue;
            }
            let mut seen = HashSet::with_capacity(node.members.len());
            node.members.retain(|member| seen.insert(*member));
            index_by_id.insert(node.id, unique_nodes.len());
            unique_nodes.push(node);
        }

        let mut kept_edges: Vec<GraphEdge> = Vec::with_capacity(edges.len());
        for mut edge in edges {
            if edge.a == edge.b {
                continue;
            }
            let (Some(&a), Some(&b)) = (index_by_id.get(&edge.a), index_by_id.get(&edge.b))
            else {
                continue;
            };

            let members_a = unique_nodes[a].members.iter().collect::<HashSet<_>>();
            let members_b = unique_nodes[b].members.iter().collect::<HashSet<_>>();
            edge.shared
                .retain(|id| members_a.contains(id) && members_b.contains(id));
            if edge.shared.is_empty() {
                continue;
            }

            if let Some(existing) = kept_edges
                .iter_mut()
                .find(|existing| existing.same_endpoints(&edge))
            {
                existing.shared.extend(edge.shared);
                continue;
            }
            kept_edges.push(edge);
        }

        Self {
            nodes: unique_nodes,
            edges: kept_edges,
            resolved_radius,
            index_by_id,
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn resolved_radius(&self) -> f32 {
        self.resolved_radius
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.node_index(id).and_then(|index| self.nodes.get(index))
    }

    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
    pub id: PointId,
    pub similarity: f32,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Overlap {
    pub overlap_count: usize,
    pub overlap_percentage: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankedOverlap {
    pub category: String,
    pub count: usize,
    pub overlap: Overlap,
}

#[derive(Clone, Debug)]
pub struct LayerData {
    pub points: PointTable,
    pub category_distribution: Vec<CategoryCount>,
    pub total_concepts: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConceptMatches {
    pub concept: String,
    pub matches: Vec<PointId>,
    pub category_distribution: Vec<CategoryCount>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConceptDataset {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, members: &[PointId]) -> GraphNode {
        GraphNode {
            id,
            members: members.to_vec(),
        }
    }

    fn edge(a: NodeId, b: NodeId, shared: &[PointId]) -> GraphEdge {
        GraphEdge {
            a,
            b,
            shared: shared.iter().copied().collect(),
        }
    }

    #[test]
    fn normalization_trims_shared_points_to_both_endpoints() {
        let snapshot = GraphSnapshot::normalized(
            vec![node(1, &[1, 2, 3]), node(2, &[3, 4])],
            vec![edge(1, 2, &[3, 4, 9])],
            0.2,
        );

        assert_eq!(snapshot.edges().len(), 1);
        assert_eq!(
            snapshot.edges()[0].shared.iter().copied().collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[test]
    fn normalization_drops_empty_self_and_dangling_edges() {
        let snapshot = GraphSnapshot::normalized(
            vec![node(1, &[1, 2]), node(2, &[5, 6])],
            vec![edge(1, 2, &[1]), edge(1, 1, &[1]), edge(1, 7, &[2])],
            0.2,
        );

        assert!(snapshot.edges().is_empty());
    }

    #[test]
    fn duplicate_edges_merge_and_members_dedupe() {
        let snapshot = GraphSnapshot::normalized(
            vec![node(1, &[1, 2, 2, 3]), node(2, &[2, 3])],
            vec![edge(1, 2, &[2]), edge(2, 1, &[3])],
            0.2,
        );

        assert_eq!(snapshot.node(1).map(GraphNode::size), Some(3));
        assert_eq!(snapshot.edges().len(), 1);
        assert_eq!(snapshot.edges()[0].shared.len(), 2);
    }

    #[test]
    fn point_table_keeps_first_duplicate() {
        let point = |id, label: &str| DataPoint {
            id,
            projected: Pos2::ZERO,
            categories: BTreeSet::new(),
            label: label.to_owned(),
            concepts: Vec::new(),
        };
        let table = PointTable::new(vec![point(1, "a"), point(1, "b"), point(2, "c")]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).map(|p| p.label.as_str()), Some("a"));
    }
}
