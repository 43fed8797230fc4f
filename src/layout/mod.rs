//! Hybrid graph layout: blends data-anchored positions with a force simulation.

mod forces;
mod quadtree;

use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};

use crate::anchor::ResolvedAnchors;
use crate::api::{GraphSnapshot, NodeId};
use forces::Link;
use quadtree::QuadNode;

/// At or below this mix every node is fixed to its anchor.
pub const ANCHORED_EPSILON: f32 = 0.01;
pub const BASE_NODE_RADIUS: f32 = 5.0;

const LINK_DISTANCE: f32 = 40.0;
const BARNES_HUT_THETA: f32 = 0.9;
const ALPHA_MIN: f32 = 0.001;
const VELOCITY_DECAY: f32 = 0.4;
const DRAG_ALPHA_TARGET: f32 = 0.3;
const LABEL_GAP: f32 = 4.0;

fn alpha_decay() -> f32 {
    1.0 - ALPHA_MIN.powf(1.0 / 300.0)
}

pub fn node_radius(size: usize) -> f32 {
    BASE_NODE_RADIUS + (size as f32).sqrt()
}

pub fn link_strength(mix: f32) -> f32 {
    0.2 + 0.6 * mix.clamp(0.0, 1.0)
}

pub fn charge_strength(mix: f32) -> f32 {
    -50.0 - 100.0 * mix.clamp(0.0, 1.0)
}

/// Quadratic falloff toward a floor of 0.05 at full mix.
pub fn anchor_strength(mix: f32) -> f32 {
    let remaining = 1.0 - mix.clamp(0.0, 1.0);
    remaining * remaining * 0.8 + 0.05
}

pub fn center_strength(mix: f32) -> f32 {
    0.15 * mix.clamp(0.0, 1.0)
}

pub fn is_anchored(mix: f32) -> bool {
    mix <= ANCHORED_EPSILON
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeSegment {
    pub edge: usize,
    pub from: Vec2,
    pub to: Vec2,
}

/// Owns every per-node simulation field; indices follow `GraphSnapshot::nodes`.
#[derive(Debug)]
pub struct HybridLayoutEngine {
    ids: Vec<NodeId>,
    index_by_id: HashMap<NodeId, usize>,
    radii: Vec<f32>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    fixed: Vec<Option<Vec2>>,
    anchors: Vec<Vec2>,
    links: Vec<Link>,
    edge_ends: Vec<(usize, usize)>,
    mix: f32,
    alpha: f32,
    alpha_target: f32,
    running: bool,
    dragging: Option<usize>,
}

impl HybridLayoutEngine {
    pub fn new(mix: f32) -> Self {
        Self {
            ids: Vec::new(),
            index_by_id: HashMap::new(),
            radii: Vec::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
            fixed: Vec::new(),
            anchors: Vec::new(),
            links: Vec::new(),
            edge_ends: Vec::new(),
            mix: mix.clamp(0.0, 1.0),
            alpha: 0.0,
            alpha_target: 0.0,
            running: false,
            dragging: None,
        }
    }

    /// Replaces the whole simulation; nothing from the previous snapshot survives.
    pub fn load_snapshot(&mut self, snapshot: &GraphSnapshot, anchors: ResolvedAnchors) {
        let count = snapshot.nodes().len();
        self.ids = snapshot.nodes().iter().map(|node| node.id).collect();
        self.index_by_id = self
            .ids
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();
        self.radii = snapshot
            .nodes()
            .iter()
            .map(|node| node_radius(node.size()))
            .collect();
        self.anchors = padded_anchors(anchors, count);
        self.positions = self.anchors.clone();
        self.velocities = vec![Vec2::ZERO; count];
        self.fixed = vec![None; count];
        self.dragging = None;
        self.alpha_target = 0.0;

        let mut degree = vec![0usize; count];
        self.edge_ends.clear();
        for edge in snapshot.edges() {
            let (Some(a), Some(b)) = (snapshot.node_index(edge.a), snapshot.node_index(edge.b))
            else {
                continue;
            };
            degree[a] += 1;
            degree[b] += 1;
            self.edge_ends.push((a, b));
        }
        self.links = self
            .edge_ends
            .iter()
            .map(|&(source, target)| Link {
                source,
                target,
                distance: LINK_DISTANCE + self.radii[source] + self.radii[target],
                bias: degree[source] as f32 / (degree[source] + degree[target]) as f32,
            })
            .collect();

        log::debug!(
            "layout: loaded {count} nodes, {} links at mix {:.2}",
            self.links.len(),
            self.mix
        );
        self.apply_pins();
        self.restart();
    }

    pub fn set_anchors(&mut self, anchors: ResolvedAnchors) {
        self.anchors = padded_anchors(anchors, self.ids.len());
        self.apply_pins();
        self.restart();
    }

    pub fn set_mix(&mut self, mix: f32) {
        let mix = mix.clamp(0.0, 1.0);
        if (mix - self.mix).abs() <= f32::EPSILON {
            return;
        }
        self.mix = mix;
        self.apply_pins();
        self.restart();
    }

    pub fn clear(&mut self) {
        self.stop();
        *self = Self::new(self.mix);
    }

    fn restart(&mut self) {
        self.alpha = 1.0;
        self.running = !self.ids.is_empty();
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    fn apply_pins(&mut self) {
        let anchored = is_anchored(self.mix);
        for (index, fixed) in self.fixed.iter_mut().enumerate() {
            if Some(index) == self.dragging {
                continue;
            }
            *fixed = anchored.then(|| self.anchors[index]);
        }
    }

    /// Advances one step; returns false once the simulation has cooled or was stopped.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.alpha += (self.alpha_target - self.alpha) * alpha_decay();

        if !is_anchored(self.mix) {
            let alpha = self.alpha;
            forces::apply_links(
                &self.links,
                &self.positions,
                &mut self.velocities,
                link_strength(self.mix),
                alpha,
            );
            if let Some(tree) = QuadNode::build(&self.positions) {
                forces::apply_charge(
                    &tree,
                    &self.positions,
                    &mut self.velocities,
                    charge_strength(self.mix),
                    alpha,
                    BARNES_HUT_THETA,
                );
            }
            forces::apply_anchor_pull(
                &self.positions,
                &self.anchors,
                &mut self.velocities,
                anchor_strength(self.mix),
                alpha,
            );
            forces::apply_centering(&mut self.positions, center_strength(self.mix));
        }

        for index in 0..self.positions.len() {
            match self.fixed[index] {
                Some(position) => {
                    self.positions[index] = position;
                    self.velocities[index] = Vec2::ZERO;
                }
                None => {
                    self.velocities[index] *= 1.0 - VELOCITY_DECAY;
                    self.positions[index] += self.velocities[index];
                }
            }
        }

        if self.alpha < ALPHA_MIN {
            self.running = false;
        }
        self.running
    }

    pub fn begin_drag(&mut self, id: NodeId, position: Vec2) -> bool {
        let Some(&index) = self.index_by_id.get(&id) else {
            return false;
        };
        self.dragging = Some(index);
        self.fixed[index] = Some(position);
        self.alpha_target = DRAG_ALPHA_TARGET;
        self.running = true;
        true
    }

    pub fn drag_to(&mut self, position: Vec2) {
        if let Some(index) = self.dragging {
            self.fixed[index] = Some(position);
            self.running = true;
        }
    }

    pub fn end_drag(&mut self) {
        let Some(index) = self.dragging.take() else {
            return;
        };
        self.fixed[index] = is_anchored(self.mix).then(|| self.anchors[index]);
        self.alpha_target = 0.0;
    }

    pub fn dragged(&self) -> Option<NodeId> {
        self.dragging.map(|index| self.ids[index])
    }

    pub fn position(&self, index: usize) -> Option<Vec2> {
        self.positions.get(index).copied()
    }

    pub fn position_of(&self, id: NodeId) -> Option<Vec2> {
        self.index_by_id
            .get(&id)
            .and_then(|&index| self.position(index))
    }

    pub fn radius(&self, index: usize) -> f32 {
        self.radii.get(index).copied().unwrap_or(BASE_NODE_RADIUS)
    }

    /// Where a node's label is drawn: centered just above its circle.
    pub fn label_position(&self, index: usize) -> Option<Vec2> {
        self.position(index)
            .map(|position| position - vec2(0.0, self.radius(index) + LABEL_GAP))
    }

    pub fn edge_segments(&self) -> impl Iterator<Item = EdgeSegment> + '_ {
        self.edge_ends
            .iter()
            .enumerate()
            .map(|(edge, &(a, b))| EdgeSegment {
                edge,
                from: self.positions[a],
                to: self.positions[b],
            })
    }

    /// Topmost node under `position`, later nodes drawn over earlier ones.
    pub fn node_at(&self, position: Vec2, slop: f32) -> Option<NodeId> {
        self.positions
            .iter()
            .enumerate()
            .rev()
            .find(|&(index, center)| {
                let reach = self.radii[index] + slop;
                (*center - position).length_sq() <= reach * reach
            })
            .map(|(index, _)| self.ids[index])
    }

    /// Index into `GraphSnapshot::edges` of the closest segment within `tolerance`.
    pub fn edge_at(&self, position: Vec2, tolerance: f32) -> Option<usize> {
        self.edge_segments()
            .map(|segment| {
                let distance = distance_to_segment(position, segment.from, segment.to);
                (segment.edge, distance)
            })
            .filter(|&(_, distance)| distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(edge, _)| edge)
    }
}

fn padded_anchors(anchors: ResolvedAnchors, count: usize) -> Vec<Vec2> {
    let mut positions = anchors.positions;
    positions.resize(count, Vec2::ZERO);
    positions
}

fn distance_to_segment(point: Vec2, from: Vec2, to: Vec2) -> f32 {
    let span = to - from;
    let length_sq = span.length_sq();
    if length_sq <= f32::EPSILON {
        return (point - from).length();
    }
    let t = ((point - from).dot(span) / length_sq).clamp(0.0, 1.0);
    (point - (from + span * t)).length()
}
