use eframe::egui::Vec2;

use super::quadtree::QuadNode;
use crate::util::jiggle;

const MIN_DISTANCE_SQ: f32 = 1.0;
const COINCIDENT_SQ: f32 = 1e-12;

#[derive(Clone, Copy, Debug)]
pub(super) struct Link {
    pub(super) source: usize,
    pub(super) target: usize,
    pub(super) distance: f32,
    /// Share of the correction applied to the target.
    pub(super) bias: f32,
}

/// Spring toward `distance`, looking one step ahead at the current velocities.
pub(super) fn apply_links(
    links: &[Link],
    positions: &[Vec2],
    velocities: &mut [Vec2],
    strength: f32,
    alpha: f32,
) {
    for link in links {
        let (source, target) = (link.source, link.target);
        let mut delta = (positions[target] + velocities[target])
            - (positions[source] + velocities[source]);
        if delta.length_sq() < COINCIDENT_SQ {
            delta = jiggle(source as u64, target as u64) * 1e-3;
        }

        let length = delta.length();
        let correction = delta * ((length - link.distance) / length * alpha * strength);
        velocities[target] -= correction * link.bias;
        velocities[source] += correction * (1.0 - link.bias);
    }
}

/// Barnes-Hut many-body term; a negative `strength` repels.
pub(super) fn apply_charge(
    tree: &QuadNode,
    positions: &[Vec2],
    velocities: &mut [Vec2],
    strength: f32,
    alpha: f32,
    theta: f32,
) {
    let theta_sq = theta * theta;
    for (index, velocity) in velocities.iter_mut().enumerate() {
        accumulate_charge(tree, index, positions, strength * alpha, theta_sq, velocity);
    }
}

fn accumulate_charge(
    node: &QuadNode,
    index: usize,
    positions: &[Vec2],
    weight: f32,
    theta_sq: f32,
    velocity: &mut Vec2,
) {
    if node.mass <= 0.0 {
        return;
    }

    let point = positions[index];
    if node.is_leaf() {
        for &other in &node.indices {
            if other != index {
                *velocity += pair_charge(point, positions[other], index, other, weight);
            }
        }
        return;
    }

    let offset = node.center_of_mass - point;
    let distance_sq = offset.length_sq();
    let width = node.bounds.side_length();
    if !node.bounds.contains(point) && width * width / theta_sq < distance_sq {
        *velocity += offset * (weight * node.mass / soften(distance_sq));
        return;
    }

    for child in node.children.iter().flatten() {
        accumulate_charge(child, index, positions, weight, theta_sq, velocity);
    }
}

fn pair_charge(point: Vec2, other: Vec2, index: usize, other_index: usize, weight: f32) -> Vec2 {
    let mut offset = other - point;
    if offset.length_sq() < COINCIDENT_SQ {
        // Opposite directions for the two members of the pair.
        let direction = jiggle(index.min(other_index) as u64, index.max(other_index) as u64);
        let sign = if index < other_index { 1.0 } else { -1.0 };
        offset = direction * (sign * 1e-3);
    }
    offset * (weight / soften(offset.length_sq()))
}

fn soften(distance_sq: f32) -> f32 {
    if distance_sq < MIN_DISTANCE_SQ {
        (MIN_DISTANCE_SQ * distance_sq).sqrt().max(1e-6)
    } else {
        distance_sq
    }
}

/// Per-axis pull toward each node's anchor.
pub(super) fn apply_anchor_pull(
    positions: &[Vec2],
    anchors: &[Vec2],
    velocities: &mut [Vec2],
    strength: f32,
    alpha: f32,
) {
    for ((position, anchor), velocity) in positions.iter().zip(anchors).zip(velocities) {
        *velocity += (*anchor - *position) * (strength * alpha);
    }
}

/// Shifts every position so the centroid moves toward the origin.
pub(super) fn apply_centering(positions: &mut [Vec2], strength: f32) {
    if positions.is_empty() || strength <= 0.0 {
        return;
    }
    let centroid = positions
        .iter()
        .fold(Vec2::ZERO, |sum, position| sum + *position)
        / positions.len() as f32;
    let shift = centroid * strength;
    for position in positions {
        *position -= shift;
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;

    #[test]
    fn stretched_link_pulls_endpoints_together() {
        let positions = [vec2(0.0, 0.0), vec2(100.0, 0.0)];
        let mut velocities = [Vec2::ZERO; 2];
        let links = [Link {
            source: 0,
            target: 1,
            distance: 50.0,
            bias: 0.5,
        }];

        apply_links(&links, &positions, &mut velocities, 0.5, 1.0);
        assert!(velocities[0].x > 0.0);
        assert!(velocities[1].x < 0.0);
        assert!((velocities[0].x + velocities[1].x).abs() < 1e-4);
    }

    #[test]
    fn negative_charge_pushes_nodes_apart() {
        let positions = vec![vec2(-5.0, 0.0), vec2(5.0, 0.0)];
        let mut velocities = vec![Vec2::ZERO; 2];
        let Some(tree) = QuadNode::build(&positions) else {
            panic!("finite points build a tree");
        };

        apply_charge(&tree, &positions, &mut velocities, -100.0, 1.0, 0.9);
        assert!(velocities[0].x < 0.0);
        assert!(velocities[1].x > 0.0);
    }

    #[test]
    fn coincident_nodes_separate_in_opposite_directions() {
        let positions = vec![vec2(1.0, 1.0), vec2(1.0, 1.0)];
        let mut velocities = vec![Vec2::ZERO; 2];
        let Some(tree) = QuadNode::build(&positions) else {
            panic!("finite points build a tree");
        };

        apply_charge(&tree, &positions, &mut velocities, -50.0, 1.0, 0.9);
        assert!(velocities[0].length() > 0.0);
        assert!(velocities[0].dot(velocities[1]) < 0.0);
    }

    #[test]
    fn far_clusters_are_approximated_close_to_exact_sum() {
        let mut positions = vec![vec2(0.0, 0.0)];
        for i in 0..40 {
            positions.push(vec2(500.0 + (i % 8) as f32, (i / 8) as f32));
        }
        let Some(tree) = QuadNode::build(&positions) else {
            panic!("finite points build a tree");
        };

        let mut approximate = vec![Vec2::ZERO; positions.len()];
        apply_charge(&tree, &positions, &mut approximate, -30.0, 1.0, 0.9);
        let mut exact = vec![Vec2::ZERO; positions.len()];
        apply_charge(&tree, &positions, &mut exact, -30.0, 1.0, 0.0001);

        let error = (approximate[0] - exact[0]).length() / exact[0].length();
        assert!(error < 0.05, "relative error {error}");
    }

    #[test]
    fn anchor_pull_is_proportional_to_offset() {
        let positions = [vec2(0.0, 0.0), vec2(10.0, 10.0)];
        let anchors = [vec2(10.0, 0.0), vec2(10.0, 10.0)];
        let mut velocities = [Vec2::ZERO; 2];

        apply_anchor_pull(&positions, &anchors, &mut velocities, 0.5, 0.5);
        assert_eq!(velocities[0], vec2(2.5, 0.0));
        assert_eq!(velocities[1], Vec2::ZERO);
    }

    #[test]
    fn centering_moves_the_centroid_toward_origin() {
        let mut positions = [vec2(10.0, 0.0), vec2(30.0, 20.0)];
        apply_centering(&mut positions, 0.5);
        let centroid = (positions[0] + positions[1]) / 2.0;
        assert!((centroid - vec2(10.0, 5.0)).length() < 1e-4);
    }
}
