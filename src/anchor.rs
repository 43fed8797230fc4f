use std::f32::consts::{FRAC_PI_2, TAU};

use eframe::egui::{Pos2, Vec2, vec2};

use crate::api::{DataPoint, GraphSnapshot, PointTable};
use crate::geometry::SquareMapping;

const FALLBACK_RING_FRACTION: f32 = 0.35;

/// Per-node target positions in simulation space, indexed like `GraphSnapshot::nodes`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedAnchors {
    pub positions: Vec<Vec2>,
    pub anchored: Vec<bool>,
}

/// Mean projected position of each node's visible members, mapped through the
/// point-cloud mapping and shifted so the viewport center is the origin.
pub fn resolve_anchors(
    snapshot: &GraphSnapshot,
    points: &PointTable,
    visible: impl Fn(&DataPoint) -> bool,
    mapping: &SquareMapping,
) -> ResolvedAnchors {
    let center = mapping.viewport() * 0.5;
    let mut positions = Vec::with_capacity(snapshot.nodes().len());
    let mut anchored = Vec::with_capacity(snapshot.nodes().len());

    for node in snapshot.nodes() {
        let mut sum = Vec2::ZERO;
        let mut count = 0usize;
        for point in node.members.iter().filter_map(|&id| points.get(id)) {
            if !visible(point) {
                continue;
            }
            sum += point.projected.to_vec2();
            count += 1;
        }

        if count == 0 {
            positions.push(Vec2::ZERO);
            anchored.push(false);
            continue;
        }

        let mean = Pos2::ZERO + sum / count as f32;
        positions.push(mapping.to_viewport(mean).to_vec2() - center);
        anchored.push(true);
    }

    let unanchored = anchored.iter().filter(|&&flag| !flag).count();
    if unanchored > 0 {
        log::debug!("anchors: {unanchored} nodes without visible members, using ring placement");
        let ring = mapping.viewport().min_elem() * FALLBACK_RING_FRACTION;
        let slots = fallback_ring(unanchored, ring);
        let targets = anchored
            .iter()
            .enumerate()
            .filter(|&(_, &flag)| !flag)
            .map(|(index, _)| index);
        for (index, slot) in targets.zip(slots) {
            positions[index] = slot;
        }
    }

    ResolvedAnchors {
        positions,
        anchored,
    }
}

/// `count` positions evenly spaced on a circle, starting at the top.
pub fn fallback_ring(count: usize, radius: f32) -> Vec<Vec2> {
    if count == 1 {
        return vec![Vec2::ZERO];
    }
    (0..count)
        .map(|slot| {
            let angle = TAU * slot as f32 / count as f32 - FRAC_PI_2;
            vec2(angle.cos(), angle.sin()) * radius
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use eframe::egui::pos2;

    use super::*;
    use crate::api::{GraphNode, PointId};

    fn point(id: PointId, x: f32, y: f32, category: &str) -> DataPoint {
        DataPoint {
            id,
            projected: pos2(x, y),
            categories: BTreeSet::from([category.to_owned()]),
            label: format!("p{id}"),
            concepts: Vec::new(),
        }
    }

    fn table() -> PointTable {
        PointTable::new(vec![
            point(1, 0.0, 0.0, "Animal"),
            point(2, 2.0, 0.0, "Animal"),
            point(3, 2.0, 2.0, "Tool"),
            point(4, 0.0, 2.0, "Tool"),
        ])
    }

    fn snapshot(groups: &[&[PointId]]) -> GraphSnapshot {
        let nodes = groups
            .iter()
            .enumerate()
            .map(|(id, members)| GraphNode {
                id: id as u32,
                members: members.to_vec(),
            })
            .collect();
        GraphSnapshot::normalized(nodes, Vec::new(), 0.5)
    }

    fn mapping(points: &PointTable) -> SquareMapping {
        SquareMapping::compute(points.iter().map(|p| p.projected), vec2(200.0, 200.0), 0.0)
    }

    #[test]
    fn anchor_is_the_mapped_mean_of_members() {
        let points = table();
        let mapping = mapping(&points);
        let graph = snapshot(&[&[1, 2, 3, 4], &[1, 2]]);
        let anchors = resolve_anchors(&graph, &points, |_| true, &mapping);

        assert_eq!(anchors.anchored, vec![true, true]);
        let whole = anchors.positions[0];
        assert!(whole.length() < 1e-3, "{whole:?}");

        let bottom = anchors.positions[1];
        let expected = mapping.to_viewport(pos2(1.0, 0.0)).to_vec2() - vec2(100.0, 100.0);
        assert!((bottom - expected).length() < 1e-3);
        assert!(bottom.y > 0.0, "low data y sits below the center");
    }

    #[test]
    fn hidden_members_do_not_pull_the_anchor() {
        let points = table();
        let mapping = mapping(&points);
        let anchors = resolve_anchors(
            &snapshot(&[&[1, 3]]),
            &points,
            |p| p.categories.contains("Animal"),
            &mapping,
        );

        let expected = mapping.to_viewport(pos2(0.0, 0.0)).to_vec2() - vec2(100.0, 100.0);
        assert!((anchors.positions[0] - expected).length() < 1e-3);
    }

    #[test]
    fn nodes_without_visible_members_get_distinct_ring_slots() {
        let points = table();
        let mapping = mapping(&points);
        let anchors = resolve_anchors(
            &snapshot(&[&[3], &[1], &[4], &[99]]),
            &points,
            |p| p.categories.contains("Animal"),
            &mapping,
        );

        assert_eq!(anchors.anchored, vec![false, true, false, false]);
        let ring = [anchors.positions[0], anchors.positions[2], anchors.positions[3]];
        for (i, a) in ring.iter().enumerate() {
            assert!((a.length() - 70.0).abs() < 1e-3);
            for b in &ring[i + 1..] {
                assert!((*a - *b).length() > 1.0);
            }
        }
    }

    #[test]
    fn ring_placement_is_deterministic() {
        assert_eq!(fallback_ring(5, 10.0), fallback_ring(5, 10.0));
        assert_eq!(fallback_ring(1, 10.0), vec![Vec2::ZERO]);
        assert!(fallback_ring(0, 10.0).is_empty());
    }
}
