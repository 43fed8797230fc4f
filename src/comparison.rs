use std::collections::BTreeSet;
use std::f32::consts::TAU;

use eframe::egui::Color32;

use crate::api::{PointId, PointTable};

pub const PINNED_ONLY_COLOR: Color32 = Color32::from_rgb(66, 135, 245);
pub const COMPARED_ONLY_COLOR: Color32 = Color32::from_rgb(230, 74, 74);
pub const SHARED_COLOR: Color32 = Color32::from_rgb(150, 84, 200);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    PinnedOnly,
    ComparedOnly,
    Shared,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::PinnedOnly, Bucket::ComparedOnly, Bucket::Shared];

    pub fn color(self) -> Color32 {
        match self {
            Bucket::PinnedOnly => PINNED_ONLY_COLOR,
            Bucket::ComparedOnly => COMPARED_ONLY_COLOR,
            Bucket::Shared => SHARED_COLOR,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Bucket::PinnedOnly => "pinned only",
            Bucket::ComparedOnly => "compared only",
            Bucket::Shared => "both",
        }
    }
}

/// Member counts per bucket; points in neither category are not counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub pinned_only: usize,
    pub compared_only: usize,
    pub shared: usize,
}

impl Partition {
    pub fn count(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::PinnedOnly => self.pinned_only,
            Bucket::ComparedOnly => self.compared_only,
            Bucket::Shared => self.shared,
        }
    }

    pub fn total(&self) -> usize {
        self.pinned_only + self.compared_only + self.shared
    }
}

pub fn classify(categories: &BTreeSet<String>, pinned: &str, compared: &str) -> Option<Bucket> {
    match (categories.contains(pinned), categories.contains(compared)) {
        (true, true) => Some(Bucket::Shared),
        (true, false) => Some(Bucket::PinnedOnly),
        (false, true) => Some(Bucket::ComparedOnly),
        (false, false) => None,
    }
}

pub fn partition(
    members: &[PointId],
    points: &PointTable,
    pinned: &str,
    compared: &str,
) -> Partition {
    let mut partition = Partition::default();
    for point in members.iter().filter_map(|&id| points.get(id)) {
        match classify(&point.categories, pinned, compared) {
            Some(Bucket::PinnedOnly) => partition.pinned_only += 1,
            Some(Bucket::ComparedOnly) => partition.compared_only += 1,
            Some(Bucket::Shared) => partition.shared += 1,
            None => {}
        }
    }
    partition
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Wedge {
    pub bucket: Bucket,
    pub count: usize,
    /// Radians, clockwise from twelve o'clock.
    pub start: f32,
    pub end: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeFill {
    Neutral,
    Solid(Bucket),
    Pie(Vec<Wedge>),
}

impl NodeFill {
    pub fn from_partition(partition: Partition) -> Self {
        let total = partition.total();
        if total == 0 {
            return NodeFill::Neutral;
        }

        let present = Bucket::ALL
            .into_iter()
            .filter(|&bucket| partition.count(bucket) > 0)
            .collect::<Vec<_>>();
        if let [only] = present.as_slice() {
            return NodeFill::Solid(*only);
        }

        let mut start = 0.0;
        let wedges = present
            .into_iter()
            .map(|bucket| {
                let count = partition.count(bucket);
                let end = start + TAU * count as f32 / total as f32;
                let wedge = Wedge {
                    bucket,
                    count,
                    start,
                    end,
                };
                start = end;
                wedge
            })
            .collect();
        NodeFill::Pie(wedges)
    }
}

/// Fill for a node's members; neutral unless a comparison is active.
pub fn comparison_fill(
    members: &[PointId],
    points: &PointTable,
    comparison: Option<(&str, &str)>,
) -> NodeFill {
    match comparison {
        Some((pinned, compared)) => {
            NodeFill::from_partition(partition(members, points, pinned, compared))
        }
        None => NodeFill::Neutral,
    }
}
