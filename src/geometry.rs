use eframe::egui::{Pos2, Rect, Vec2, pos2, vec2};

use crate::error::{ExplorerError, ExplorerResult};

/// Fraction of the data extent added on each side by the point-cloud view.
pub const DEFAULT_PADDING: f32 = 0.05;

const MIN_EXTENT: f32 = 1e-6;

/// Linear map from projection space to a viewport with equal x and y scale.
///
/// Viewport y grows downward, so data y is flipped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareMapping {
    domain: Rect,
    viewport: Vec2,
}

impl SquareMapping {
    pub fn compute(
        points: impl IntoIterator<Item = Pos2>,
        viewport: Vec2,
        padding_fraction: f32,
    ) -> Self {
        let viewport = vec2(viewport.x.max(1.0), viewport.y.max(1.0));

        let mut min = pos2(f32::INFINITY, f32::INFINITY);
        let mut max = pos2(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for point in points {
            if !point.x.is_finite() || !point.y.is_finite() {
                continue;
            }
            min = min.min(point);
            max = max.max(point);
        }

        let (min, max) = if min.x > max.x {
            log::debug!("square mapping: no points, using unit domain");
            (pos2(-0.5, -0.5), pos2(0.5, 0.5))
        } else {
            let (x0, x1) = axis_extent(min.x, max.x)
                .unwrap_or_else(|error| unit_axis(min.x, max.x, error));
            let (y0, y1) = axis_extent(min.y, max.y)
                .unwrap_or_else(|error| unit_axis(min.y, max.y, error));
            (pos2(x0, y0), pos2(x1, y1))
        };

        let padding = (max - min) * padding_fraction.max(0.0);
        let padded = Rect::from_min_max(min - padding, max + padding);

        // Widen whichever axis would otherwise get the larger scale.
        let scale_x = viewport.x / padded.width();
        let scale_y = viewport.y / padded.height();
        let size = if scale_x > scale_y {
            vec2(viewport.x / scale_y, padded.height())
        } else {
            vec2(padded.width(), viewport.y / scale_x)
        };

        Self {
            domain: Rect::from_center_size(padded.center(), size),
            viewport,
        }
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn scale_x(&self) -> f32 {
        self.viewport.x / self.domain.width()
    }

    pub fn scale_y(&self) -> f32 {
        self.viewport.y / self.domain.height()
    }

    pub fn to_viewport(&self, point: Pos2) -> Pos2 {
        pos2(
            (point.x - self.domain.min.x) * self.scale_x(),
            self.viewport.y - (point.y - self.domain.min.y) * self.scale_y(),
        )
    }

    pub fn to_data(&self, point: Pos2) -> Pos2 {
        pos2(
            self.domain.min.x + point.x / self.scale_x(),
            self.domain.min.y + (self.viewport.y - point.y) / self.scale_y(),
        )
    }
}

fn axis_extent(low: f32, high: f32) -> ExplorerResult<(f32, f32)> {
    if high - low > MIN_EXTENT {
        Ok((low, high))
    } else {
        Err(ExplorerError::DegenerateGeometry)
    }
}

fn unit_axis(low: f32, high: f32, error: ExplorerError) -> (f32, f32) {
    log::debug!("square mapping: {error} at {low}, using unit domain");
    let center = (low + high) * 0.5;
    (center - 0.5, center + 0.5)
}

/// Even-odd ray casting; the path is closed implicitly.
pub fn point_in_polygon(point: Pos2, path: &[Pos2]) -> bool {
    if path.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut previous = path[path.len() - 1];
    for &current in path {
        let crosses = (current.y > point.y) != (previous.y > point.y);
        if crosses {
            let x_at_y = current.x
                + (point.y - current.y) * (previous.x - current.x) / (previous.y - current.y);
            if point.x < x_at_y {
                inside = !inside;
            }
        }
        previous = current;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-3 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn scales_are_equal_for_wide_and_tall_data() {
        let cases = [
            (vec![pos2(0.0, 0.0), pos2(10.0, 1.0)], vec2(400.0, 400.0)),
            (vec![pos2(-3.0, -50.0), pos2(2.0, 80.0)], vec2(800.0, 300.0)),
            (
                vec![pos2(1.0, 1.0), pos2(1.5, 9.0), pos2(7.0, 4.0)],
                vec2(250.0, 900.0),
            ),
        ];

        for (points, viewport) in cases {
            let mapping = SquareMapping::compute(points.iter().copied(), viewport, 0.05);
            assert!(
                close(mapping.scale_x(), mapping.scale_y()),
                "{} vs {}",
                mapping.scale_x(),
                mapping.scale_y()
            );
        }
    }

    #[test]
    fn all_points_land_inside_the_viewport() {
        let points = [pos2(-4.0, 2.0), pos2(6.0, -1.0), pos2(0.5, 9.0)];
        let viewport = vec2(640.0, 360.0);
        let mapping = SquareMapping::compute(points, viewport, 0.05);
        let bounds = Rect::from_min_size(Pos2::ZERO, viewport);

        for point in points {
            let mapped = mapping.to_viewport(point);
            assert!(bounds.contains(mapped), "{mapped:?}");
        }
    }

    #[test]
    fn domain_center_stays_fixed_when_expanding() {
        let mapping =
            SquareMapping::compute([pos2(0.0, 0.0), pos2(10.0, 2.0)], vec2(100.0, 100.0), 0.0);
        assert!(close(mapping.domain.center().x, 5.0));
        assert!(close(mapping.domain.center().y, 1.0));
        assert!(close(mapping.domain.height(), 10.0));
    }

    #[test]
    fn inverse_round_trips() {
        let mapping =
            SquareMapping::compute([pos2(-1.0, -2.0), pos2(3.0, 5.0)], vec2(300.0, 200.0), 0.1);
        let point = pos2(0.7, 1.3);
        let back = mapping.to_data(mapping.to_viewport(point));
        assert!(close(back.x, point.x) && close(back.y, point.y));
    }

    #[test]
    fn higher_data_y_is_drawn_higher() {
        let mapping =
            SquareMapping::compute([pos2(0.0, 0.0), pos2(1.0, 1.0)], vec2(100.0, 100.0), 0.0);
        assert!(mapping.to_viewport(pos2(0.5, 0.9)).y < mapping.to_viewport(pos2(0.5, 0.1)).y);
    }

    #[test]
    fn single_point_falls_back_to_unit_domain() {
        let mapping = SquareMapping::compute([pos2(3.0, -2.0)], vec2(200.0, 200.0), 0.0);
        assert!(close(mapping.domain.width(), 1.0));
        assert!(close(mapping.domain.height(), 1.0));
        let center = mapping.to_viewport(pos2(3.0, -2.0));
        assert!(close(center.x, 100.0) && close(center.y, 100.0));
    }

    #[test]
    fn vertical_line_gets_unit_width() {
        let mapping =
            SquareMapping::compute([pos2(2.0, 0.0), pos2(2.0, 4.0)], vec2(100.0, 100.0), 0.0);
        assert!(mapping.scale_x().is_finite());
        assert!(close(mapping.scale_x(), mapping.scale_y()));
        assert!(close(mapping.domain.center().x, 2.0));
    }

    #[test]
    fn empty_input_uses_unit_domain_at_origin() {
        let mapping = SquareMapping::compute(std::iter::empty(), vec2(50.0, 50.0), 0.05);
        assert!(close(mapping.domain.center().x, 0.0));
        assert!(mapping.scale_x().is_finite());
    }

    #[test]
    fn polygon_needs_three_vertices() {
        assert!(!point_in_polygon(pos2(0.0, 0.0), &[]));
        assert!(!point_in_polygon(
            pos2(0.5, 0.0),
            &[pos2(0.0, 0.0), pos2(1.0, 0.0)]
        ));
    }

    #[test]
    fn convex_quadrilateral_contains_inside_points_only() {
        let quad = [
            pos2(0.0, 0.0),
            pos2(4.0, 0.5),
            pos2(4.5, 4.0),
            pos2(-0.5, 3.5),
        ];
        assert!(point_in_polygon(pos2(2.0, 2.0), &quad));
        assert!(point_in_polygon(pos2(0.5, 3.0), &quad));
        assert!(!point_in_polygon(pos2(5.0, 2.0), &quad));
        assert!(!point_in_polygon(pos2(2.0, -1.0), &quad));
        assert!(!point_in_polygon(pos2(-2.0, 2.0), &quad));
    }

    #[test]
    fn concave_notch_is_outside() {
        // A "U" shape opening upward.
        let shape = [
            pos2(0.0, 0.0),
            pos2(6.0, 0.0),
            pos2(6.0, 6.0),
            pos2(4.0, 6.0),
            pos2(4.0, 2.0),
            pos2(2.0, 2.0),
            pos2(2.0, 6.0),
            pos2(0.0, 6.0),
        ];
        assert!(point_in_polygon(pos2(1.0, 5.0), &shape));
        assert!(point_in_polygon(pos2(5.0, 5.0), &shape));
        assert!(point_in_polygon(pos2(3.0, 1.0), &shape));
        assert!(!point_in_polygon(pos2(3.0, 4.0), &shape));
    }

    #[test]
    fn explicitly_closed_path_behaves_like_open_one() {
        let open = [pos2(0.0, 0.0), pos2(2.0, 0.0), pos2(1.0, 2.0)];
        let closed = [open[0], open[1], open[2], open[0]];
        let probe = pos2(1.0, 0.5);
        assert_eq!(
            point_in_polygon(probe, &open),
            point_in_polygon(probe, &closed)
        );
        assert!(point_in_polygon(probe, &closed));
    }
}
