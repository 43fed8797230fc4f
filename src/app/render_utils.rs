use std::f32::consts::FRAC_PI_2;

use eframe::egui::{Color32, Painter, Pos2, Rect, Shape, Stroke, Vec2, vec2};

use crate::comparison::Wedge;
use crate::selection::Emphasis;

pub(super) const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);
const SEARCH_MATCH_COLOR: Color32 = Color32::from_rgb(103, 196, 255);
const NEIGHBOR_COLOR: Color32 = Color32::from_rgb(246, 137, 92);
const FOREGROUND_COLOR: Color32 = Color32::from_rgb(168, 178, 194);
const BACKGROUND_COLOR: Color32 = Color32::from_rgba_premultiplied(58, 62, 68, 110);

pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub(super) fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(19, 23, 29));

    let step = (56.0 * zoom.clamp(0.6, 1.8)).max(20.0);
    let origin = rect.center() + pan;

    let mut x = origin.x.rem_euclid(step);
    while x < rect.right() {
        painter.line_segment(
            [Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())],
            Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 80, 70)),
        );
        x += step;
    }

    let mut y = origin.y.rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment(
            [Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)],
            Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 80, 70)),
        );
        y += step;
    }
}

pub(super) fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

pub(super) fn edge_visible(rect: Rect, start: Pos2, end: Pos2, padding: f32) -> bool {
    let min_x = start.x.min(end.x) - padding;
    let max_x = start.x.max(end.x) + padding;
    let min_y = start.y.min(end.y) - padding;
    let max_y = start.y.max(end.y) + padding;

    if max_x < rect.left() || min_x > rect.right() || max_y < rect.top() || min_y > rect.bottom() {
        return false;
    }

    if rect.contains(start) || rect.contains(end) {
        return true;
    }

    let top_left = rect.left_top();
    let top_right = rect.right_top();
    let bottom_left = rect.left_bottom();
    let bottom_right = rect.right_bottom();

    segments_intersect(start, end, top_left, top_right)
        || segments_intersect(start, end, top_right, bottom_right)
        || segments_intersect(start, end, bottom_right, bottom_left)
        || segments_intersect(start, end, bottom_left, top_left)
}

fn segments_intersect(a1: Pos2, a2: Pos2, b1: Pos2, b2: Pos2) -> bool {
    fn cross(o: Pos2, a: Pos2, b: Pos2) -> f32 {
        let oa = a - o;
        let ob = b - o;
        (oa.x * ob.y) - (oa.y * ob.x)
    }

    let a_min_x = a1.x.min(a2.x);
    let a_max_x = a1.x.max(a2.x);
    let a_min_y = a1.y.min(a2.y);
    let a_max_y = a1.y.max(a2.y);
    let b_min_x = b1.x.min(b2.x);
    let b_max_x = b1.x.max(b2.x);
    let b_min_y = b1.y.min(b2.y);
    let b_max_y = b1.y.max(b2.y);

    if a_max_x < b_min_x || b_max_x < a_min_x || a_max_y < b_min_y || b_max_y < a_min_y {
        return false;
    }

    let c1 = cross(a1, a2, b1);
    let c2 = cross(a1, a2, b2);
    let c3 = cross(b1, b2, a1);
    let c4 = cross(b1, b2, a2);

    (c1 <= 0.0 && c2 >= 0.0 || c1 >= 0.0 && c2 <= 0.0)
        && (c3 <= 0.0 && c4 >= 0.0 || c3 >= 0.0 && c4 <= 0.0)
}

pub(super) fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Vec2) -> Pos2 {
    rect.center() + pan + world * zoom
}

pub(super) fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.center() - pan) / zoom
}

pub(super) fn emphasis_color(emphasis: Emphasis, focus: bool) -> Color32 {
    match emphasis {
        Emphasis::Selected => SELECTED_COLOR,
        Emphasis::SearchMatch => SEARCH_MATCH_COLOR,
        Emphasis::Neighbor => NEIGHBOR_COLOR,
        Emphasis::Foreground if focus => dim_color(FOREGROUND_COLOR, 0.55),
        Emphasis::Foreground => FOREGROUND_COLOR,
        Emphasis::Background => BACKGROUND_COLOR,
    }
}

/// Screen radius of a projected point.
pub(super) fn point_radius(emphasis: Emphasis) -> f32 {
    match emphasis {
        Emphasis::Selected => 4.5,
        Emphasis::SearchMatch | Emphasis::Neighbor => 3.5,
        Emphasis::Foreground => 2.5,
        Emphasis::Background => 1.8,
    }
}

/// Offset of `angle`, measured clockwise from twelve o'clock, on a circle.
fn clock_offset(angle: f32, radius: f32) -> Vec2 {
    vec2(angle.sin(), -angle.cos()) * radius
}

/// Paints pie wedges as convex slices no wider than a quarter turn.
pub(super) fn draw_pie(painter: &Painter, center: Pos2, radius: f32, wedges: &[Wedge]) {
    const STEP: f32 = FRAC_PI_2 / 8.0;

    for wedge in wedges {
        let color = wedge.bucket.color();
        let mut start = wedge.start;
        while start < wedge.end - f32::EPSILON {
            let end = (start + FRAC_PI_2).min(wedge.end);
            let steps = ((end - start) / STEP).ceil().max(1.0) as usize;
            let mut points = Vec::with_capacity(steps + 2);
            points.push(center);
            for step in 0..=steps {
                let angle = start + (end - start) * step as f32 / steps as f32;
                points.push(center + clock_offset(angle, radius));
            }
            painter.add(Shape::convex_polygon(points, color, Stroke::NONE));
            start = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    #[test]
    fn clock_angles_start_at_twelve_and_run_clockwise() {
        let top = clock_offset(0.0, 10.0);
        assert!(top.x.abs() < 1e-5 && (top.y + 10.0).abs() < 1e-5);

        let right = clock_offset(FRAC_PI_2, 10.0);
        assert!((right.x - 10.0).abs() < 1e-4 && right.y.abs() < 1e-4);

        let bottom = clock_offset(PI, 10.0);
        assert!((bottom.y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn viewport_transform_round_trips() {
        let rect = Rect::from_min_size(Pos2::new(10.0, 20.0), vec2(300.0, 200.0));
        let pan = vec2(-14.0, 6.0);
        let world = vec2(33.0, -71.0);
        let screen = world_to_screen(rect, pan, 1.7, world);
        let back = screen_to_world(rect, pan, 1.7, screen);
        assert!((back - world).length() < 1e-3);
    }

    #[test]
    fn edges_crossing_the_view_are_visible() {
        let rect = Rect::from_min_size(Pos2::ZERO, vec2(100.0, 100.0));
        assert!(edge_visible(rect, Pos2::new(-50.0, 50.0), Pos2::new(150.0, 50.0), 0.0));
        assert!(!edge_visible(rect, Pos2::new(-50.0, -50.0), Pos2::new(-10.0, 150.0), 0.0));
    }

    #[test]
    fn focus_dims_plain_foreground_only() {
        assert_ne!(
            emphasis_color(Emphasis::Foreground, true),
            emphasis_color(Emphasis::Foreground, false)
        );
        assert_eq!(
            emphasis_color(Emphasis::Selected, true),
            emphasis_color(Emphasis::Selected, false)
        );
    }
}
