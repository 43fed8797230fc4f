use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use eframe::egui::{Vec2, vec2};

/// Deterministic unit direction for a pair of indices.
pub fn jiggle(a: u64, b: u64) -> Vec2 {
    let mut hasher = DefaultHasher::new();
    (a, b).hash(&mut hasher);
    let hash = hasher.finish();

    let turn = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let angle = turn * std::f32::consts::TAU;
    vec2(angle.cos(), angle.sin())
}

/// Cuts `label` to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn short_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_owned();
    }
    let mut cut = label
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    cut.push('…');
    cut
}

pub fn format_percentage(value: f32) -> String {
    if value >= 10.0 {
        format!("{value:.0}%")
    } else {
        format!("{value:.1}%")
    }
}
