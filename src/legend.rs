//! Colour legend and accessibility patterns.
//!
//! Distinct node fill colours are ranked by frequency and each rank is given one of five
//! hatch patterns, so colours stay distinguishable without relying on hue. Both renderers
//! derive the mapping from the node list through these functions, which keeps legends and
//! node overlays identical across the canvas and every export.

use crate::constants::PATTERN_TILE;
use crate::geometry::Point;
use crate::types::{Node, SceneSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hatch textures, in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessibilityPattern {
    Stripes,
    Dots,
    Crosshatch,
    Dashes,
    Waves,
}

/// The fixed pattern cycle.
pub const PATTERNS: [AccessibilityPattern; 5] = [
    AccessibilityPattern::Stripes,
    AccessibilityPattern::Dots,
    AccessibilityPattern::Crosshatch,
    AccessibilityPattern::Dashes,
    AccessibilityPattern::Waves,
];

/// One primitive inside a pattern tile, in tile-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatternMark {
    Line { from: Point, to: Point },
    Dot { center: Point, radius: f32 },
}

impl AccessibilityPattern {
    pub fn name(&self) -> &'static str {
        match self {
            AccessibilityPattern::Stripes => "stripes",
            AccessibilityPattern::Dots => "dots",
            AccessibilityPattern::Crosshatch => "crosshatch",
            AccessibilityPattern::Dashes => "dashes",
            AccessibilityPattern::Waves => "waves",
        }
    }

    /// Marks making up one `PATTERN_TILE`-sized tile of this pattern.
    pub fn marks(&self) -> Vec<PatternMark> {
        let t = PATTERN_TILE;
        let line = |x0: f32, y0: f32, x1: f32, y1: f32| PatternMark::Line {
            from: Point::new(x0, y0),
            to: Point::new(x1, y1),
        };
        match self {
            AccessibilityPattern::Stripes => vec![line(0.0, t, t, 0.0)],
            AccessibilityPattern::Dots => vec![PatternMark::Dot {
                center: Point::new(t / 2.0, t / 2.0),
                radius: t * 0.18,
            }],
            AccessibilityPattern::Crosshatch => vec![line(0.0, 0.0, t, t), line(0.0, t, t, 0.0)],
            AccessibilityPattern::Dashes => vec![line(t * 0.1, t / 2.0, t * 0.6, t / 2.0)],
            AccessibilityPattern::Waves => {
                let ys = [0.5, 0.3, 0.5, 0.7, 0.5];
                (0..4)
                    .map(|i| {
                        let x0 = t * i as f32 / 4.0;
                        let x1 = t * (i + 1) as f32 / 4.0;
                        line(x0, t * ys[i], x1, t * ys[i + 1])
                    })
                    .collect()
            }
        }
    }
}

/// Pattern for the `index`-th most frequent colour; cycles with period 5.
pub fn pattern_for_index(index: usize) -> AccessibilityPattern {
    PATTERNS[index % PATTERNS.len()]
}

/// A distinct fill colour and how many nodes use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorCount {
    /// Upper-cased hex colour
    pub color: String,
    pub count: usize,
}

/// Distinct node fill colours, most frequent first. Ties keep first-seen order.
pub fn extract_colors_by_frequency(nodes: &[Node]) -> Vec<ColorCount> {
    let mut counts: Vec<ColorCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        let color = node.background_color.to_ascii_uppercase();
        match index.get(&color) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(color.clone(), counts.len());
                counts.push(ColorCount { color, count: 1 });
            }
        }
    }
    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Colour → pattern index assignment for a node set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorPatternMap {
    indices: HashMap<String, usize>,
}

impl ColorPatternMap {
    /// Pattern index for a colour, case-insensitive.
    pub fn index_of(&self, color: &str) -> Option<usize> {
        self.indices.get(&color.to_ascii_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Assigns each distinct colour its frequency rank.
pub fn build_color_to_pattern_map(nodes: &[Node]) -> ColorPatternMap {
    let indices = extract_colors_by_frequency(nodes)
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c.color, i))
        .collect();
    ColorPatternMap { indices }
}

/// Pattern assigned to `color`, or `None` if no node uses it.
pub fn pattern_for_color(color: &str, map: &ColorPatternMap) -> Option<AccessibilityPattern> {
    map.index_of(color).map(pattern_for_index)
}

/// One legend row.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub color: String,
    pub count: usize,
    pub pattern: AccessibilityPattern,
    pub label: String,
}

/// Builds the legend rows for a node set, most frequent colour first.
///
/// Labels come from `settings.legend_labels` when present, otherwise `Category {n}` with
/// `n` the 1-based frequency rank.
pub fn legend_entries(nodes: &[Node], settings: &SceneSettings) -> Vec<LegendEntry> {
    extract_colors_by_frequency(nodes)
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let label = settings
                .legend_label(&c.color)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Category {}", i + 1));
            LegendEntry {
                pattern: pattern_for_index(i),
                color: c.color,
                count: c.count,
                label,
            }
        })
        .collect()
}
