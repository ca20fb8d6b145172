use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use rusty_sleep::data::model::{Factor, Level};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fixed colours for the model layers
// ---------------------------------------------------------------------------

/// Translucent colours are premultiplied (each channel ≤ alpha).
pub struct SeriesColors;

impl SeriesColors {
    pub const OLS: Color32 = Color32::from_rgb(230, 120, 40);
    pub const POSTERIOR_LINE: Color32 = Color32::from_rgba_premultiplied(9, 16, 27, 40);
    pub const MEDIAN: Color32 = Color32::from_rgb(50, 110, 220);
    pub const LINPRED_RIBBON: Color32 = Color32::from_rgba_premultiplied(18, 39, 78, 90);
    pub const PREDICTIVE_RIBBON: Color32 = Color32::from_rgba_premultiplied(9, 19, 39, 45);
    pub const OLS_BAND: Color32 = Color32::from_rgba_premultiplied(54, 28, 9, 60);
}

// ---------------------------------------------------------------------------
// Color mapping: factor level → Color32
// ---------------------------------------------------------------------------

/// Maps the levels of a chosen factor to distinct colours.
#[derive(Debug, Clone)]
pub struct ColorMap {
    pub factor: Factor,
    mapping: BTreeMap<Level, Color32>,
    default_color: Color32,
}

impl ColorMap {
    /// Build a colour map for `factor` from its levels. Missing values are
    /// drawn grey.
    pub fn new(factor: Factor, levels: &BTreeSet<Level>) -> Self {
        let named: Vec<&Level> = levels.iter().filter(|l| l.is_some()).collect();
        let palette = generate_palette(named.len());
        let mapping: BTreeMap<Level, Color32> = named
            .into_iter()
            .zip(palette)
            .map(|(l, c)| (l.clone(), c))
            .collect();

        ColorMap {
            factor,
            mapping,
            default_color: Color32::GRAY,
        }
    }

    /// Look up the colour for a given level.
    pub fn color_for(&self, level: &Level) -> Color32 {
        self.mapping
            .get(level)
            .copied()
            .unwrap_or(self.default_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_size_and_distinct() {
        let p = generate_palette(4);
        assert_eq!(p.len(), 4);
        let unique: BTreeSet<[u8; 4]> = p.iter().map(|c| c.to_array()).collect();
        assert_eq!(unique.len(), 4);
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn missing_level_is_grey() {
        let levels: BTreeSet<Level> =
            [None, Some("carni".to_string()), Some("omni".to_string())].into();
        let cm = ColorMap::new(Factor::Vore, &levels);
        assert_eq!(cm.color_for(&None), Color32::GRAY);
        assert_ne!(
            cm.color_for(&Some("carni".to_string())),
            cm.color_for(&Some("omni".to_string()))
        );
        assert_eq!(cm.color_for(&Some("unknown".to_string())), Color32::GRAY);
    }
}
