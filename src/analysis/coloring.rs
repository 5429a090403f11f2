//! Cell coloring.
//!
//! Pure mapping from a cell value to a color bucket and RGBA color. The
//! value is scaled against a threshold (normally the value of the k-th
//! densest cell), so every cell at or above the threshold gets the top color.

use serde::{Deserialize, Serialize};

use super::types::GridCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Palette {
    #[default]
    GreenYellowRed,
    GreenRed,
    GreenRedGradient,
}

/// Which cell value is colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorBasis {
    #[default]
    Count,
    Density,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorBucket {
    Transparent,
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellColor {
    pub bucket: ColorBucket,
    pub rgb: [u8; 3],
    pub alpha: u8,
}

const GREEN: [u8; 3] = [0, 170, 0];
const YELLOW: [u8; 3] = [255, 215, 0];
const RED: [u8; 3] = [220, 20, 20];

const TRANSPARENT: CellColor = CellColor {
    bucket: ColorBucket::Transparent,
    rgb: [0, 0, 0],
    alpha: 0,
};

/// Classify a value. Non-positive values are transparent; a non-positive
/// threshold puts every positive value in the top bucket.
pub fn classify(value: f64, threshold: f64, palette: Palette, transparency: f32) -> CellColor {
    if !(value > 0.0) {
        return TRANSPARENT;
    }
    let ratio = if threshold > 0.0 {
        (value / threshold).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let alpha = (transparency.clamp(0.0, 1.0) * 255.0).round() as u8;

    let (bucket, rgb) = match palette {
        Palette::GreenYellowRed => {
            if ratio < 1.0 / 3.0 {
                (ColorBucket::Green, GREEN)
            } else if ratio < 2.0 / 3.0 {
                (ColorBucket::Yellow, YELLOW)
            } else {
                (ColorBucket::Red, RED)
            }
        }
        Palette::GreenRed => {
            if ratio < 0.5 {
                (ColorBucket::Green, GREEN)
            } else {
                (ColorBucket::Red, RED)
            }
        }
        Palette::GreenRedGradient => {
            let bucket = if ratio < 0.5 { ColorBucket::Green } else { ColorBucket::Red };
            (bucket, lerp(GREEN, RED, ratio))
        }
    };

    CellColor { bucket, rgb, alpha }
}

/// Classify a cell's current state.
pub fn classify_cell(
    cell: &GridCell,
    threshold: f64,
    basis: ColorBasis,
    palette: Palette,
    transparency: f32,
) -> CellColor {
    classify(cell_value(cell, basis), threshold, palette, transparency)
}

pub fn cell_value(cell: &GridCell, basis: ColorBasis) -> f64 {
    match basis {
        ColorBasis::Count => cell.population_count as f64,
        ColorBasis::Density => cell.density,
    }
}

fn lerp(from: [u8; 3], to: [u8; 3], t: f64) -> [u8; 3] {
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    [mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])]
}
