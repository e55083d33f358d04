use crate::{config::Validation, util::round_px};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationInput {
    pub final_width: f64,
    pub final_height: f64,
    #[serde(default)]
    pub head_top: Option<f64>,
    #[serde(default)]
    pub head_bottom: Option<f64>,
    #[serde(default)]
    pub eye_line_y: Option<f64>,
    #[serde(default)]
    pub sampled_bg_rgb: Option<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub notes: Vec<String>,
    pub meta: ValidationMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<RequiredRanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Measured>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PxRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredRanges {
    pub size_px: PxRange,
    pub head_px: PxRange,
    pub eyes_from_bottom_px: PxRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measured {
    pub width: f64,
    pub height: f64,
    pub head_top: Option<f64>,
    pub head_bottom: Option<f64>,
    pub head_height: Option<f64>,
    pub eye_line_y: Option<f64>,
}

pub const INVALID_SIZE: &str = "Invalid final size.";

pub fn validate(rules: &Validation, input: &ValidationInput) -> ValidationResult {
    let w = input.final_width;
    let h = input.final_height;

    if !w.is_finite() || !h.is_finite() || w <= 0.0 || h <= 0.0 {
        return ValidationResult {
            valid: false,
            errors: vec![INVALID_SIZE.to_string()],
            notes: Vec::new(),
            meta: ValidationMeta::default(),
        };
    }

    let mut errors = Vec::new();
    let mut notes = Vec::new();

    if w != h {
        errors.push("Image must be square.".to_string());
    }
    let min_size = rules.min_size_px as f64;
    let max_size = rules.max_size_px as f64;
    if w < min_size || w > max_size {
        errors.push(format!(
            "Image must be {}–{} px on each side.",
            rules.min_size_px, rules.max_size_px
        ));
    }

    let head = match (input.head_top, input.head_bottom) {
        (Some(top), Some(bottom)) if top.is_finite() && bottom.is_finite() && bottom > top => {
            Some((top, bottom))
        }
        _ => None,
    };
    let min_head = rules.head_min_pct * h;
    let max_head = rules.head_max_pct * h;

    match head {
        None => notes.push("Head box not provided — skipping head size check.".to_string()),
        Some((top, bottom)) => {
            let head_h = bottom - top;
            if head_h < min_head || head_h > max_head {
                errors.push(format!(
                    "Head must be {}%–{}% of image height ({}–{} px).",
                    pct(rules.head_min_pct),
                    pct(rules.head_max_pct),
                    round_px(min_head),
                    round_px(max_head)
                ));
            } else {
                notes.push(format!("Head OK: {}%", pct(head_h / h)));
            }
        }
    }

    let eye_line = input.eye_line_y.filter(|y| y.is_finite());
    let min_eye = rules.eyes_from_bottom_min_pct * h;
    let max_eye = rules.eyes_from_bottom_max_pct * h;

    match eye_line {
        None => notes.push("Eye line not provided — skipping eye position check.".to_string()),
        Some(y) => {
            let from_bottom = h - y;
            if from_bottom < min_eye || from_bottom > max_eye {
                errors.push(format!(
                    "Eyes must be {}%–{}% from the bottom ({}–{} px).",
                    pct(rules.eyes_from_bottom_min_pct),
                    pct(rules.eyes_from_bottom_max_pct),
                    round_px(min_eye),
                    round_px(max_eye)
                ));
            } else {
                notes.push(format!("Eyes OK: {}% from bottom", pct(from_bottom / h)));
            }
        }
    }

    if let Some(rgb) = input.sampled_bg_rgb
        && rgb.iter().all(|c| c.is_finite())
    {
        if background_ok(rules, rgb) {
            notes.push("Background OK.".to_string());
        } else {
            errors.push("Background must be plain white or off-white (no color cast).".to_string());
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        notes,
        meta: ValidationMeta {
            required: Some(RequiredRanges {
                size_px: PxRange {
                    min: rules.min_size_px as i64,
                    max: rules.max_size_px as i64,
                },
                head_px: PxRange {
                    min: round_px(min_head),
                    max: round_px(max_head),
                },
                eyes_from_bottom_px: PxRange {
                    min: round_px(min_eye),
                    max: round_px(max_eye),
                },
            }),
            measured: Some(Measured {
                width: w,
                height: h,
                head_top: head.map(|(t, _)| t),
                head_bottom: head.map(|(_, b)| b),
                head_height: head.map(|(t, b)| b - t),
                eye_line_y: eye_line,
            }),
        },
    }
}

pub fn background_ok(rules: &Validation, rgb: [f64; 3]) -> bool {
    let [r, g, b] = rgb;
    let avg = (r + g + b) / 3.0;
    let max_delta = (r - g).abs().max((g - b).abs()).max((r - b).abs());
    avg >= rules.bg_min_luminance && max_delta <= rules.bg_max_channel_delta
}

/// Eye line assumed at `rules.eye_estimate_fraction` of the head box from its top.
pub fn estimate_eye_y(rules: &Validation, head_top: f64, head_bottom: f64) -> Option<f64> {
    if !head_top.is_finite() || !head_bottom.is_finite() || head_bottom <= head_top {
        return None;
    }
    let head_h = head_bottom - head_top;
    Some(round_px(head_top + rules.eye_estimate_fraction * head_h) as f64)
}

fn pct(ratio: f64) -> i64 {
    round_px(ratio * 100.0)
}
