use crate::{
    config::Detection,
    util::{parse_f64_list, round_px},
};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FaceBounds {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

impl FromStr for FaceBounds {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_f64_list(s)?.as_slice() {
            &[x, y, width, height] => Ok(FaceBounds {
                x,
                y,
                width,
                height,
            }),
            _ => Err(anyhow!("face bounds need x,y,w,h: {s}")),
        }
    }
}

// top of hair to bottom of chin, final-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadBox {
    pub top: i64,
    pub bottom: i64,
}

impl HeadBox {
    pub fn new(top: i64, bottom: i64) -> Option<Self> {
        (bottom > top).then_some(Self { top, bottom })
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

/// Bounds must come back in `target`x`target` final-image coordinates. The
/// image passed in is the cutout at its source resolution, so implementors
/// scale their detections to the target themselves.
pub trait FaceDetector {
    fn detect(&self, image_base64: &str, target: u32) -> Result<Vec<FaceBounds>>;
}

/// Largest face wins, first one on ties. Boxes shorter than
/// `min_head_fraction` of the target count as no detection.
pub fn head_box_from_faces(cfg: &Detection, faces: &[FaceBounds], target: u32) -> Option<HeadBox> {
    let face = faces
        .iter()
        .filter(|f| f.width.is_finite() && f.height.is_finite() && f.y.is_finite())
        .min_by(|a, b| b.area().total_cmp(&a.area()))?;

    let target = target as f64;
    let y = face.y;
    let h = face.height;
    let top = (y - cfg.expand_top_pct * h).floor().max(0.0);
    let bottom = (y + h + cfg.expand_bottom_pct * h).ceil().min(target);

    if bottom - top < target * cfg.min_head_fraction {
        return None;
    }
    HeadBox::new(top as i64, bottom as i64)
}

pub fn estimated_head_box(cfg: &Detection, final_height: u32) -> HeadBox {
    let h = final_height as f64;
    let frac = cfg.estimated_head_fraction;
    let top = round_px(h * (1.0 - frac) / 2.0);
    let bottom = top + round_px(h * frac);
    HeadBox {
        top,
        bottom: bottom.max(top + 1),
    }
}
