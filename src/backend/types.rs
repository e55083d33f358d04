use crate::{config::Validation, detect::HeadBox, policy::OutputFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Fast,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgRemoveIn {
    pub image_base64: String,
    pub format: String,
    pub quality: Quality,
    pub bg_color: String,
    #[serde(rename = "transparent_background")]
    pub transparent_background: bool,
    #[serde(rename = "final_bg", default, skip_serializing_if = "Option::is_none")]
    pub final_bg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgRemoveOut {
    pub image_base64: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PctRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoAdjustRules {
    pub head_pct: PctRange,
    pub eyes_from_bottom_pct: PctRange,
}

impl AutoAdjustRules {
    pub fn from_validation(v: &Validation) -> Self {
        Self {
            head_pct: PctRange {
                min: v.head_min_pct,
                max: v.head_max_pct,
            },
            eyes_from_bottom_pct: PctRange {
                min: v.eyes_from_bottom_min_pct,
                max: v.eyes_from_bottom_max_pct,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoAdjust {
    pub head_box: HeadBox,
    pub rules: AutoAdjustRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeIn {
    pub template_key: String,
    pub image_base64: String,
    pub width: u32,
    pub height: u32,
    pub bg_color: String,
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_adjust: Option<AutoAdjust>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposeOut {
    pub ok: bool,
    pub image_base64: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub error: Option<String>,
    pub details: Option<String>,
}

impl ComposeOut {
    pub fn failure_reason(&self) -> String {
        self.details
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "compose returned not ok".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetItem {
    pub image_base64: String,
    pub px_w: u32,
    pub px_h: u32,
    pub mm_w: f64,
    pub mm_h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetType {
    A4,
    Letter,
    #[serde(rename = "4x6")]
    FourBySix,
}

impl std::str::FromStr for SheetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(SheetType::A4),
            "letter" => Ok(SheetType::Letter),
            "4x6" => Ok(SheetType::FourBySix),
            other => Err(anyhow::anyhow!("unknown sheet type: {other} (want A4, Letter or 4x6)")),
        }
    }
}

impl SheetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetType::A4 => "A4",
            SheetType::Letter => "Letter",
            SheetType::FourBySix => "4x6",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    #[serde(rename = "type")]
    pub kind: SheetType,
    pub dpi: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub mm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposePdfIn {
    pub items: Vec<SheetItem>,
    pub sheet: Sheet,
    pub margins: Margins,
    pub cut_guides: bool,
    pub fill: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposePdfOut {
    pub pdf_base64: Option<String>,
}
