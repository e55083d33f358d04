use crate::{
    backend::Sheet,
    detect::HeadBox,
    policy::OutputFormat,
    sizes::{MmSize, PixelSize},
    validate::ValidationResult,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadBoxSource {
    Caller,
    Detector,
    Estimated,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub template_key: String,
    pub started: String,
    pub finished: String,
    pub size: PixelSize,
    pub format: OutputFormat,
    pub policy_enforced: bool,
    pub cutout_mode: Option<String>,
    pub cutout_ms: Option<u64>,
    pub head_box: Option<HeadBox>,
    pub head_box_source: HeadBoxSource,
    pub auto_adjust: bool,
    pub used_fallback: bool,
    pub validation: Option<ValidationResult>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetReport {
    pub template_key: String,
    pub sheet: Sheet,
    pub mm: MmSize,
    pub margins_mm: f64,
    pub pdf_bytes: usize,
}
