use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyEntry>,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub detection: Detection,
    #[serde(default)]
    pub export: Export,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: Default::default(),
            paths: Default::default(),
            backend: Default::default(),
            catalog: Default::default(),
            policies: default_policies(),
            validation: Default::default(),
            detection: Default::default(),
            export: Default::default(),
            logging: Default::default(),
            security: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub default_template: String,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            default_template: "US:passport".into(),
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Backend {
    pub api_url: String,
    pub force_fast: bool,
    pub fast_timeout_seconds: u64,
    pub ai_timeout_seconds: u64,
    pub compose_timeout_seconds: u64,
    pub default_timeout_seconds: u64,
}
impl Default for Backend {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".into(),
            force_fast: false,
            fast_timeout_seconds: 30,
            ai_timeout_seconds: 120,
            compose_timeout_seconds: 60,
            default_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    // TOML or JSON, merged over the built-in table
    pub path: String,
    pub fetch_remote: bool,
}
impl Default for Catalog {
    fn default() -> Self {
        Self {
            path: "".into(),
            fetch_remote: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub key: String,
    pub enforce_square: bool,
    pub enforce_jpeg: bool,
    pub enforce_no_alpha: bool,
    pub fallback_default: [u32; 2],
    pub fallback_min: [u32; 2],
    pub fallback_max: [u32; 2],
}

fn default_policies() -> Vec<PolicyEntry> {
    vec![PolicyEntry {
        key: "US:dv-lottery".into(),
        enforce_square: true,
        enforce_jpeg: true,
        enforce_no_alpha: true,
        fallback_default: [600, 600],
        fallback_min: [600, 600],
        fallback_max: [1200, 1200],
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    pub min_size_px: u32,
    pub max_size_px: u32,
    pub head_min_pct: f64,
    pub head_max_pct: f64,
    pub eyes_from_bottom_min_pct: f64,
    pub eyes_from_bottom_max_pct: f64,
    pub bg_min_luminance: f64,
    pub bg_max_channel_delta: f64,
    pub eye_estimate_fraction: f64,
}
impl Default for Validation {
    fn default() -> Self {
        Self {
            min_size_px: 600,
            max_size_px: 1200,
            head_min_pct: 0.50,
            head_max_pct: 0.69,
            eyes_from_bottom_min_pct: 0.56,
            eyes_from_bottom_max_pct: 0.69,
            bg_min_luminance: 235.0,
            bg_max_channel_delta: 20.0,
            eye_estimate_fraction: 0.40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Detection {
    pub expand_top_pct: f64,
    pub expand_bottom_pct: f64,
    pub min_head_fraction: f64,
    pub estimated_head_fraction: f64,
}
impl Default for Detection {
    fn default() -> Self {
        Self {
            expand_top_pct: 0.15,
            expand_bottom_pct: 0.20,
            min_head_fraction: 0.20,
            estimated_head_fraction: 0.60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Export {
    pub bg_color: String,
    pub dpi: u32,
    pub margins_mm: f64,
    pub cut_guides: bool,
    pub fill: bool,
    pub write_report_json: bool,
}
impl Default for Export {
    fn default() -> Self {
        Self {
            bg_color: "#ffffff".into(),
            dpi: 300,
            margins_mm: 5.0,
            cut_guides: true,
            fill: true,
            write_report_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
