use crate::{
    config::{Config, PolicyEntry},
    sizes::{PixelSize, SizeCatalog},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_DESIRED: PixelSize = PixelSize::new(600, 600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "jpg")]
    Jpeg,
    #[serde(rename = "png")]
    Png,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackSizes {
    pub default: PixelSize,
    pub min: PixelSize,
    pub max: PixelSize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPolicy {
    pub key: String,
    pub enforce_square: bool,
    pub enforce_jpeg: bool,
    pub enforce_no_alpha: bool,
    pub fallback: FallbackSizes,
}

impl OutputPolicy {
    pub fn dv_lottery() -> Self {
        Self {
            key: "US:dv-lottery".into(),
            enforce_square: true,
            enforce_jpeg: true,
            enforce_no_alpha: true,
            fallback: FallbackSizes {
                default: PixelSize::new(600, 600),
                min: PixelSize::new(600, 600),
                max: PixelSize::new(1200, 1200),
            },
        }
    }

    pub fn from_entry(entry: &PolicyEntry) -> Self {
        Self {
            key: entry.key.clone(),
            enforce_square: entry.enforce_square,
            enforce_jpeg: entry.enforce_jpeg,
            enforce_no_alpha: entry.enforce_no_alpha,
            fallback: FallbackSizes {
                default: entry.fallback_default.into(),
                min: entry.fallback_min.into(),
                max: entry.fallback_max.into(),
            },
        }
    }

    pub fn default_size(&self, catalog: &SizeCatalog) -> PixelSize {
        self.lookup(catalog, "digital.default")
            .unwrap_or(self.fallback.default)
    }

    pub fn min_size(&self, catalog: &SizeCatalog) -> PixelSize {
        self.lookup(catalog, "digital.min").unwrap_or(self.fallback.min)
    }

    pub fn max_size(&self, catalog: &SizeCatalog) -> PixelSize {
        self.lookup(catalog, "digital.max").unwrap_or(self.fallback.max)
    }

    fn lookup(&self, catalog: &SizeCatalog, target: &str) -> Option<PixelSize> {
        catalog.get(&self.key)?.pixel_target(target)
    }

    // Under square enforcement a zero or non-square candidate is replaced by
    // default_size, never repaired, and the height mirrors the clamped width.
    pub fn clamp_size(&self, catalog: &SizeCatalog, candidate: PixelSize) -> PixelSize {
        let min = self.min_size(catalog);
        let max = self.max_size(catalog);

        let mut c = candidate;
        if self.enforce_square && (c.w == 0 || c.h == 0 || c.w != c.h) {
            c = self.default_size(catalog);
        }

        let w = clamp(c.w, min.w, max.w);
        if self.enforce_square {
            PixelSize::new(w, w)
        } else {
            PixelSize::new(w, clamp(c.h, min.h, max.h))
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.enforce_jpeg {
            OutputFormat::Jpeg
        } else {
            OutputFormat::Png
        }
    }
}

// min wins when the bounds are inverted, so a bad catalog entry cannot panic.
fn clamp(n: u32, min: u32, max: u32) -> u32 {
    n.min(max).max(min)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeDecision {
    pub size: PixelSize,
    pub format: OutputFormat,
    pub enforced: bool,
    // background must be painted with an opaque color
    pub opaque: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, OutputPolicy>,
}

impl PolicyRegistry {
    pub fn from_config(cfg: &Config) -> Self {
        let mut reg = Self::default();
        for entry in &cfg.policies {
            reg.register(OutputPolicy::from_entry(entry));
        }
        reg
    }

    pub fn register(&mut self, policy: OutputPolicy) {
        self.policies.insert(policy.key.clone(), policy);
    }

    pub fn get(&self, key: &str) -> Option<&OutputPolicy> {
        self.policies.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn final_size(&self, catalog: &SizeCatalog, key: &str, desired: PixelSize) -> SizeDecision {
        let proposed = PixelSize::new(
            if desired.w == 0 { DEFAULT_DESIRED.w } else { desired.w },
            if desired.h == 0 { DEFAULT_DESIRED.h } else { desired.h },
        );

        match self.get(key) {
            Some(policy) => SizeDecision {
                size: policy.clamp_size(catalog, proposed),
                format: policy.output_format(),
                enforced: true,
                opaque: policy.enforce_no_alpha,
            },
            None => SizeDecision {
                size: proposed,
                format: OutputFormat::Png,
                enforced: false,
                opaque: false,
            },
        }
    }
}
