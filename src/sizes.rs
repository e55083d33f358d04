use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSize {
    pub w: u32,
    pub h: u32,
}

impl PixelSize {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn is_square(&self) -> bool {
        self.w == self.h
    }
}

impl From<[u32; 2]> for PixelSize {
    fn from(v: [u32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MmSize {
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitalTargets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<PixelSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<PixelSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<PixelSize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelTargets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital: Option<DigitalTargets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print: Option<PixelSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSizeSpec {
    pub label: String,
    pub mm: MmSize,
    #[serde(default)]
    pub px: PixelTargets,
}

impl DocumentSizeSpec {
    pub fn pixel_target(&self, name: &str) -> Option<PixelSize> {
        let digital = self.px.digital.as_ref();
        match name {
            "digital.default" => digital.and_then(|d| d.default),
            "digital.min" => digital.and_then(|d| d.min),
            "digital.max" => digital.and_then(|d| d.max),
            "print" => self.px.print,
            _ => None,
        }
    }

    pub fn pixel_targets(&self) -> Vec<(&'static str, PixelSize)> {
        PIXEL_TARGET_NAMES
            .iter()
            .filter_map(|name| self.pixel_target(name).map(|px| (*name, px)))
            .collect()
    }

    pub fn size_at_dpi(&self, dpi: u32) -> PixelSize {
        PixelSize::new(px_at_dpi(self.mm.w, dpi), px_at_dpi(self.mm.h, dpi))
    }
}

pub const PIXEL_TARGET_NAMES: [&str; 4] = ["digital.default", "digital.min", "digital.max", "print"];

pub fn px_at_dpi(mm: f64, dpi: u32) -> u32 {
    let inches = mm / 25.4;
    (inches * dpi as f64).round().max(0.0) as u32
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeCatalog {
    entries: BTreeMap<String, DocumentSizeSpec>,
}

#[derive(Debug, Deserialize)]
struct RemoteSizes {
    sizes: Option<SizeCatalog>,
}

impl SizeCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut c = Self::empty();
        c.insert(
            "US:dv-lottery",
            spec("US Green Card Lottery (DV)", 51.0, 51.0)
                .digital(600, 600, 600, 1200)
                .print(600, 600)
                .build(),
        );
        c.insert(
            "US:passport",
            spec("US Passport / Visa", 51.0, 51.0)
                .digital(600, 600, 600, 1200)
                .print(600, 600)
                .build(),
        );
        c.insert(
            "UK:passport",
            spec("UK Passport", 35.0, 45.0).print(413, 531).build(),
        );
        c.insert(
            "EU:schengen-visa",
            spec("Schengen Visa", 35.0, 45.0).print(413, 531).build(),
        );
        c.insert(
            "CA:passport",
            spec("Canada Passport", 50.0, 70.0).print(591, 827).build(),
        );
        c.insert("IN:passport", spec("India Passport", 51.0, 51.0).print(600, 600).build());
        c
    }

    pub fn insert(&mut self, key: impl Into<String>, spec: DocumentSizeSpec) {
        self.entries.insert(key.into(), spec);
    }

    pub fn get(&self, key: &str) -> Option<&DocumentSizeSpec> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, other: SizeCatalog) {
        self.entries.extend(other.entries);
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading size catalog: {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Self::from_json(&raw),
            Some("toml") => toml::from_str(&raw).with_context(|| "parsing catalog TOML"),
            _ => Err(anyhow!(
                "unsupported catalog format (want .json or .toml): {}",
                path.display()
            )),
        }
    }

    /// Accepts either a bare catalog object or the `{"sizes": {...}}` envelope.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).with_context(|| "parsing catalog JSON")?;
        if value.get("sizes").is_some() {
            let remote: RemoteSizes =
                serde_json::from_value(value).with_context(|| "decoding sizes envelope")?;
            return Ok(remote.sizes.unwrap_or_default());
        }
        serde_json::from_value(value).with_context(|| "decoding catalog")
    }

    pub fn check_square(&self, key: &str) -> Vec<String> {
        let Some(spec) = self.get(key) else {
            return Vec::new();
        };
        spec.pixel_targets()
            .into_iter()
            .filter(|(_, px)| !px.is_square())
            .map(|(name, px)| format!("{key} {name} is {}x{}", px.w, px.h))
            .collect()
    }
}

struct SpecBuilder(DocumentSizeSpec);

fn spec(label: &str, mm_w: f64, mm_h: f64) -> SpecBuilder {
    SpecBuilder(DocumentSizeSpec {
        label: label.into(),
        mm: MmSize { w: mm_w, h: mm_h },
        px: PixelTargets::default(),
    })
}

impl SpecBuilder {
    fn digital(mut self, w: u32, h: u32, min: u32, max: u32) -> Self {
        self.0.px.digital = Some(DigitalTargets {
            default: Some(PixelSize::new(w, h)),
            min: Some(PixelSize::new(min, min)),
            max: Some(PixelSize::new(max, max)),
        });
        self
    }

    fn print(mut self, w: u32, h: u32) -> Self {
        self.0.px.print = Some(PixelSize::new(w, h));
        self
    }

    fn build(self) -> DocumentSizeSpec {
        self.0
    }
}

