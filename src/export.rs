use crate::{
    backend::{
        AutoAdjust, AutoAdjustRules, Backend, BgRemoveIn, BgRemoveOut, ComposeIn, ComposeOut, ComposePdfIn,
        Margins, Quality, Sheet, SheetItem, SheetType,
    },
    config::Config,
    detect::{FaceDetector, HeadBox, estimated_head_box, head_box_from_faces},
    policy::{OutputFormat, PolicyRegistry, SizeDecision},
    report::{ExportReport, HeadBoxSource, SheetReport},
    sizes::{PixelSize, SizeCatalog},
    util::{clean_base64, decode_base64, is_opaque_color, now_rfc3339},
    validate::{ValidationInput, estimate_eye_y, validate},
};
use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

const OPAQUE_FALLBACK_BG: &str = "#ffffff";

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub template_key: String,
    pub image_base64: String,
    // zero means no preference
    pub desired: PixelSize,
    pub head_box: Option<HeadBox>,
    pub bg_color: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Cutout {
    pub image_base64: String,
    pub decision: SizeDecision,
    pub bg_color: String,
    pub mode: Option<String>,
    pub ms: Option<u64>,
}

pub struct ExportOutput {
    pub image: Vec<u8>,
    pub format: OutputFormat,
    pub size: PixelSize,
    pub report: ExportReport,
}

pub struct SheetOutput {
    pub pdf: Vec<u8>,
    pub report: SheetReport,
}

pub struct Exporter<B: Backend> {
    cfg: Config,
    catalog: SizeCatalog,
    registry: PolicyRegistry,
    backend: B,
    detector: Option<Box<dyn FaceDetector>>,
}

impl<B: Backend> Exporter<B> {
    pub fn new(cfg: &Config, catalog: SizeCatalog, backend: B) -> Self {
        Self {
            cfg: cfg.clone(),
            catalog,
            registry: PolicyRegistry::from_config(cfg),
            backend,
            detector: None,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    fn first_quality(&self) -> Quality {
        if self.cfg.backend.force_fast {
            Quality::Fast
        } else {
            Quality::Ai
        }
    }

    fn remove_background(&self, mut req: BgRemoveIn) -> Result<BgRemoveOut> {
        match self.backend.bg_remove(&req) {
            Ok(out) => Ok(out),
            Err(err) if req.quality == Quality::Ai => {
                warn!("AI background removal failed; retrying fast path: {err:#}");
                req.quality = Quality::Fast;
                req.final_bg = None;
                self.backend
                    .bg_remove(&req)
                    .with_context(|| "fast background removal failed")
            }
            Err(err) => Err(err.context("background removal failed")),
        }
    }

    pub fn cutout(&self, req: &ExportRequest) -> Result<Cutout> {
        let decision = self
            .registry
            .final_size(&self.catalog, &req.template_key, req.desired);
        let bg_color = self.bg_color(req, &decision);
        debug!(
            "size decision key={} size={}x{} format={} enforced={}",
            req.template_key,
            decision.size.w,
            decision.size.h,
            decision.format.as_str(),
            decision.enforced
        );

        let out = self.remove_background(BgRemoveIn {
            image_base64: clean_base64(&req.image_base64),
            format: "png".into(),
            quality: self.first_quality(),
            bg_color: bg_color.clone(),
            transparent_background: true,
            final_bg: None,
        })?;

        Ok(Cutout {
            image_base64: clean_base64(&out.image_base64),
            decision,
            bg_color,
            mode: out.mode,
            ms: out.ms,
        })
    }

    fn bg_color(&self, req: &ExportRequest, decision: &SizeDecision) -> String {
        let color = req
            .bg_color
            .clone()
            .unwrap_or_else(|| self.cfg.export.bg_color.clone());
        if !decision.opaque || is_opaque_color(&color) {
            return color;
        }
        let fallback = if is_opaque_color(&self.cfg.export.bg_color) {
            self.cfg.export.bg_color.clone()
        } else {
            OPAQUE_FALLBACK_BG.to_string()
        };
        warn!(
            "{} requires an opaque background; replacing {color:?} with {fallback}",
            req.template_key
        );
        fallback
    }

    fn resolve_head_box(
        &self,
        req: &ExportRequest,
        image_base64: &str,
        target: u32,
    ) -> (Option<HeadBox>, HeadBoxSource) {
        if let Some(hb) = req.head_box {
            return (Some(hb), HeadBoxSource::Caller);
        }
        let Some(detector) = self.detector.as_ref() else {
            return (None, HeadBoxSource::None);
        };
        match detector.detect(image_base64, target) {
            Ok(faces) => match head_box_from_faces(&self.cfg.detection, &faces, target) {
                Some(hb) => (Some(hb), HeadBoxSource::Detector),
                None => {
                    debug!("no usable face among {} detections", faces.len());
                    (None, HeadBoxSource::None)
                }
            },
            Err(err) => {
                warn!("face detection failed: {err:#}");
                (None, HeadBoxSource::None)
            }
        }
    }

    pub fn export_document(&self, req: &ExportRequest) -> Result<ExportOutput> {
        let started = now_rfc3339();
        let decision = self
            .registry
            .final_size(&self.catalog, &req.template_key, req.desired);

        if !decision.enforced {
            return self.export_flattened(req, decision, started);
        }

        let cut = self.cutout(req)?;
        let size = cut.decision.size;
        let mut warnings = Vec::new();

        let (head_box, mut head_source) = self.resolve_head_box(req, &cut.image_base64, size.h);
        let rules = AutoAdjustRules::from_validation(&self.cfg.validation);

        let mut compose = ComposeIn {
            template_key: req.template_key.clone(),
            image_base64: cut.image_base64.clone(),
            width: size.w,
            height: size.h,
            bg_color: cut.bg_color.clone(),
            format: cut.decision.format,
            auto_adjust: head_box.map(|hb| AutoAdjust {
                head_box: hb,
                rules,
            }),
        };
        info!(
            "compose key={} size={}x{} auto_adjust={}",
            req.template_key,
            size.w,
            size.h,
            compose.auto_adjust.is_some()
        );

        let mut used_fallback = false;
        let mut validation = None;
        let mut final_head = head_box;

        let out = match self.compose(&compose) {
            Ok(out) => out,
            Err(err) => {
                warn!("compose failed; retrying without auto-adjust: {err:#}");
                warnings.push(format!("compose failed: {err:#}"));
                used_fallback = true;

                let hb = match head_box {
                    Some(hb) => hb,
                    None => {
                        head_source = HeadBoxSource::Estimated;
                        estimated_head_box(&self.cfg.detection, size.h)
                    }
                };
                final_head = Some(hb);

                let rules = &self.cfg.validation;
                let eye = estimate_eye_y(rules, hb.top as f64, hb.bottom as f64);
                let result = validate(
                    rules,
                    &ValidationInput {
                        final_width: size.w as f64,
                        final_height: size.h as f64,
                        head_top: Some(hb.top as f64),
                        head_bottom: Some(hb.bottom as f64),
                        eye_line_y: eye,
                        sampled_bg_rgb: None,
                    },
                );
                if !result.valid {
                    warn!("local compliance check failed; proceeding with fallback compose");
                    warnings.extend(result.errors.iter().cloned());
                }
                validation = Some(result);

                compose.auto_adjust = None;
                self.compose(&compose)
                    .with_context(|| "compose failed in fallback")?
            }
        };

        let image = out
            .image_base64
            .as_deref()
            .ok_or_else(|| anyhow!("compose returned no image"))
            .and_then(decode_base64)?;
        let out_size = PixelSize::new(out.width.unwrap_or(size.w), out.height.unwrap_or(size.h));

        Ok(ExportOutput {
            image,
            format: cut.decision.format,
            size: out_size,
            report: ExportReport {
                template_key: req.template_key.clone(),
                started,
                finished: now_rfc3339(),
                size: out_size,
                format: cut.decision.format,
                policy_enforced: true,
                cutout_mode: cut.mode,
                cutout_ms: cut.ms,
                head_box: final_head,
                head_box_source: head_source,
                auto_adjust: !used_fallback && head_box.is_some(),
                used_fallback,
                validation,
                warnings,
            },
        })
    }

    fn compose(&self, req: &ComposeIn) -> Result<ComposeOut> {
        let out = self.backend.compose_final(req)?;
        if !out.ok {
            return Err(anyhow!("compose not ok: {}", out.failure_reason()));
        }
        Ok(out)
    }

    // no policy: the backend flattens onto the background and the size passes through
    fn export_flattened(
        &self,
        req: &ExportRequest,
        decision: SizeDecision,
        started: String,
    ) -> Result<ExportOutput> {
        let bg_color = self.bg_color(req, &decision);
        let quality = self.first_quality();
        let out = self.remove_background(BgRemoveIn {
            image_base64: clean_base64(&req.image_base64),
            format: "png".into(),
            quality,
            bg_color: bg_color.clone(),
            transparent_background: false,
            final_bg: (quality == Quality::Ai).then(|| bg_color.clone()),
        })?;
        let image = decode_base64(&out.image_base64)?;
        info!(
            "flattened key={} bytes={} mode={:?}",
            req.template_key,
            image.len(),
            out.mode
        );

        Ok(ExportOutput {
            image,
            format: decision.format,
            size: decision.size,
            report: ExportReport {
                template_key: req.template_key.clone(),
                started,
                finished: now_rfc3339(),
                size: decision.size,
                format: decision.format,
                policy_enforced: false,
                cutout_mode: out.mode,
                cutout_ms: out.ms,
                head_box: req.head_box,
                head_box_source: if req.head_box.is_some() {
                    HeadBoxSource::Caller
                } else {
                    HeadBoxSource::None
                },
                auto_adjust: false,
                used_fallback: false,
                validation: None,
                warnings: Vec::new(),
            },
        })
    }

    pub fn export_sheet(
        &self,
        template_key: &str,
        image_base64: &str,
        sheet: SheetType,
    ) -> Result<SheetOutput> {
        let spec = self
            .catalog
            .get(template_key)
            .ok_or_else(|| anyhow!("unknown document type: {template_key}"))?;

        let sheet = Sheet {
            kind: sheet,
            dpi: self.cfg.export.dpi,
        };
        let req = ComposePdfIn {
            items: vec![SheetItem {
                image_base64: clean_base64(image_base64),
                px_w: 0,
                px_h: 0,
                mm_w: spec.mm.w,
                mm_h: spec.mm.h,
            }],
            sheet,
            margins: Margins {
                mm: self.cfg.export.margins_mm,
            },
            cut_guides: self.cfg.export.cut_guides,
            fill: self.cfg.export.fill,
        };
        info!(
            "compose-pdf key={} sheet={} dpi={} mm={}x{}",
            template_key,
            sheet.kind.as_str(),
            sheet.dpi,
            spec.mm.w,
            spec.mm.h
        );

        let out = self.backend.compose_pdf(&req)?;
        let pdf = out
            .pdf_base64
            .as_deref()
            .ok_or_else(|| anyhow!("compose-pdf failed"))
            .and_then(decode_base64)?;

        Ok(SheetOutput {
            report: SheetReport {
                template_key: template_key.to_string(),
                sheet,
                mm: spec.mm,
                margins_mm: self.cfg.export.margins_mm,
                pdf_bytes: pdf.len(),
            },
            pdf,
        })
    }
}

// builtin, then the configured file, then remote /sizes; a remote failure keeps the local table
pub fn load_catalog(cfg: &Config, backend: Option<&dyn Backend>) -> Result<SizeCatalog> {
    let mut catalog = SizeCatalog::builtin();

    if !cfg.catalog.path.is_empty() {
        let extra = SizeCatalog::load(std::path::Path::new(&cfg.catalog.path))?;
        debug!("loaded {} catalog entries from {}", extra.len(), cfg.catalog.path);
        catalog.merge(extra);
    }

    if cfg.catalog.fetch_remote
        && let Some(backend) = backend
    {
        match backend.fetch_sizes() {
            Ok(remote) if !remote.is_empty() => {
                info!("merged {} remote catalog entries", remote.len());
                catalog.merge(remote);
            }
            Ok(_) => warn!("remote size catalog was empty; keeping local"),
            Err(err) => warn!("fetching remote size catalog failed; keeping local: {err:#}"),
        }
    }

    for entry in cfg.policies.iter().filter(|p| p.enforce_square) {
        for problem in catalog.check_square(&entry.key) {
            warn!("square policy with non-square target: {problem}");
        }
    }

    Ok(catalog)
}
