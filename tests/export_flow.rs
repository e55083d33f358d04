use anyhow::{Result, anyhow};
use idphoto_check::{
    backend::{
        Backend, BgRemoveIn, BgRemoveOut, ComposeIn, ComposeOut, ComposePdfIn, ComposePdfOut,
        Quality, SheetType,
    },
    config::Config,
    detect::{FaceBounds, FaceDetector, HeadBox},
    export::{ExportRequest, Exporter, load_catalog},
    policy::OutputFormat,
    report::HeadBoxSource,
    sizes::{PixelSize, SizeCatalog},
    util::encode_base64,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Default)]
struct State {
    fail_ai: Cell<bool>,
    fail_first_compose: Cell<bool>,
    fail_sizes: Cell<bool>,
    bg_reqs: RefCell<Vec<BgRemoveIn>>,
    compose_reqs: RefCell<Vec<ComposeIn>>,
    pdf_reqs: RefCell<Vec<ComposePdfIn>>,
}

#[derive(Clone, Default)]
struct FakeBackend {
    state: Rc<State>,
}

impl Backend for FakeBackend {
    fn bg_remove(&self, req: &BgRemoveIn) -> Result<BgRemoveOut> {
        self.state.bg_reqs.borrow_mut().push(req.clone());
        if req.quality == Quality::Ai && self.state.fail_ai.get() {
            return Err(anyhow!("/bg-remove failed: 502 - ai_unavailable"));
        }
        let body = if req.transparent_background { "cutout" } else { "flat" };
        Ok(BgRemoveOut {
            image_base64: format!("data:image/png;base64,{}", encode_base64(body.as_bytes())),
            mode: Some(match req.quality {
                Quality::Ai => "ai-local".into(),
                Quality::Fast => "fast".into(),
            }),
            ms: Some(12),
        })
    }

    fn compose_final(&self, req: &ComposeIn) -> Result<ComposeOut> {
        let first = self.state.compose_reqs.borrow().is_empty();
        self.state.compose_reqs.borrow_mut().push(req.clone());
        if first && self.state.fail_first_compose.get() {
            return Ok(ComposeOut {
                ok: false,
                details: Some("auto-adjust failed".into()),
                ..Default::default()
            });
        }
        Ok(ComposeOut {
            ok: true,
            image_base64: Some(encode_base64(b"composed")),
            width: Some(req.width),
            height: Some(req.height),
            ..Default::default()
        })
    }

    fn compose_pdf(&self, req: &ComposePdfIn) -> Result<ComposePdfOut> {
        self.state.pdf_reqs.borrow_mut().push(req.clone());
        Ok(ComposePdfOut {
            pdf_base64: Some(encode_base64(b"%PDF-1.7")),
        })
    }

    fn fetch_sizes(&self) -> Result<SizeCatalog> {
        if self.state.fail_sizes.get() {
            return Err(anyhow!("/sizes failed: 500"));
        }
        SizeCatalog::from_json(
            r#"{"sizes": {"XX:remote": {"label": "Remote", "mm": {"w": 30, "h": 40}}}}"#,
        )
    }
}

struct FixedDetector(Vec<FaceBounds>);

impl FaceDetector for FixedDetector {
    fn detect(&self, _image_base64: &str, _target: u32) -> Result<Vec<FaceBounds>> {
        Ok(self.0.clone())
    }
}

fn exporter(backend: &FakeBackend) -> Exporter<FakeBackend> {
    let cfg = Config::default();
    Exporter::new(&cfg, SizeCatalog::builtin(), backend.clone())
}

fn dv_request(head_box: Option<HeadBox>) -> ExportRequest {
    ExportRequest {
        template_key: "US:dv-lottery".into(),
        image_base64: format!("data:image/jpeg;base64,{}", encode_base64(b"source")),
        desired: PixelSize::new(600, 600),
        head_box,
        bg_color: None,
    }
}

#[test]
fn dv_export_composes_with_auto_adjust() {
    let backend = FakeBackend::default();
    let out = exporter(&backend)
        .export_document(&dv_request(HeadBox::new(100, 500)))
        .unwrap();

    assert_eq!(out.image, b"composed");
    assert_eq!(out.format, OutputFormat::Jpeg);
    assert_eq!(out.size, PixelSize::new(600, 600));
    assert!(out.report.auto_adjust);
    assert!(!out.report.used_fallback);
    assert_eq!(out.report.head_box_source, HeadBoxSource::Caller);

    let bg = backend.state.bg_reqs.borrow();
    assert_eq!(bg.len(), 1);
    assert!(bg[0].transparent_background);
    assert_eq!(bg[0].quality, Quality::Ai);
    assert_eq!(bg[0].image_base64, encode_base64(b"source"));

    let compose = backend.state.compose_reqs.borrow();
    assert_eq!(compose.len(), 1);
    assert_eq!(compose[0].image_base64, encode_base64(b"cutout"));
    let adjust = compose[0].auto_adjust.expect("auto adjust");
    assert_eq!(adjust.head_box, HeadBox { top: 100, bottom: 500 });
    assert_eq!(adjust.rules.head_pct.min, 0.50);
    assert_eq!(adjust.rules.eyes_from_bottom_pct.max, 0.69);

    let json = serde_json::to_value(&compose[0]).unwrap();
    assert_eq!(json["templateKey"], "US:dv-lottery");
    assert_eq!(json["format"], "jpg");
    assert_eq!(json["autoAdjust"]["headBox"]["top"], 100);
    assert_eq!(json["autoAdjust"]["rules"]["head_pct"]["min"], 0.5);
}

#[test]
fn mismatched_desired_size_is_replaced_before_compose() {
    let backend = FakeBackend::default();
    let mut req = dv_request(None);
    req.desired = PixelSize::new(500, 700);
    let out = exporter(&backend).export_document(&req).unwrap();

    assert_eq!(out.size, PixelSize::new(600, 600));
    let compose = backend.state.compose_reqs.borrow();
    assert_eq!((compose[0].width, compose[0].height), (600, 600));
    assert!(compose[0].auto_adjust.is_none());
}

#[test]
fn ai_failure_falls_back_to_fast_cutout() {
    let backend = FakeBackend::default();
    backend.state.fail_ai.set(true);
    let out = exporter(&backend)
        .export_document(&dv_request(None))
        .unwrap();

    let bg = backend.state.bg_reqs.borrow();
    assert_eq!(bg.len(), 2);
    assert_eq!(bg[0].quality, Quality::Ai);
    assert_eq!(bg[1].quality, Quality::Fast);
    assert!(bg[1].transparent_background);
    assert_eq!(out.report.cutout_mode.as_deref(), Some("fast"));
}

#[test]
fn failed_compose_retries_without_auto_adjust() {
    let backend = FakeBackend::default();
    backend.state.fail_first_compose.set(true);
    let out = exporter(&backend)
        .export_document(&dv_request(HeadBox::new(120, 480)))
        .unwrap();

    let compose = backend.state.compose_reqs.borrow();
    assert_eq!(compose.len(), 2);
    assert!(compose[0].auto_adjust.is_some());
    assert!(compose[1].auto_adjust.is_none());

    assert!(out.report.used_fallback);
    assert!(!out.report.auto_adjust);
    assert_eq!(out.report.head_box_source, HeadBoxSource::Caller);
    let validation = out.report.validation.expect("local validation");
    assert_eq!(validation.meta.measured.unwrap().head_height, Some(360.0));
    assert!(out.report.warnings[0].contains("auto-adjust failed"));
}

#[test]
fn fallback_without_head_box_uses_estimate() {
    let backend = FakeBackend::default();
    backend.state.fail_first_compose.set(true);
    let out = exporter(&backend)
        .export_document(&dv_request(None))
        .unwrap();

    assert_eq!(out.report.head_box_source, HeadBoxSource::Estimated);
    assert_eq!(out.report.head_box, Some(HeadBox { top: 120, bottom: 480 }));
    assert!(out.report.validation.is_some());
}

#[test]
fn detector_supplies_head_box_when_caller_does_not() {
    let backend = FakeBackend::default();
    let detector = FixedDetector(vec![FaceBounds {
        x: 200.0,
        y: 150.0,
        width: 200.0,
        height: 200.0,
    }]);
    let out = exporter(&backend)
        .with_detector(Box::new(detector))
        .export_document(&dv_request(None))
        .unwrap();

    assert_eq!(out.report.head_box_source, HeadBoxSource::Detector);
    let compose = backend.state.compose_reqs.borrow();
    assert_eq!(
        compose[0].auto_adjust.unwrap().head_box,
        HeadBox { top: 120, bottom: 390 }
    );
}

#[test]
fn unregistered_document_is_flattened_and_passed_through() {
    let backend = FakeBackend::default();
    let out = exporter(&backend)
        .export_document(&ExportRequest {
            template_key: "UK:passport".into(),
            image_base64: encode_base64(b"source"),
            desired: PixelSize::new(413, 531),
            head_box: None,
            bg_color: Some("#2D6AE3".into()),
        })
        .unwrap();

    assert_eq!(out.image, b"flat");
    assert_eq!(out.format, OutputFormat::Png);
    assert_eq!(out.size, PixelSize::new(413, 531));
    assert!(!out.report.policy_enforced);
    assert!(backend.state.compose_reqs.borrow().is_empty());

    let bg = backend.state.bg_reqs.borrow();
    assert!(!bg[0].transparent_background);
    assert_eq!(bg[0].bg_color, "#2D6AE3");
    assert_eq!(bg[0].final_bg.as_deref(), Some("#2D6AE3"));
}

#[test]
fn sheet_export_uses_physical_size() {
    let backend = FakeBackend::default();
    let exporter = exporter(&backend);
    let out = exporter
        .export_sheet("UK:passport", &encode_base64(b"photo"), SheetType::Letter)
        .unwrap();

    assert_eq!(out.pdf, b"%PDF-1.7");
    let reqs = backend.state.pdf_reqs.borrow();
    let req = &reqs[0];
    assert_eq!(req.items.len(), 1);
    assert_eq!((req.items[0].mm_w, req.items[0].mm_h), (35.0, 45.0));
    assert_eq!(req.sheet.dpi, 300);
    assert_eq!(req.margins.mm, 5.0);

    let json = serde_json::to_value(req).unwrap();
    assert_eq!(json["sheet"]["type"], "Letter");
    assert_eq!(json["cutGuides"], true);
    assert_eq!(json["items"][0]["mmW"], 35.0);

    assert!(
        exporter
            .export_sheet("ZZ:unknown", "AAAA", SheetType::A4)
            .is_err()
    );
}

#[test]
fn remote_catalog_is_merged_or_skipped() {
    let mut cfg = Config::default();
    cfg.catalog.fetch_remote = true;

    let backend = FakeBackend::default();
    let catalog = load_catalog(&cfg, Some(&backend as &dyn Backend)).unwrap();
    assert!(catalog.get("XX:remote").is_some());
    assert!(catalog.get("US:dv-lottery").is_some());

    backend.state.fail_sizes.set(true);
    let catalog = load_catalog(&cfg, Some(&backend as &dyn Backend)).unwrap();
    assert_eq!(catalog, SizeCatalog::builtin());
}

#[test]
fn no_alpha_policy_replaces_transparent_background() {
    let backend = FakeBackend::default();
    let mut req = dv_request(None);
    req.bg_color = Some("#ffffff80".into());
    exporter(&backend).export_document(&req).unwrap();

    assert_eq!(backend.state.bg_reqs.borrow()[0].bg_color, "#ffffff");
    assert_eq!(backend.state.compose_reqs.borrow()[0].bg_color, "#ffffff");

    let backend = FakeBackend::default();
    exporter(&backend)
        .export_document(&ExportRequest {
            template_key: "UK:passport".into(),
            image_base64: encode_base64(b"source"),
            desired: PixelSize::new(413, 531),
            head_box: None,
            bg_color: Some("transparent".into()),
        })
        .unwrap();
    assert_eq!(backend.state.bg_reqs.borrow()[0].bg_color, "transparent");
}
