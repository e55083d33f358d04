use crate::{
    backend::{Backend, SheetType, http::HttpBackend},
    config::Config,
    detect::{FaceBounds, HeadBox, head_box_from_faces},
    export::{ExportRequest, Exporter, load_catalog},
    policy::PolicyRegistry,
    sizes::{PixelSize, SizeCatalog},
    util::{encode_base64, ensure_dir, parse_rgb, read_input, short_hash, slug},
    validate::{ValidationInput, estimate_eye_y, validate},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "idphoto-check")]
#[command(about = "ID/passport photo sizing policy, compliance checks and export")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./idphoto-check.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the size catalog.
    Sizes {},
    /// Apply the output policy for a document type to a proposed size.
    Clamp {
        #[arg(long)]
        key: String,
        #[arg(long, default_value_t = 0)]
        width: u32,
        #[arg(long, default_value_t = 0)]
        height: u32,
    },
    /// Check final-image geometry against the compliance rules.
    Validate {
        #[arg(long)]
        width: f64,
        #[arg(long)]
        height: f64,
        #[arg(long)]
        head_top: Option<f64>,
        #[arg(long)]
        head_bottom: Option<f64>,
        #[arg(long)]
        eye_line: Option<f64>,
        /// Estimate the eye line from the head box when --eye-line is absent.
        #[arg(long)]
        estimate_eyes: bool,
        /// Background sample as "r,g,b".
        #[arg(long)]
        bg: Option<String>,
    },
    EstimateEye {
        #[arg(long)]
        head_top: f64,
        #[arg(long)]
        head_bottom: f64,
    },
    /// Derive a head box from face bounds given as "x,y,w,h".
    HeadBox {
        #[arg(long = "face")]
        faces: Vec<String>,
        #[arg(long, default_value_t = 600)]
        target: u32,
    },
    Export {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value_t = 0)]
        width: u32,
        #[arg(long, default_value_t = 0)]
        height: u32,
        #[arg(long)]
        head_top: Option<i64>,
        #[arg(long)]
        head_bottom: Option<i64>,
        #[arg(long)]
        bg_color: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    Sheet {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        key: Option<String>,
        /// A4, Letter or 4x6.
        #[arg(long, default_value = "A4")]
        sheet: String,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => match Config::load(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                // no subscriber yet; log the failure with default settings
                let _guard = init_logging(&args, &Config::default())?;
                return Err(err);
            }
        },
        None => Config::default(),
    };
    let _guard = init_logging(&args, &cfg)?;

    match &args.cmd {
        Command::Sizes {} => sizes(&cfg),
        Command::Clamp { key, width, height } => clamp(&cfg, key, PixelSize::new(*width, *height)),
        Command::Validate {
            width,
            height,
            head_top,
            head_bottom,
            eye_line,
            estimate_eyes,
            bg,
        } => {
            let mut eye_line_y = *eye_line;
            if eye_line_y.is_none()
                && *estimate_eyes
                && let (Some(top), Some(bottom)) = (head_top, head_bottom)
            {
                eye_line_y = estimate_eye_y(&cfg.validation, *top, *bottom);
            }
            let input = ValidationInput {
                final_width: *width,
                final_height: *height,
                head_top: *head_top,
                head_bottom: *head_bottom,
                eye_line_y,
                sampled_bg_rgb: bg.as_deref().map(parse_rgb).transpose()?,
            };
            print_json(&validate(&cfg.validation, &input))
        }
        Command::EstimateEye {
            head_top,
            head_bottom,
        } => print_json(&serde_json::json!({
            "eye_line_y": estimate_eye_y(&cfg.validation, *head_top, *head_bottom),
        })),
        Command::HeadBox { faces, target } => {
            let faces = faces
                .iter()
                .map(|f| f.parse::<FaceBounds>())
                .collect::<Result<Vec<_>>>()?;
            print_json(&serde_json::json!({
                "target": target,
                "head_box": head_box_from_faces(&cfg.detection, &faces, *target),
            }))
        }
        Command::Export {
            input,
            key,
            width,
            height,
            head_top,
            head_bottom,
            bg_color,
            out_dir,
        } => {
            let head_box = match (head_top, head_bottom) {
                (Some(top), Some(bottom)) => Some(
                    HeadBox::new(*top, *bottom)
                        .ok_or_else(|| anyhow!("--head-bottom must be greater than --head-top"))?,
                ),
                (None, None) => None,
                _ => return Err(anyhow!("--head-top and --head-bottom go together")),
            };
            let key = key.clone().unwrap_or_else(|| cfg.global.default_template.clone());
            export(
                &cfg,
                input,
                ExportArgs {
                    key,
                    desired: PixelSize::new(*width, *height),
                    head_box,
                    bg_color: bg_color.clone(),
                },
                out_dir.as_deref(),
            )
        }
        Command::Sheet {
            input,
            key,
            sheet,
            out_dir,
        } => {
            let key = key.clone().unwrap_or_else(|| cfg.global.default_template.clone());
            let sheet: SheetType = sheet.parse()?;
            export_sheet(&cfg, input, &key, sheet, out_dir.as_deref())
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["idphoto-check.toml", "idphoto-check.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output, so logs go to stderr.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = match resolve_log_path(cfg) {
        Some(path) => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            ensure_dir(parent)?;
            let file = std::fs::File::create(&path)
                .with_context(|| format!("create log file: {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.out_dir).join("idphoto-check.log"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn sizes(cfg: &Config) -> Result<()> {
    let backend = HttpBackend::new(cfg)?;
    let catalog = load_catalog(cfg, Some(&backend as &dyn Backend))?;
    print_json(&catalog)
}

fn clamp(cfg: &Config, key: &str, candidate: PixelSize) -> Result<()> {
    let catalog = load_catalog(cfg, None)?;
    let registry = PolicyRegistry::from_config(cfg);
    let decision = registry.final_size(&catalog, key, candidate);
    let bounds = registry.get(key).map(|p| {
        serde_json::json!({
            "default": p.default_size(&catalog),
            "min": p.min_size(&catalog),
            "max": p.max_size(&catalog),
            "enforce_square": p.enforce_square,
            "enforce_jpeg": p.enforce_jpeg,
            "enforce_no_alpha": p.enforce_no_alpha,
        })
    });
    print_json(&serde_json::json!({
        "key": key,
        "candidate": candidate,
        "decision": decision,
        "policy": bounds,
    }))
}

struct ExportArgs {
    key: String,
    desired: PixelSize,
    head_box: Option<HeadBox>,
    bg_color: Option<String>,
}

fn output_dir(cfg: &Config, out_override: Option<&Path>) -> Result<PathBuf> {
    let dir = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    ensure_dir(&dir)?;
    Ok(dir)
}

fn exporter(cfg: &Config) -> Result<Exporter<HttpBackend>> {
    let backend = HttpBackend::new(cfg)?;
    let catalog: SizeCatalog = load_catalog(cfg, Some(&backend as &dyn Backend))?;
    Ok(Exporter::new(cfg, catalog, backend))
}

fn export(cfg: &Config, input: &Path, args: ExportArgs, out_override: Option<&Path>) -> Result<()> {
    let bytes = read_input(input, cfg.security.reject_url_inputs)?;
    let hash = short_hash(&bytes);
    let exporter = exporter(cfg)?;

    let out = exporter.export_document(&ExportRequest {
        template_key: args.key.clone(),
        image_base64: encode_base64(&bytes),
        desired: args.desired,
        head_box: args.head_box,
        bg_color: args.bg_color,
    })?;

    let dir = output_dir(cfg, out_override)?;
    let stem = format!(
        "{}_{}x{}_{}",
        slug(&args.key),
        out.size.w,
        out.size.h,
        hash
    );
    let image_path = dir.join(format!("{stem}.{}", out.format.as_str()));
    std::fs::write(&image_path, &out.image)
        .with_context(|| format!("writing {}", image_path.display()))?;
    info!("wrote {} ({} bytes)", image_path.display(), out.image.len());

    let report_path = dir.join(format!("{stem}.report.json"));
    if cfg.export.write_report_json {
        std::fs::write(&report_path, serde_json::to_string_pretty(&out.report)?)?;
        debug!("wrote {}", report_path.display());
    }

    if cfg.global.print_summary {
        print_json(&serde_json::json!({
            "output": image_path,
            "mime": out.format.mime(),
            "report": cfg.export.write_report_json.then_some(&report_path),
            "size": out.size,
            "used_fallback": out.report.used_fallback,
            "status": "ok",
        }))?;
    }
    Ok(())
}

fn export_sheet(
    cfg: &Config,
    input: &Path,
    key: &str,
    sheet: SheetType,
    out_override: Option<&Path>,
) -> Result<()> {
    let bytes = read_input(input, cfg.security.reject_url_inputs)?;
    let hash = short_hash(&bytes);
    let exporter = exporter(cfg)?;

    let out = exporter.export_sheet(key, &encode_base64(&bytes), sheet)?;

    let dir = output_dir(cfg, out_override)?;
    let path = dir.join(format!(
        "{}_sheet_{}_{}.pdf",
        slug(key),
        slug(sheet.as_str()),
        hash
    ));
    std::fs::write(&path, &out.pdf).with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {} ({} bytes)", path.display(), out.pdf.len());

    if cfg.global.print_summary {
        print_json(&serde_json::json!({
            "output": path,
            "mime": "application/pdf",
            "sheet": out.report,
            "status": "ok",
        }))?;
    }
    Ok(())
}
