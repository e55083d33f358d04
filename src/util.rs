use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Rounds half up, so `2.5 -> 3` and `-2.5 -> -2`.
pub fn round_px(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

fn data_uri_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^data:image/\w+;base64,").expect("static regex"))
}

pub fn clean_base64(s: &str) -> String {
    data_uri_prefix().replace(s, "").into_owned()
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_base64(s: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(clean_base64(s).trim())
        .with_context(|| "decoding base64 payload")
}

pub fn short_hash(bytes: &[u8]) -> String {
    sha256_hex(bytes)[..12].to_string()
}

pub fn slug(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn is_opaque_color(color: &str) -> bool {
    let c = color.trim().to_ascii_lowercase();
    if c.is_empty() || c == "transparent" {
        return false;
    }
    match c.strip_prefix('#') {
        Some(hex) if hex.len() == 4 => hex.ends_with('f'),
        Some(hex) if hex.len() == 8 => hex.ends_with("ff"),
        _ => true,
    }
}

pub fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

pub fn read_input(input: &Path, reject_urls: bool) -> Result<Vec<u8>> {
    let input_str = input.display().to_string();
    if reject_urls && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }
    if !input.exists() {
        return Err(anyhow!("input does not exist: {input_str}"));
    }
    std::fs::read(input).with_context(|| format!("reading input: {input_str}"))
}

pub fn parse_f64_list(s: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("parsing number list: {s}"))
}

pub fn parse_rgb(s: &str) -> Result<[f64; 3]> {
    <[f64; 3]>::try_from(parse_f64_list(s)?)
        .map_err(|_| anyhow!("RGB sample needs 3 components: {s}"))
}
