use idphoto_check::util::{
    clean_base64, decode_base64, encode_base64, is_opaque_color, parse_rgb, read_input, round_px, slug,
};
use std::path::Path;

#[test]
fn strips_data_uri_prefix() {
    assert_eq!(clean_base64("data:image/png;base64,AAAA"), "AAAA");
    assert_eq!(clean_base64("data:image/jpeg;base64,QUJD"), "QUJD");
    assert_eq!(clean_base64("QUJD"), "QUJD");
    assert_eq!(decode_base64("data:image/png;base64,QUJD").unwrap(), b"ABC");
    assert_eq!(encode_base64(b"ABC"), "QUJD");
}

#[test]
fn rounds_half_up() {
    assert_eq!(round_px(2.5), 3);
    assert_eq!(round_px(2.4), 2);
    assert_eq!(round_px(-2.5), -2);
}

#[test]
fn slugs_document_keys() {
    assert_eq!(slug("US:dv-lottery"), "us_dv-lottery");
    assert_eq!(slug("4x6"), "4x6");
}

#[test]
fn url_inputs_are_refused_when_configured() {
    let url = Path::new("https://example.com/photo.jpg");
    let err = read_input(url, true).unwrap_err();
    assert!(err.to_string().starts_with("URL inputs are disabled"));

    let err = read_input(url, false).unwrap_err();
    assert!(err.to_string().starts_with("input does not exist"));
}

#[test]
fn reads_local_input() {
    let path = std::env::temp_dir().join(format!("idphoto-check-input-{}.jpg", std::process::id()));
    std::fs::write(&path, b"jpeg-bytes").unwrap();
    let bytes = read_input(&path, true).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(bytes, b"jpeg-bytes");
}

#[test]
fn rgb_sample_needs_three_components() {
    assert_eq!(parse_rgb("250, 251,252").unwrap(), [250.0, 251.0, 252.0]);
    let err = parse_rgb("250,251").unwrap_err();
    assert!(err.to_string().contains("3 components"));
    assert!(parse_rgb("250,251,252,0").is_err());
    assert!(parse_rgb("white").is_err());
}

#[test]
fn detects_background_colors_with_alpha() {
    assert!(is_opaque_color("#ffffff"));
    assert!(is_opaque_color("#FFF"));
    assert!(is_opaque_color("#2d6ae3ff"));
    assert!(is_opaque_color("white"));
    assert!(!is_opaque_color("transparent"));
    assert!(!is_opaque_color(""));
    assert!(!is_opaque_color("#ffffff80"));
    assert!(!is_opaque_color("#fff0"));
}
