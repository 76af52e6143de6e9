use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;
use crate::estimate::ItemCountBasis;

pub const DEFAULT_SCALES: [f64; 3] = [1.0, 0.8, 1.2];

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub models_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub public_url: String,
    pub scales: Vec<f64>,
    pub font_path: Option<PathBuf>,
    pub jpeg_quality: u8,
    pub max_upload_bytes: usize,
    pub people_count_basis: ItemCountBasis,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            models_dir: PathBuf::from("models"),
            upload_dir: PathBuf::from("uploads"),
            public_url: "http://localhost:3000".to_string(),
            scales: DEFAULT_SCALES.to_vec(),
            font_path: None,
            jpeg_quality: 95,
            max_upload_bytes: 20 * 1024 * 1024,
            people_count_basis: ItemCountBasis::MultiScale,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        let ip: IpAddr = parse_or(&lookup, "TRASHSCAN_ADDR", cfg.addr.ip())?;
        let port: u16 = parse_or(&lookup, "PORT", cfg.addr.port())?;
        cfg.addr = SocketAddr::new(ip, port);
        cfg.public_url = format!("http://localhost:{port}");

        if let Some(dir) = lookup("TRASHSCAN_MODELS_DIR") { cfg.models_dir = dir.into(); }
        if let Some(dir) = lookup("TRASHSCAN_UPLOAD_DIR") { cfg.upload_dir = dir.into(); }
        if let Some(url) = lookup("TRASHSCAN_PUBLIC_URL") {
            cfg.public_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("TRASHSCAN_SCALES") { cfg.scales = parse_scales(&raw)?; }
        cfg.font_path = lookup("TRASHSCAN_FONT").map(PathBuf::from);
        cfg.jpeg_quality = parse_or(&lookup, "TRASHSCAN_JPEG_QUALITY", cfg.jpeg_quality)?.clamp(1, 100);
        cfg.max_upload_bytes = parse_or(&lookup, "TRASHSCAN_MAX_UPLOAD_BYTES", cfg.max_upload_bytes)?;
        cfg.people_count_basis = parse_or(&lookup, "TRASHSCAN_PEOPLE_COUNT_BASIS", cfg.people_count_basis)?;
        Ok(cfg)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Parses a comma separated scale list. The identity scale always runs
/// first, so it is prepended when the list omits it.
pub fn parse_scales(raw: &str) -> Result<Vec<f64>, ConfigError> {
    let mut scales = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let scale: f64 = part.parse().map_err(|_| ConfigError::Invalid {
            key: "TRASHSCAN_SCALES",
            value: raw.to_string(),
        })?;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::BadScale(scale));
        }
        scales.push(scale);
    }
    if !scales.contains(&1.0) {
        scales.insert(0, 1.0);
    }
    Ok(scales)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.addr.port(), 3000);
        assert_eq!(cfg.scales, vec![1.0, 0.8, 1.2]);
        assert_eq!(cfg.jpeg_quality, 95);
        assert_eq!(cfg.people_count_basis, ItemCountBasis::MultiScale);
    }

    #[test]
    fn reads_overrides() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("TRASHSCAN_SCALES", "1.0, 0.5"),
            ("TRASHSCAN_PUBLIC_URL", "https://cdn.example.org/"),
            ("TRASHSCAN_PEOPLE_COUNT_BASIS", "reconciled"),
        ]))
        .unwrap();
        assert_eq!(cfg.addr.port(), 8080);
        assert_eq!(cfg.scales, vec![1.0, 0.5]);
        assert_eq!(cfg.public_url, "https://cdn.example.org");
        assert_eq!(cfg.people_count_basis, ItemCountBasis::Reconciled);
    }

    #[test]
    fn identity_scale_is_inserted() {
        assert_eq!(parse_scales("0.8,1.2").unwrap(), vec![1.0, 0.8, 1.2]);
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert_eq!(parse_scales("1.0,0"), Err(ConfigError::BadScale(0.0)));
        assert!(parse_scales("1.0,-2").is_err());
    }

    #[test]
    fn rejects_garbage_port() {
        let err = AppConfig::from_lookup(lookup_from(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }
}
