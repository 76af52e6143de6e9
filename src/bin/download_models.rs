use std::fs;
use std::path::{Path, PathBuf};
use sha2::{Digest, Sha256};
use reqwest::blocking::get;

#[derive(serde::Deserialize)]
struct Meta {
    url: String,
    sha256: String,
}

const KIND: &str = "trash_detection";

fn main() {
    let base = std::env::var("TRASHSCAN_MODELS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"));
    let kind_dir = base.join(KIND);
    println!("models directory: {}", kind_dir.display());
    if let Err(err) = fs::create_dir_all(&kind_dir) {
        eprintln!("cannot create {}: {err}", kind_dir.display());
        std::process::exit(1);
    }

    let mut failed = false;
    let versions = fs::read_dir(&kind_dir)
        .map(|read| read.flatten().map(|e| e.path()).filter(|p| p.is_dir()).collect::<Vec<_>>())
        .unwrap_or_default();
    if versions.is_empty() {
        println!("no versions under {}; add <version>/metadata.json first", kind_dir.display());
    }
    for dir in versions {
        if let Err(err) = fetch_version(&dir) {
            eprintln!("{}: {err}", dir.display());
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn fetch_version(dir: &Path) -> Result<(), String> {
    let meta_path = dir.join("metadata.json");
    let raw = fs::read_to_string(&meta_path).map_err(|e| format!("read {}: {e}", meta_path.display()))?;
    let meta: Meta = serde_json::from_str(&raw).map_err(|e| format!("parse {}: {e}", meta_path.display()))?;
    if meta.url.is_empty() || meta.sha256.is_empty() || meta.sha256 == "<to-fill>" {
        println!("skip: provide valid url and sha256 in {}", meta_path.display());
        return Ok(());
    }
    let model_path = dir.join("model.onnx");
    if model_path.exists() {
        println!("model exists: {}", model_path.display());
        return Ok(());
    }

    println!("downloading {} -> {}", meta.url, model_path.display());
    let resp = get(&meta.url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| format!("download: {e}"))?;
    let buf = resp.bytes().map_err(|e| format!("read body: {e}"))?;
    let hex = hex::encode(Sha256::digest(&buf));
    if !hex.eq_ignore_ascii_case(&meta.sha256) {
        return Err(format!("checksum mismatch: {} != {}", hex, meta.sha256));
    }
    fs::write(&model_path, &buf).map_err(|e| format!("write {}: {e}", model_path.display()))?;
    println!("saved {} ({} bytes)", model_path.display(), buf.len());
    Ok(())
}
