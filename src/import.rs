//! Bulk import of certificate trees from YAML/JSON files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::{CaResult, ResultExt};
use crate::model::{Batch, Certificate};
use crate::store::CertificateStore;

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Creates every certificate described in the files under `dir`.
///
/// Files are visited recursively in path order. Each file is a stream of
/// YAML documents (JSON is accepted as YAML), one [`Batch`] per document; a
/// file's documents are created as one batch. A missing path or directory is
/// not an error. Returns everything created, in creation order.
pub async fn import_from_dir<S: CertificateStore>(
    engine: &Engine<S>,
    dir: Option<&Path>,
    cancel: &CancellationToken,
) -> CaResult<Vec<Certificate>> {
    let Some(dir) = dir.filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(Vec::new());
    };
    if !dir.exists() {
        warn!(dir = %dir.display(), "import directory does not exist, skipping");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files).with_stage(|| format!("scan {}", dir.display()))?;
    files.sort();

    let mut created = Vec::new();
    for path in files {
        let content =
            fs::read_to_string(&path).with_stage(|| format!("read file {}", path.display()))?;
        let batches =
            decode_batches(&content).with_stage(|| format!("decode file {}", path.display()))?;
        let count = batches.len();
        let certificates = engine
            .batch_create_certificate(batches, cancel)
            .await
            .with_stage(|| format!("create batch from {}", path.display()))?;
        info!(file = %path.display(), batches = count, certificates = certificates.len(), "imported");
        created.extend(certificates);
    }
    Ok(created)
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if path.is_file() {
        if has_supported_extension(path) {
            files.push(path.to_path_buf());
        }
        return Ok(());
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else if has_supported_extension(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Decodes every document of a YAML stream. Empty documents are skipped.
pub fn decode_batches(content: &str) -> CaResult<Vec<Batch>> {
    let mut batches = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        batches.push(serde_yaml::from_value(value)?);
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_supported_extension(Path::new("a/b.YAML")));
        assert!(has_supported_extension(Path::new("b.json")));
        assert!(has_supported_extension(Path::new("b.Yml")));
        assert!(!has_supported_extension(Path::new("b.txt")));
        assert!(!has_supported_extension(Path::new("yaml")));
    }

    #[test]
    fn decodes_multi_document_streams() {
        let batches = decode_batches(
            "certificate: {name: one}\n---\n---\ncertificate: {name: two}\nnested:\n  - certificate: {name: three}\n",
        )
        .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].nested[0].certificate.name, "three");
    }

    #[test]
    fn decodes_json() {
        let batches =
            decode_batches(r#"{"certificate": {"name": "root", "days": 10}, "nested": []}"#).unwrap();
        assert_eq!(batches[0].certificate.days, 10);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(decode_batches("certificate: [not, a, subject]").is_err());
    }
}
