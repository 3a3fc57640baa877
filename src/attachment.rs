//! Staging local files as message attachments.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::consultation::Attachment;

/// Per-file notice when a selected file is not an image or PDF.
pub const UNSUPPORTED_FILE_NOTICE: &str = "이미지 또는 PDF 파일만 업로드할 수 있습니다.";

/// Outcome for one staged file. A rejected file never blocks the rest of the
/// batch.
#[derive(Debug)]
pub enum StagedFile {
    Accepted(Attachment),
    Rejected { name: String, reason: String },
}

/// Reads the given files into attachments, in selection order.
///
/// Reads run concurrently but assembly is index-stable: the result order
/// matches `paths`, not completion order.
pub async fn stage_files(paths: &[PathBuf]) -> Vec<StagedFile> {
    let reads = paths.iter().map(|path| stage_file(path));
    futures::future::join_all(reads).await
}

async fn stage_file(path: &Path) -> StagedFile {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    if !is_supported(&mime_type) {
        return StagedFile::Rejected {
            name,
            reason: UNSUPPORTED_FILE_NOTICE.to_string(),
        };
    }

    match tokio::fs::read(path).await {
        Ok(bytes) => StagedFile::Accepted(Attachment {
            name,
            data: encode_data_url(&mime_type, &bytes),
            mime_type,
        }),
        Err(err) => StagedFile::Rejected {
            name,
            reason: format!("파일을 읽을 수 없습니다: {err}"),
        },
    }
}

fn is_supported(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type == "application/pdf"
}

/// Self-describing inline form: `data:<mime>;base64,<payload>`.
pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}
