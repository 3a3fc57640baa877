//! Splitting model output into prose and document-draft segments, plus the
//! export artifact for drafted documents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Fence the model wraps drafted documents in. The system prompt instructs the
/// model to emit exactly this token, so it must not change.
pub const DOC_FENCE_OPEN: &str = "```legal-document";

/// Fixed name of the exported draft file.
pub const EXPORT_FILENAME: &str = "법률문서_초안.html";

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```legal-document([\s\S]*?)```").expect("fence regex"));

/// One renderable piece of a model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Prose(String),
    /// A drafted document. `closed` is false while the fence is still open,
    /// i.e. the draft is mid-stream and rendered as provisional.
    Document { text: String, closed: bool },
}

/// Splits `text` into alternating prose and document segments.
///
/// Whitespace-only prose produces nothing; document segments are emitted even
/// when empty, since a draft may still be streaming in. An opening fence with
/// no close yields a trailing provisional document segment. Pure and
/// idempotent.
pub fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for captures in FENCE_RE.captures_iter(text) {
        let fenced = captures.get(0).expect("whole match");
        push_prose(&mut segments, &text[cursor..fenced.start()]);
        let body = captures.get(1).expect("fence body").as_str();
        segments.push(Segment::Document {
            text: body.trim().to_string(),
            closed: true,
        });
        cursor = fenced.end();
    }

    let tail = &text[cursor..];
    match tail.find(DOC_FENCE_OPEN) {
        Some(open) => {
            push_prose(&mut segments, &tail[..open]);
            let body = &tail[open + DOC_FENCE_OPEN.len()..];
            segments.push(Segment::Document {
                text: body.trim().to_string(),
                closed: false,
            });
        }
        None => push_prose(&mut segments, tail),
    }
    segments
}

fn push_prose(segments: &mut Vec<Segment>, text: &str) {
    if !text.trim().is_empty() {
        segments.push(Segment::Prose(text.to_string()));
    }
}

/// Document segments of a whole conversation in display order, for the
/// `/copy <n>` and `/save <n>` commands.
pub fn collect_documents<'a>(model_contents: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut documents = Vec::new();
    for content in model_contents {
        for segment in split_segments(content) {
            if let Segment::Document { text, .. } = segment {
                documents.push(text);
            }
        }
    }
    documents
}

/// Renders a document draft as a standalone HTML file.
///
/// The output is a compatibility contract with word processors: UTF-8 BOM,
/// charset meta, serif style block, centered header, the trimmed draft inside
/// a whitespace-preserving `<pre>`, and a fixed disclaimer footer. Do not
/// reformat.
pub fn export_html(content: &str) -> Vec<u8> {
    let html = format!(
        r#"
<!DOCTYPE html>
<html lang="ko">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>법률 문서 초안</title>
    <style>
        @import url('https://fonts.googleapis.com/css2?family=Nanum+Myeongjo:wght@400;700&display=swap');
        body {{
            font-family: 'Nanum Myeongjo', serif;
            line-height: 1.8;
            padding: 40px;
            max-width: 210mm; /* A4 size width */
            margin: 0 auto;
            background-color: #fff;
            color: #000;
        }}
        pre {{
            white-space: pre-wrap;
            font-family: inherit;
            font-size: 11pt;
            border: none;
            background: none;
        }}
        .header {{
            text-align: center;
            border-bottom: 2px solid #333;
            margin-bottom: 30px;
            padding-bottom: 10px;
        }}
        .footer {{
            margin-top: 50px;
            text-align: center;
            font-size: 10px;
            color: #666;
            border-top: 1px solid #ddd;
            padding-top: 10px;
        }}
    </style>
</head>
<body>
    <div class="header">
        <h1>법률 문서 초안</h1>
    </div>
    <pre>{}</pre>
    <div class="footer">
        본 문서는 AI 법률 비서에 의해 자동 생성된 초안입니다. 실제 제출 시에는 법률 전문가의 검토가 필요합니다.
    </div>
</body>
</html>"#,
        content.trim()
    );

    // BOM first so Windows word processors pick up the encoding.
    let mut bytes = Vec::with_capacity(html.len() + 3);
    bytes.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
    bytes.extend_from_slice(html.as_bytes());
    bytes
}

/// Writes the exported draft under `dir` and returns the full path.
pub fn save_document(dir: &Path, content: &str) -> Result<PathBuf> {
    let path = dir.join(EXPORT_FILENAME);
    fs::write(&path, export_html(content))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_fences_is_one_prose_segment() {
        let segments = split_segments("일반적인 상담 답변입니다.");
        assert_eq!(
            segments,
            vec![Segment::Prose("일반적인 상담 답변입니다.".to_string())]
        );
    }

    #[test]
    fn fenced_document_splits_into_three_segments() {
        let segments = split_segments("A```legal-document\nB\n```C");
        assert_eq!(
            segments,
            vec![
                Segment::Prose("A".to_string()),
                Segment::Document {
                    text: "B".to_string(),
                    closed: true,
                },
                Segment::Prose("C".to_string()),
            ]
        );
    }

    #[test]
    fn splitting_is_idempotent() {
        let text = "인사말```legal-document\n고 소 장\n```마무리";
        assert_eq!(split_segments(text), split_segments(text));
    }

    #[test]
    fn whitespace_only_prose_is_suppressed() {
        let segments = split_segments("```legal-document\n내용\n```\n  \n");
        assert_eq!(
            segments,
            vec![Segment::Document {
                text: "내용".to_string(),
                closed: true,
            }]
        );
    }

    #[test]
    fn empty_document_segment_is_still_emitted() {
        let segments = split_segments("답변```legal-document``` 끝");
        assert_eq!(
            segments,
            vec![
                Segment::Prose("답변".to_string()),
                Segment::Document {
                    text: String::new(),
                    closed: true,
                },
                Segment::Prose(" 끝".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_fence_becomes_a_provisional_document() {
        let segments = split_segments("초안을 작성합니다.```legal-document\n고 소 장\n원고:");
        assert_eq!(
            segments,
            vec![
                Segment::Prose("초안을 작성합니다.".to_string()),
                Segment::Document {
                    text: "고 소 장\n원고:".to_string(),
                    closed: false,
                },
            ]
        );
    }

    #[test]
    fn provisional_document_reclassifies_once_the_fence_closes() {
        let streaming = "```legal-document\n내용증명";
        let finished = "```legal-document\n내용증명\n```";
        assert_eq!(
            split_segments(streaming),
            vec![Segment::Document {
                text: "내용증명".to_string(),
                closed: false,
            }]
        );
        assert_eq!(
            split_segments(finished),
            vec![Segment::Document {
                text: "내용증명".to_string(),
                closed: true,
            }]
        );
    }

    #[test]
    fn collect_documents_keeps_display_order() {
        let first = "안내```legal-document\n첫 번째\n```";
        let second = "```legal-document\n두 번째\n```추가 설명```legal-document\n세 번째\n```";
        let documents = collect_documents([first, second].into_iter());
        assert_eq!(documents, vec!["첫 번째", "두 번째", "세 번째"]);
    }

    #[test]
    fn export_starts_with_utf8_bom() {
        let bytes = export_html("고 소 장");
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
    }

    #[test]
    fn export_embeds_the_trimmed_draft_in_a_pre_block() {
        let bytes = export_html("\n  고 소 장\n청구 취지\n  ");
        let html = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert!(html.contains("<pre>고 소 장\n청구 취지</pre>"));
        assert!(html.contains(r#"<meta charset="UTF-8">"#));
        assert!(html.contains("본 문서는 AI 법률 비서에 의해 자동 생성된 초안입니다."));
    }

    #[test]
    fn save_document_uses_the_fixed_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_document(dir.path(), "내용증명").unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), EXPORT_FILENAME);
        let bytes = fs::read(path).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
    }
}
