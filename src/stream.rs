//! Assembly of incremental model responses: text deltas are concatenated in
//! arrival order and citations are deduplicated by URI as they arrive.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::consultation::Source;

/// One increment of a streamed model response.
#[derive(Debug, Clone, Default)]
pub struct ResponseChunk {
    pub text: Option<String>,
    pub citations: Vec<Source>,
}

/// Events emitted by the model client while a response streams in.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(ResponseChunk),
    Completed,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream failed: {0}")]
    Failed(String),
    #[error("stream aborted")]
    Aborted,
}

/// Accumulated response state: everything received so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub text: String,
    pub sources: Vec<Source>,
}

/// Folds chunks into a growing snapshot.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    snapshot: StreamSnapshot,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one chunk and returns the snapshot after it. Citations whose
    /// URI was already seen are dropped; the first-seen title wins.
    pub fn push_chunk(&mut self, chunk: &ResponseChunk) -> &StreamSnapshot {
        if let Some(text) = &chunk.text {
            self.snapshot.text.push_str(text);
        }
        for citation in &chunk.citations {
            if !self
                .snapshot
                .sources
                .iter()
                .any(|source| source.uri == citation.uri)
            {
                self.snapshot.sources.push(citation.clone());
            }
        }
        &self.snapshot
    }

    pub fn snapshot(&self) -> &StreamSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> StreamSnapshot {
        self.snapshot
    }
}

/// Drives a response stream to completion.
///
/// For every chunk the assembled snapshot is handed to `sink`, in arrival
/// order. Completes when the stream ends (the final snapshot is
/// authoritative), returns [`StreamError::Failed`] without a further snapshot
/// if the stream errors, and honors `cancel` at the next suspension point.
pub async fn drive_stream<F>(
    mut rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    mut sink: F,
) -> Result<StreamSnapshot, StreamError>
where
    F: FnMut(&StreamSnapshot),
{
    let mut assembler = StreamAssembler::new();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Err(StreamError::Aborted),
            event = rx.recv() => event,
        };
        match event {
            Some(StreamEvent::Chunk(chunk)) => sink(assembler.push_chunk(&chunk)),
            // A closed channel means the producer is done too.
            Some(StreamEvent::Completed) | None => return Ok(assembler.into_snapshot()),
            Some(StreamEvent::Failed(reason)) => return Err(StreamError::Failed(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_chunk(text: &str) -> ResponseChunk {
        ResponseChunk {
            text: Some(text.to_string()),
            citations: Vec::new(),
        }
    }

    fn citation(title: &str, uri: &str) -> Source {
        Source {
            title: title.to_string(),
            uri: uri.to_string(),
        }
    }

    #[test]
    fn deltas_concatenate_regardless_of_chunk_boundaries() {
        let full = "안녕하세요, 상담을 시작합니다.";
        let mut coarse = StreamAssembler::new();
        coarse.push_chunk(&text_chunk(full));

        let mut fine = StreamAssembler::new();
        for ch in full.chars() {
            fine.push_chunk(&text_chunk(&ch.to_string()));
        }

        assert_eq!(coarse.snapshot().text, full);
        assert_eq!(fine.snapshot().text, full);
    }

    #[test]
    fn duplicate_citation_uris_keep_the_first_seen_title() {
        let mut assembler = StreamAssembler::new();
        assembler.push_chunk(&ResponseChunk {
            text: None,
            citations: vec![citation("판례A", "http://x"), citation("판례B", "http://y")],
        });
        assembler.push_chunk(&ResponseChunk {
            text: None,
            citations: vec![citation("판례A-dup", "http://x")],
        });

        let sources = &assembler.snapshot().sources;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "판례A");
        assert_eq!(sources[1].title, "판례B");
    }

    #[tokio::test]
    async fn stream_emits_a_snapshot_per_chunk_and_completes() {
        let (tx, rx) = mpsc::channel(8);
        for delta in ["안녕하세요", ", 상담", "을 시작합니다."] {
            tx.send(StreamEvent::Chunk(text_chunk(delta))).await.unwrap();
        }
        tx.send(StreamEvent::Completed).await.unwrap();
        drop(tx);

        let mut seen = Vec::new();
        let snapshot = drive_stream(rx, CancellationToken::new(), |snap| {
            seen.push(snap.text.clone());
        })
        .await
        .unwrap();

        assert_eq!(
            seen,
            vec!["안녕하세요", "안녕하세요, 상담", "안녕하세요, 상담을 시작합니다."]
        );
        assert_eq!(snapshot.text, "안녕하세요, 상담을 시작합니다.");
        assert!(snapshot.sources.is_empty());
    }

    #[tokio::test]
    async fn failure_stops_the_stream_without_a_further_snapshot() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Chunk(text_chunk("초안 작성 중")))
            .await
            .unwrap();
        tx.send(StreamEvent::Failed("connection reset".to_string()))
            .await
            .unwrap();
        drop(tx);

        let mut snapshots = 0;
        let err = drive_stream(rx, CancellationToken::new(), |_| snapshots += 1)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Failed(_)));
        assert_eq!(snapshots, 1);
    }

    #[tokio::test]
    async fn cancellation_is_honored_at_the_next_suspension_point() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = drive_stream(rx, cancel, |_| {}).await.unwrap_err();
        assert!(matches!(err, StreamError::Aborted));
        drop(tx);
    }

    #[tokio::test]
    async fn snapshots_stay_bound_to_the_consultation_the_stream_started_for() {
        use crate::consultation::ConsultationStore;

        let mut store = ConsultationStore::with_seed_history();
        store.select("2");
        store.append_user_message("2", "질문", Vec::new()).unwrap();
        store.append_model_placeholder("2").unwrap();
        let bound_id = store.active_id().unwrap().to_string();
        // The user switches to another consultation mid-stream.
        store.select("3");

        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Chunk(text_chunk("답변"))).await.unwrap();
        tx.send(StreamEvent::Completed).await.unwrap();
        drop(tx);

        drive_stream(rx, CancellationToken::new(), |snapshot| {
            store.update_streaming_message(&bound_id, snapshot);
        })
        .await
        .unwrap();

        assert!(store.get("3").unwrap().messages.is_empty());
        assert_eq!(store.get("2").unwrap().messages[1].content, "답변");
    }

    #[tokio::test]
    async fn exhausted_channel_counts_as_normal_completion() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Chunk(text_chunk("전부"))).await.unwrap();
        drop(tx);

        let snapshot = drive_stream(rx, CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(snapshot.text, "전부");
    }
}
