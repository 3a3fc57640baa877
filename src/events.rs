use crate::stream::StreamSnapshot;

/// Events flowing from background tasks into the main loop.
#[derive(Debug)]
pub enum AppEvent {
    /// A response stream produced a new snapshot for the consultation it was
    /// started for.
    StreamUpdate {
        consultation_id: String,
        snapshot: StreamSnapshot,
    },

    /// The stream finished; the snapshot is authoritative.
    StreamCompleted {
        consultation_id: String,
        snapshot: StreamSnapshot,
    },

    /// The stream failed; the consultation gets the fixed fallback notice.
    StreamFailed {
        consultation_id: String,
        reason: String,
    },

    /// The user aborted the stream; accumulated text stays as-is.
    StreamAborted { consultation_id: String },
}

/// Terminal events forwarded by the input thread.
#[derive(Debug)]
pub enum TuiEvent {
    Key(crossterm::event::KeyEvent),
    Resize,
    Tick,
}
