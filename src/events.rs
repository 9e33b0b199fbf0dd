use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Pipeline stage markers, emitted in order as a run advances.
///
/// `Opened → FormatDetected → ManifestParsed → MetadataResolved → Diffed →
/// Deleting → Downloading → OverridesExtracted → StatePersisted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Opened,
    FormatDetected,
    ManifestParsed,
    MetadataResolved,
    Diffed,
    Deleting,
    Downloading,
    OverridesExtracted,
    StatePersisted,
}

/// What happened to a single file during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Downloaded,
    /// Stale tracked file removed from the instance.
    Deleted,
    DownloadFailed,
    /// Fetched bytes did not match the published digest; file not written.
    DigestMismatch,
    /// Override entry written into the instance.
    Extracted,
    /// Override entry skipped because a protected path already exists.
    Preserved,
    /// Override entry skipped after exhausting write retries.
    ExtractionSkipped,
}

/// Per-file event with an optional human-readable detail (error text, URL).
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub name: String,
    pub action: FileAction,
    pub detail: Option<String>,
}

/// One-way event stream from the engine to the caller.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Phase(SyncPhase),
    Status(String),
    Progress { current: usize, total: usize },
    File(FileEvent),
}

/// Send half of the event stream.
///
/// Sending never blocks and never fails the pipeline: a dropped receiver
/// simply discards events. Clone freely into concurrent download tasks.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<SyncEvent>>,
}

impl EventSink {
    /// Create a connected sink/receiver pair.
    pub fn channel() -> (Self, UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything. Useful for headless callers and tests.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn phase(&self, phase: SyncPhase) {
        self.emit(SyncEvent::Phase(phase));
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(SyncEvent::Status(message.into()));
    }

    pub fn progress(&self, current: usize, total: usize) {
        self.emit(SyncEvent::Progress { current, total });
    }

    pub fn file(&self, name: impl Into<String>, action: FileAction, detail: Option<String>) {
        self.emit(SyncEvent::File(FileEvent {
            name: name.into(),
            action,
            detail,
        }));
    }
}
