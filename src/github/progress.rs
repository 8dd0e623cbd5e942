use std::sync::atomic::{AtomicU8, Ordering};

/// Stage of a PR fetch, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchStage {
    PrDetails,
    Commits,
    Files,
    Generating,
    Complete,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchStage::PrDetails => "pr_details",
            FetchStage::Commits => "commits",
            FetchStage::Files => "files",
            FetchStage::Generating => "generating",
            FetchStage::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

/// A single progress update: stage, percentage (0-100), human-readable message.
#[derive(Debug, Clone)]
pub struct FetchProgress {
    pub stage: FetchStage,
    pub percent: u8,
    pub message: String,
}

/// Delivers progress updates to a caller-supplied callback while enforcing
/// that percentages never decrease within one fetch. The underlying HTTP
/// calls may complete in any order; the sink sequences what the caller sees.
pub struct ProgressSink {
    callback: Box<dyn Fn(FetchProgress) + Send + Sync>,
    last_percent: AtomicU8,
}

impl ProgressSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(FetchProgress) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
            last_percent: AtomicU8::new(0),
        }
    }

    /// A sink that drops every update, for callers that don't care.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Emit an update. The reported percentage is clamped so that it is
    /// never lower than the previous one.
    pub fn emit(&self, stage: FetchStage, percent: u8, message: impl Into<String>) {
        let percent = percent.min(100);
        let clamped = self.last_percent.fetch_max(percent, Ordering::SeqCst).max(percent);
        (self.callback)(FetchProgress {
            stage,
            percent: clamped,
            message: message.into(),
        });
    }
}
