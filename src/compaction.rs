//! Compaction detection
//!
//! [`classify`] is a pure function over transcript text that recognizes the
//! markers hosts leave behind when they summarize or truncate a conversation.
//! [`CompactionMonitor`] wraps it with a per-process cooldown so a burst of
//! marker-bearing messages triggers a single rehydration.

use crate::clock::SharedClock;
use crate::types::Millis;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

/// Lowercase literal phrases matched as substrings.
const LITERAL_INDICATORS: &[&str] = &[
    "previous conversation compacted",
    "conversation compacted",
    "context truncated",
    "this session is being continued from a previous conversation",
    "conversation was summarized",
    "earlier messages were truncated",
    "context window limit",
    "ran out of context",
];

static SUMMARY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?\s*(compact[-_ ]?summary|conversation[-_ ]?summary)\s*>")
        .expect("summary tag pattern is valid")
});

static SUMMARY_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(#+\s*)?summary of (the )?(conversation|session)( so far)?\s*:?\s*$")
        .expect("summary heading pattern is valid")
});

static COMPACT_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(^|\s)/compact(\s|$)").expect("compact command pattern is valid")
});

static FILE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(called the \w+ tool with the following input|\[file content truncated[^\]]*\]|\[\d+ (lines|messages) truncated\])",
    )
    .expect("file reference pattern is valid")
});

/// Category of a matched indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Literal,
    SummaryTag,
    SummaryHeading,
    CompactCommand,
    FileReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub kind: IndicatorKind,
    /// The literal phrase or the matched text.
    pub matched: String,
}

/// Result of classifying one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub indicators: Vec<Indicator>,
}

impl Detection {
    pub fn is_compaction(&self) -> bool {
        !self.indicators.is_empty()
    }
}

/// List every compaction indicator found in `text`.
pub fn classify(text: &str) -> Detection {
    let lowered = text.to_lowercase();
    let mut indicators: Vec<Indicator> = LITERAL_INDICATORS
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .map(|phrase| Indicator {
            kind: IndicatorKind::Literal,
            matched: phrase.to_string(),
        })
        .collect();

    let patterns: [(&Regex, IndicatorKind); 4] = [
        (&SUMMARY_TAG, IndicatorKind::SummaryTag),
        (&SUMMARY_HEADING, IndicatorKind::SummaryHeading),
        (&COMPACT_COMMAND, IndicatorKind::CompactCommand),
        (&FILE_REFERENCE, IndicatorKind::FileReference),
    ];
    for (pattern, kind) in patterns {
        if let Some(found) = pattern.find(text) {
            indicators.push(Indicator {
                kind,
                matched: found.as_str().trim().to_string(),
            });
        }
    }

    Detection { indicators }
}

pub fn detect(text: &str) -> bool {
    classify(text).is_compaction()
}

/// Outcome of [`CompactionMonitor::check_input`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub detection: Detection,
    /// A positive detection outside the cooldown window.
    pub triggered: bool,
    /// A positive detection swallowed by the cooldown.
    pub suppressed: bool,
}

/// Cooldown gate over [`classify`]: one last-trigger timestamp per monitor.
pub struct CompactionMonitor {
    clock: SharedClock,
    cooldown: Duration,
    last_trigger: Mutex<Option<Millis>>,
}

impl CompactionMonitor {
    pub fn new(clock: SharedClock, cooldown: Duration) -> Self {
        Self {
            clock,
            cooldown,
            last_trigger: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_trigger(&self) -> Option<Millis> {
        *self.last_trigger.lock()
    }

    pub fn check_input(&self, text: &str) -> CheckOutcome {
        let detection = classify(text);
        if !detection.is_compaction() {
            return CheckOutcome {
                detection,
                triggered: false,
                suppressed: false,
            };
        }

        let now = self.clock.now_ms();
        let cooldown_ms = self.cooldown.as_millis() as u64;
        let mut last = self.last_trigger.lock();
        let in_cooldown = last.map_or(false, |at| now.saturating_sub(at) < cooldown_ms);
        if in_cooldown {
            debug!(indicators = detection.indicators.len(), "compaction detection suppressed by cooldown");
            return CheckOutcome {
                detection,
                triggered: false,
                suppressed: true,
            };
        }

        *last = Some(now);
        info!(indicators = detection.indicators.len(), "compaction detected");
        CheckOutcome {
            detection,
            triggered: true,
            suppressed: false,
        }
    }
}
