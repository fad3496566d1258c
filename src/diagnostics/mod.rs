//! Diagnostic reports of the subscription registry.
//!
//! A [`Report`] is a read-only picture of the cache: how many entries exist,
//! how many listeners they serve, and who those listeners are. The cache
//! emits one (debounced) after every subscribe, detach and teardown when
//! diagnostics are enabled with [`configure`](crate::configure).

use std::fmt;
use tracing::{debug, info};

const LOG_TARGET: &str = "snapcache::diagnostics";

/// Width labels are padded to so report lines line up.
pub const LABEL_WIDTH: usize = 60;

const ANONYMOUS: &str = "<anonymous>";

/// What the report needs to know about one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    /// Display form of the entry's reference.
    pub label: String,
    /// Caller labels of the attached listeners, in attach order.
    pub callers: Vec<Option<String>>,
}

/// One line of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    /// Entry with no listeners whose teardown timer is running.
    AwaitingTeardown { label: String },
    /// Entry with listeners, grouped by caller with counts.
    Active {
        label: String,
        callers: Vec<(String, usize)>,
    },
}

impl ReportLine {
    pub fn label(&self) -> &str {
        match self {
            Self::AwaitingTeardown { label } | Self::Active { label, .. } => label,
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingTeardown { label } => write!(f, "{label} [cache timing out]"),
            Self::Active { label, callers } => {
                write!(f, "{label} » ")?;
                for (i, (caller, count)) in callers.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if *count == 1 {
                        f.write_str(caller)?;
                    } else {
                        write!(f, "{caller} × {count}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Snapshot of the registry for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    subscriptions: usize,
    listeners: usize,
    lines: Vec<ReportLine>,
}

impl Report {
    /// Build a report from entry summaries.
    pub fn capture(entries: impl IntoIterator<Item = EntrySummary>) -> Self {
        let mut subscriptions = 0;
        let mut listeners = 0;
        let mut lines = Vec::new();

        for entry in entries {
            subscriptions += 1;
            listeners += entry.callers.len();

            let label = format!("{:<width$}", entry.label, width = LABEL_WIDTH);
            if entry.callers.is_empty() {
                lines.push(ReportLine::AwaitingTeardown { label });
            } else {
                lines.push(ReportLine::Active {
                    label,
                    callers: count_callers(&entry.callers),
                });
            }
        }

        lines.sort_by(|a, b| a.label().cmp(b.label()));

        Self {
            subscriptions,
            listeners,
            lines,
        }
    }

    /// Number of cache entries.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions
    }

    /// Total listeners across all entries.
    pub fn listeners(&self) -> usize {
        self.listeners
    }

    /// Per-entry lines, sorted by label.
    pub fn lines(&self) -> &[ReportLine] {
        &self.lines
    }

    /// The one-line summary header.
    pub fn header(&self) -> String {
        format!(
            "{} subscription{} ({} listener{})",
            self.subscriptions,
            plural(self.subscriptions),
            self.listeners,
            plural(self.listeners),
        )
    }

    /// Log the report through `tracing`.
    ///
    /// Entries awaiting teardown are logged at debug level so they fade into
    /// the background next to live entries.
    pub fn emit(&self) {
        info!(
            target: LOG_TARGET,
            subscriptions = self.subscriptions,
            listeners = self.listeners,
            "{}",
            self.header()
        );
        for line in &self.lines {
            match line {
                ReportLine::AwaitingTeardown { .. } => debug!(target: LOG_TARGET, "{line}"),
                ReportLine::Active { .. } => info!(target: LOG_TARGET, "{line}"),
            }
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())?;
        for line in &self.lines {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// Counts in first-seen order.
fn count_callers(callers: &[Option<String>]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for caller in callers {
        let name = caller.as_deref().unwrap_or(ANONYMOUS);
        match counts.iter_mut().find(|(seen, _)| seen == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name.to_string(), 1)),
        }
    }
    counts
}
