use crate::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Info => "ℹ",
            Self::Success => "✓",
            Self::Warning => "⚠",
            Self::Error => "✕",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Shown,
    /// Displaced by a newer entry; fading out.
    Retiring { detach_at: Instant },
    /// Outlived its ttl; fading out.
    Expiring { detach_at: Instant },
}

#[derive(Debug, Clone)]
pub struct NotificationEntry {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    pub created_at: OffsetDateTime,
    pub shown_at: Instant,
    pub ttl: Duration,
    pub phase: Phase,
}

impl NotificationEntry {
    pub fn is_shown(&self) -> bool {
        self.phase == Phase::Shown
    }

    /// Phase name used as a css class by the console.
    pub fn phase_class(&self) -> &'static str {
        match self.phase {
            Phase::Shown => "shown",
            Phase::Retiring { .. } => "retiring",
            Phase::Expiring { .. } => "expiring",
        }
    }

    fn detach_at(&self) -> Option<Instant> {
        match self.phase {
            Phase::Shown => None,
            Phase::Retiring { detach_at } | Phase::Expiring { detach_at } => Some(detach_at),
        }
    }
}

/// Last-writer-visible feedback channel: at most one entry is shown, anything
/// older is fading out or gone. Nothing is buffered for later display.
#[derive(Debug)]
pub struct NotificationQueue {
    entries: VecDeque<NotificationEntry>,
    next_id: u64,
    default_ttl: Duration,
    retire_fade: Duration,
    expire_fade: Duration,
    max_attached: usize,
}

impl NotificationQueue {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
            default_ttl: config.notification_ttl,
            retire_fade: config.retire_fade,
            expire_fade: config.expire_fade,
            max_attached: config.max_attached.max(1),
        }
    }

    pub fn push(
        &mut self,
        message: impl Into<String>,
        severity: Severity,
        ttl: Option<Duration>,
        now: Instant,
    ) -> u64 {
        self.advance(now);
        let retire_at = now + self.retire_fade;
        for entry in self.entries.iter_mut().filter(|e| e.is_shown()) {
            entry.phase = Phase::Retiring {
                detach_at: retire_at,
            };
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(NotificationEntry {
            id,
            message: message.into(),
            severity,
            created_at: OffsetDateTime::now_utc(),
            shown_at: now,
            ttl: ttl.unwrap_or(self.default_ttl),
            phase: Phase::Shown,
        });

        while self.entries.len() > self.max_attached {
            self.entries.pop_front();
        }
        id
    }

    /// Moves entries through their lifecycle: expire past ttl, detach after fade.
    pub fn advance(&mut self, now: Instant) {
        let expire_fade = self.expire_fade;
        for entry in self.entries.iter_mut() {
            if entry.is_shown() && now >= entry.shown_at + entry.ttl {
                entry.phase = Phase::Expiring {
                    detach_at: entry.shown_at + entry.ttl + expire_fade,
                };
            }
        }
        self.entries
            .retain(|e| e.detach_at().map_or(true, |at| now < at));
    }

    pub fn visible(&self) -> Option<&NotificationEntry> {
        self.entries.iter().rev().find(|e| e.is_shown())
    }

    /// Everything still attached, fading entries included, oldest first.
    pub fn attached(&self) -> impl Iterator<Item = &NotificationEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle every component pushes through.
#[derive(Debug, Clone)]
pub struct Notifier {
    queue: Arc<Mutex<NotificationQueue>>,
}

impl Notifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            queue: Arc::new(Mutex::new(NotificationQueue::new(config))),
        }
    }

    pub fn push(&self, message: impl Into<String>, severity: Severity) -> u64 {
        let message = message.into();
        tracing::debug!(severity = severity.as_str(), %message, "notification");
        self.with_queue(|q| q.push(message, severity, None, Instant::now()))
    }

    pub fn with_queue<R>(&self, f: impl FnOnce(&mut NotificationQueue) -> R) -> R {
        let mut guard = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Message and severity of the shown entry after advancing to `now`.
    pub fn current(&self, now: Instant) -> Option<(String, Severity)> {
        self.with_queue(|q| {
            q.advance(now);
            q.visible().map(|e| (e.message.clone(), e.severity))
        })
    }

    /// Every attached entry after advancing to `now`, fading ones included,
    /// oldest first.
    pub fn attached(&self, now: Instant) -> Vec<NotificationEntry> {
        self.with_queue(|q| {
            q.advance(now);
            q.attached().cloned().collect()
        })
    }
}
