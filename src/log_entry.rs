//! Structured run log.
//!
//! Every planner decision and executor outcome becomes a [`LogEntry`] handed
//! to a [`LogSink`]. Entries are also mirrored to the `log` facade so that a
//! host application's logger sees them without subscribing.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// One append-only record of what a run did.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    /// Component or action label that produced the entry
    pub actor: String,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    pub fn new(level: LogLevel, actor: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            actor: actor.into(),
            message: message.into(),
            level,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.actor, self.message)
    }
}

/// Receiver of log entries. Emitting is fire-and-forget and cannot fail.
pub trait LogSink: Send + Sync {
    fn emit(&self, entry: LogEntry);
}

/// Sink that only forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn emit(&self, entry: LogEntry) {
        forward_to_facade(&entry);
    }
}

fn forward_to_facade(entry: &LogEntry) {
    log::log!(
        target: "novel_goap",
        entry.level.as_log_level(),
        "{}: {}",
        entry.actor,
        entry.message
    );
}

type Subscriber = Arc<dyn Fn(&LogEntry) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, Subscriber)>,
}

/// Fan-out of log entries to any number of subscribers.
///
/// Subscribers are called outside the hub's lock, so one may subscribe or
/// emit from inside its callback. A subscriber that panics is dropped; the
/// remaining subscribers and the emitting step are unaffected.
#[derive(Default)]
pub struct LogHub {
    subscribers: Mutex<Subscribers>,
}

impl LogHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, on_log: F)
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Arc::new(on_log)));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

impl LogSink for LogHub {
    fn emit(&self, entry: LogEntry) {
        forward_to_facade(&entry);

        let current = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone();

        let mut panicked = Vec::new();
        for (id, subscriber) in current {
            if panic::catch_unwind(AssertUnwindSafe(|| subscriber(&entry))).is_err() {
                log::warn!("dropping log subscriber that panicked on: {}", entry);
                panicked.push(id);
            }
        }

        if !panicked.is_empty() {
            self.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .retain(|(id, _)| !panicked.contains(id));
        }
    }
}

impl fmt::Debug for LogHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_display() {
        let entry = LogEntry::new(LogLevel::Warn, "planner", "no applicable action");
        assert_eq!(format!("{}", entry), "[warn] planner: no applicable action");
    }

    #[test]
    fn test_hub_delivers_to_all_subscribers() {
        let hub = LogHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |entry| seen.lock().unwrap().push(entry.message.clone()));
        }

        hub.emit(LogEntry::new(LogLevel::Info, "planner", "hello"));
        assert_eq!(*seen.lock().unwrap(), vec!["hello", "hello"]);
    }

    #[test]
    fn test_panicking_subscriber_is_dropped() {
        let hub = LogHub::new();
        let seen = Arc::new(Mutex::new(0));

        hub.subscribe(|_| panic!("subscriber bug"));
        {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |_| *seen.lock().unwrap() += 1);
        }

        hub.emit(LogEntry::new(LogLevel::Info, "planner", "first"));
        hub.emit(LogEntry::new(LogLevel::Info, "planner", "second"));

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn test_subscriber_may_reenter_the_hub() {
        let hub = Arc::new(LogHub::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            let weak = Arc::downgrade(&hub);
            hub.subscribe(move |entry| {
                seen.lock().unwrap().push(entry.message.clone());
                if entry.actor == "planner" {
                    if let Some(hub) = weak.upgrade() {
                        hub.emit(LogEntry::new(LogLevel::Debug, "echo", "relayed"));
                        hub.subscribe(|_| {});
                    }
                }
            });
        }

        hub.emit(LogEntry::new(LogLevel::Info, "planner", "hello"));

        assert_eq!(*seen.lock().unwrap(), vec!["hello", "relayed"]);
        assert_eq!(hub.subscriber_count(), 2);
    }
}
