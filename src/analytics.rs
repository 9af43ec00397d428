// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Fire-and-forget event reporting.
//!
//! The query path reports what happened to each request through an
//! [`Analytics`] handle. Events travel over a bounded channel to a sink
//! thread (see [`spawn_sink`]) that appends them, one JSON object per
//! line, to an analytics file. Reporting never blocks: when the channel
//! is full, or the sink is gone, the event is dropped.
//!
//! Each line has the form
//! `{"type":"request","name":"example.com. A IN","timestamp":1700000000}`,
//! where the timestamp is in seconds since the Unix epoch. `name` is
//! left out when the event carries no detail. [`summarize`] reads such
//! a file back and counts events over recent windows.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};

////////////////////////////////////////////////////////////////////////
// EVENTS                                                             //
////////////////////////////////////////////////////////////////////////

/// The classification of an event.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    /// A query was received.
    Request,

    /// A query was dropped because it was malformed or not of class IN.
    Error,

    /// A query matched no records.
    NotFound,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Error => "error",
            Self::NotFound => "notfound",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "request" => Some(Self::Request),
            "error" => Some(Self::Error),
            "notfound" => Some(Self::NotFound),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event, as delivered to the sink.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub detail: String,
    pub timestamp: SystemTime,
}

impl Event {
    /// Returns the JSON form of the event, as written to the analytics
    /// file.
    pub fn to_json(&self) -> Value {
        let timestamp = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        if self.detail.is_empty() {
            json!({ "type": self.kind.as_str(), "timestamp": timestamp })
        } else {
            json!({ "type": self.kind.as_str(), "name": self.detail, "timestamp": timestamp })
        }
    }
}

////////////////////////////////////////////////////////////////////////
// REPORTING HANDLE                                                   //
////////////////////////////////////////////////////////////////////////

/// A cheap, cloneable handle for reporting events.
#[derive(Clone, Debug, Default)]
pub struct Analytics {
    sender: Option<mpsc::Sender<Event>>,
}

/// The receiving end of an [`Analytics`] channel.
#[derive(Debug)]
pub struct EventReceiver(mpsc::Receiver<Event>);

impl Analytics {
    /// Returns a handle that discards every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Creates a handle whose events are delivered to the returned
    /// receiver. At most `capacity` events are buffered.
    pub fn channel(capacity: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            EventReceiver(receiver),
        )
    }

    /// Reports an event. This never blocks and never fails; events that
    /// cannot be delivered are dropped.
    pub fn record(&self, kind: EventKind, detail: impl Into<String>) {
        if let Some(ref sender) = self.sender {
            let event = Event {
                kind,
                detail: detail.into(),
                timestamp: SystemTime::now(),
            };
            match sender.try_send(event) {
                Ok(()) => (),
                Err(TrySendError::Full(event)) => {
                    debug!("Analytics channel full; dropping {} event", event.kind)
                }
                Err(TrySendError::Closed(_)) => (),
            }
        }
    }
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<Event> {
        self.0.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.0.try_recv().ok()
    }

    /// Receives the next event, blocking the current thread. This must
    /// not be called from within an asynchronous runtime.
    pub fn blocking_recv(&mut self) -> Option<Event> {
        self.0.blocking_recv()
    }
}

////////////////////////////////////////////////////////////////////////
// SINK                                                               //
////////////////////////////////////////////////////////////////////////

/// Starts a thread that drains `receiver`. Events are appended to the
/// file at `path` as JSON lines, or, without a path, just logged at the
/// debug level. The thread exits once every [`Analytics`] handle for
/// the channel has been dropped.
///
/// Write failures are logged and the event is lost; they never stop the
/// sink.
pub fn spawn_sink(
    mut receiver: EventReceiver,
    path: Option<PathBuf>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("analytics".to_owned())
        .spawn(move || {
            while let Some(event) = receiver.blocking_recv() {
                let line = event.to_json().to_string();
                match path {
                    Some(ref path) => {
                        if let Err(e) = append_line(path, &line) {
                            warn!("Failed to write analytics to {}: {}", path.display(), e);
                        }
                    }
                    None => debug!("Analytics event: {}", line),
                }
            }
        })
}

fn append_line(path: &std::path::Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    writeln!(file, "{}", line)
}

////////////////////////////////////////////////////////////////////////
// SUMMARIES                                                          //
////////////////////////////////////////////////////////////////////////

/// Event counts over the last day, week, and thirty days.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub day: Counts,
    pub week: Counts,
    pub month: Counts,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counts {
    pub request: u64,
    pub error: u64,
    pub notfound: u64,
}

impl Counts {
    fn add(&mut self, kind: EventKind) {
        match kind {
            EventKind::Request => self.request += 1,
            EventKind::Error => self.error += 1,
            EventKind::NotFound => self.notfound += 1,
        }
    }
}

const DAY: u64 = 24 * 60 * 60;

/// Counts the events in an analytics file as of `now` (in seconds since
/// the Unix epoch). Lines that are not events are skipped. Reading stops
/// at the first I/O error.
pub fn summarize(reader: impl BufRead, now: u64) -> Summary {
    let mut summary = Summary::default();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(_) => continue,
        };
        let kind = value["type"].as_str().and_then(EventKind::parse);
        let timestamp = value["timestamp"].as_u64();
        if let (Some(kind), Some(timestamp)) = (kind, timestamp) {
            let age = now.saturating_sub(timestamp);
            if age <= DAY {
                summary.day.add(kind);
            }
            if age <= 7 * DAY {
                summary.week.add(kind);
            }
            if age <= 30 * DAY {
                summary.month.add(kind);
            }
        }
    }
    summary
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;

    #[test]
    fn events_serialize_as_expected() {
        let event = Event {
            kind: EventKind::NotFound,
            detail: "nowhere.example. A IN".into(),
            timestamp: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        };
        assert_eq!(
            event.to_json(),
            json!({"type": "notfound", "name": "nowhere.example. A IN", "timestamp": 1_700_000_000u64}),
        );
        let bare = Event {
            detail: String::new(),
            ..event
        };
        assert_eq!(bare.to_json().get("name"), None);
    }

    #[test]
    fn full_channel_drops_events() {
        let (analytics, mut receiver) = Analytics::channel(2);
        for _ in 0..5 {
            analytics.record(EventKind::Request, "x");
        }
        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn disabled_and_closed_handles_are_harmless() {
        Analytics::disabled().record(EventKind::Error, "");
        let (analytics, receiver) = Analytics::channel(1);
        drop(receiver);
        analytics.record(EventKind::Error, "");
    }

    #[test]
    fn sink_writes_json_lines() {
        let path = std::env::temp_dir().join(format!(
            "sextant-analytics-test-{}.log",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let (analytics, receiver) = Analytics::channel(8);
        let sink = spawn_sink(receiver, Some(path.clone())).unwrap();
        analytics.record(EventKind::Request, "example.com. A IN");
        analytics.record(EventKind::NotFound, "example.com. A IN");
        drop(analytics);
        sink.join().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let kinds: Vec<String> = contents
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["type"].to_string())
            .collect();
        assert_eq!(kinds, ["\"request\"", "\"notfound\""]);
    }

    #[test]
    fn summarize_counts_by_window() {
        let now = 100 * DAY;
        let log = format!(
            "{}\n{}\n{}\nnot json\n{}\n",
            json!({"type": "request", "timestamp": now - 60}),
            json!({"type": "error", "timestamp": now - 3 * DAY}),
            json!({"type": "notfound", "name": "x", "timestamp": now - 20 * DAY}),
            json!({"type": "request", "timestamp": now - 40 * DAY}),
        );
        let summary = summarize(Cursor::new(log), now);
        assert_eq!(
            summary.day,
            Counts {
                request: 1,
                error: 0,
                notfound: 0
            }
        );
        assert_eq!(
            summary.week,
            Counts {
                request: 1,
                error: 1,
                notfound: 0
            }
        );
        assert_eq!(
            summary.month,
            Counts {
                request: 1,
                error: 1,
                notfound: 1
            }
        );
    }
}
