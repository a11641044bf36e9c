/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Bounded, deduplicated diagnostics ring buffer.
//!
//! Every host-API call the core makes is wrapped in [`safe_call`], which
//! records failures here instead of propagating a panic. The buffer caps the
//! number of retained events but never stops counting them, so a run summary
//! can report "47 errors, 10 shown" instead of silently truncating.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Level {
    Debug,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "DEBUG",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagEvent {
    pub level: Level,
    pub phase: String,
    pub callsite: String,
    pub message: String,
    pub exc_type: Option<String>,
    pub exc_message: Option<String>,
    pub view_id: Option<i64>,
    pub elem_id: Option<i64>,
    pub source: Option<String>,
    pub doc_key: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

/// Arguments for a single diagnostic record, named explicitly instead of
/// positional so call sites stay readable as fields get added.
#[derive(Debug, Default)]
pub struct DiagArgs<'a> {
    pub phase: &'a str,
    pub callsite: &'a str,
    pub message: &'a str,
    pub exc_type: Option<&'a str>,
    pub exc_message: Option<&'a str>,
    pub view_id: Option<i64>,
    pub elem_id: Option<i64>,
    pub source: Option<&'a str>,
    pub doc_key: Option<&'a str>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl<'a> DiagArgs<'a> {
    pub fn new(phase: &'a str, callsite: &'a str, message: &'a str) -> Self {
        DiagArgs {
            phase,
            callsite,
            message,
            ..Default::default()
        }
    }
}

/// Bounded, dedup'd diagnostics ring.
pub struct Diagnostics {
    max_events: usize,
    events: Vec<DiagEvent>,
    dropped_events: u64,
    counts: HashMap<Level, u64>,
    dedupe_seen: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSummary {
    pub num_events: usize,
    pub dropped_events: u64,
    pub counts: HashMap<String, u64>,
    pub events: Vec<DiagEvent>,
}

impl Diagnostics {
    pub fn new(max_events: usize) -> Self {
        Diagnostics {
            max_events,
            events: Vec::new(),
            dropped_events: 0,
            counts: HashMap::new(),
            dedupe_seen: HashMap::new(),
        }
    }

    fn push(&mut self, level: Level, args: DiagArgs) {
        *self.counts.entry(level).or_insert(0) += 1;
        if self.events.len() >= self.max_events {
            self.dropped_events += 1;
            return;
        }
        self.events.push(DiagEvent {
            level,
            phase: args.phase.to_string(),
            callsite: args.callsite.to_string(),
            message: args.message.to_string(),
            exc_type: args.exc_type.map(|s| s.to_string()),
            exc_message: args.exc_message.map(|s| s.to_string()),
            view_id: args.view_id,
            elem_id: args.elem_id,
            source: args.source.map(|s| s.to_string()),
            doc_key: args.doc_key.map(|s| s.to_string()),
            extra: args.extra,
        });
    }

    pub fn error(&mut self, args: DiagArgs) {
        self.push(Level::Error, args);
    }

    pub fn warn(&mut self, args: DiagArgs) {
        self.push(Level::Warn, args);
    }

    /// Records a DEBUG event the first time `dedupe_key` is seen; subsequent
    /// calls with the same key only bump `extra["suppressed_count"]` on the
    /// already-recorded event instead of adding a new one.
    pub fn debug_dedupe(&mut self, dedupe_key: &str, mut args: DiagArgs) {
        *self.counts.entry(Level::Debug).or_insert(0) += 1;

        if let Some(&idx) = self.dedupe_seen.get(dedupe_key) {
            if let Some(event) = self.events.get_mut(idx) {
                let count = event
                    .extra
                    .entry("suppressed_count".to_string())
                    .or_insert(serde_json::Value::from(0));
                let next = count.as_u64().unwrap_or(0) + 1;
                *count = serde_json::Value::from(next);
            }
            return;
        }

        args.extra
            .entry("suppressed_count".to_string())
            .or_insert(serde_json::Value::from(0));

        if self.events.len() >= self.max_events {
            self.dropped_events += 1;
            return;
        }
        let idx = self.events.len();
        self.events.push(DiagEvent {
            level: Level::Debug,
            phase: args.phase.to_string(),
            callsite: args.callsite.to_string(),
            message: args.message.to_string(),
            exc_type: args.exc_type.map(|s| s.to_string()),
            exc_message: args.exc_message.map(|s| s.to_string()),
            view_id: args.view_id,
            elem_id: args.elem_id,
            source: args.source.map(|s| s.to_string()),
            doc_key: args.doc_key.map(|s| s.to_string()),
            extra: args.extra,
        });
        self.dedupe_seen.insert(dedupe_key.to_string(), idx);
    }

    pub fn to_summary(&self) -> DiagnosticsSummary {
        let mut counts = HashMap::new();
        for (level, n) in &self.counts {
            counts.insert(level.to_string(), *n);
        }
        DiagnosticsSummary {
            num_events: self.events.len(),
            dropped_events: self.dropped_events,
            counts,
            events: self.events.clone(),
        }
    }
}

/// Policy for [`safe_call`]: whether a failure should propagate after being
/// recorded, or be swallowed in favor of the caller-supplied default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeCallPolicy {
    Default,
    Raise,
}

/// Executes `f`, recording any `Err` into `diag` before deciding what to
/// return. Diagnostics recording itself is infallible by construction (it
/// only pushes into in-memory vectors), so there's no need to guard the
/// recording call itself against failure.
pub fn safe_call<T, E, F>(
    diag: &mut Diagnostics,
    policy: SafeCallPolicy,
    phase: &str,
    callsite: &str,
    default: T,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match f() {
        Ok(v) => Ok(v),
        Err(e) => {
            let message = e.to_string();
            diag.error(DiagArgs {
                phase,
                callsite,
                message: &message,
                exc_message: Some(&message),
                ..Default::default()
            });
            match policy {
                SafeCallPolicy::Raise => Err(e),
                SafeCallPolicy::Default => Ok(default),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_cap_keeps_counting() {
        let mut diag = Diagnostics::new(2);
        for i in 0..7 {
            diag.error(DiagArgs::new("test", "callsite", &format!("err {}", i)));
        }
        let summary = diag.to_summary();
        assert_eq!(summary.num_events, 2);
        assert_eq!(summary.dropped_events, 5);
        let total: u64 = summary.counts.values().sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn debug_dedupe_collapses_repeats() {
        let mut diag = Diagnostics::new(100);
        for _ in 0..5 {
            diag.debug_dedupe("k1", DiagArgs::new("test", "callsite", "repeated"));
        }
        let summary = diag.to_summary();
        assert_eq!(summary.num_events, 1);
        assert_eq!(summary.events[0].level, Level::Debug);
        assert_eq!(
            summary.events[0]
                .extra
                .get("suppressed_count")
                .and_then(|v| v.as_u64()),
            Some(4)
        );
    }

    #[test]
    fn safe_call_returns_default_on_error() {
        let mut diag = Diagnostics::new(10);
        let result: Result<i32, String> = safe_call(
            &mut diag,
            SafeCallPolicy::Default,
            "test",
            "callsite",
            -1,
            || Err("boom".to_string()),
        );
        assert_eq!(result, Ok(-1));
        assert_eq!(diag.to_summary().num_events, 1);
    }

    #[test]
    fn safe_call_raises_when_policy_raise() {
        let mut diag = Diagnostics::new(10);
        let result: Result<i32, String> = safe_call(
            &mut diag,
            SafeCallPolicy::Raise,
            "test",
            "callsite",
            -1,
            || Err("boom".to_string()),
        );
        assert!(result.is_err());
    }
}
