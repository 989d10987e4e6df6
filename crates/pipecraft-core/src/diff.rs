//! Structural comparison of pipeline documents.
//!
//! Documents are compared as JSON trees: object properties by key, arrays by
//! index. The result can be rendered as plain text with `+`/`-` markers in
//! the first column.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::Write;

/// How closely the stored pipeline matches the rendered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// No differences.
    FullMatch,
    /// Both sides exist but differ.
    PartialMatch,
    /// The stored pipeline could not be fetched; everything is new.
    NoComparableBase,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::FullMatch => write!(f, "full match"),
            MatchKind::PartialMatch => write!(f, "partial match"),
            MatchKind::NoComparableBase => write!(f, "no comparable base"),
        }
    }
}

/// Difference between two JSON values.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Unchanged(Value),
    Added(Value),
    Removed(Value),
    Modified { from: Value, to: Value },
    /// Objects that differ in at least one property, keyed in sorted order.
    Object(Vec<(String, Delta)>),
    /// Arrays that differ in at least one position.
    Array(Vec<Delta>),
}

impl Delta {
    /// Compare `current` (the stored side) with `desired`.
    pub fn compute(current: &Value, desired: &Value) -> Delta {
        if current == desired {
            return Delta::Unchanged(desired.clone());
        }

        match (current, desired) {
            (Value::Object(from), Value::Object(to)) => Delta::Object(compare_objects(from, to)),
            (Value::Array(from), Value::Array(to)) => {
                let len = from.len().max(to.len());
                let items = (0..len)
                    .map(|i| match (from.get(i), to.get(i)) {
                        (Some(a), Some(b)) => Delta::compute(a, b),
                        (Some(a), None) => Delta::Removed(a.clone()),
                        (None, Some(b)) => Delta::Added(b.clone()),
                        (None, None) => unreachable!("index below both lengths"),
                    })
                    .collect();
                Delta::Array(items)
            }
            _ => Delta::Modified {
                from: current.clone(),
                to: desired.clone(),
            },
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Delta::Unchanged(_))
    }

    /// Paths of every added, removed or modified leaf, e.g. `stages[0].pipeline`.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        match self {
            Delta::Unchanged(_) => {}
            Delta::Added(_) | Delta::Removed(_) | Delta::Modified { .. } => {
                out.push(if prefix.is_empty() {
                    "$".to_string()
                } else {
                    prefix.to_string()
                })
            }
            Delta::Object(entries) => {
                for (key, delta) in entries {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    delta.collect_paths(&path, out);
                }
            }
            Delta::Array(items) => {
                for (i, delta) in items.iter().enumerate() {
                    delta.collect_paths(&format!("{}[{}]", prefix, i), out);
                }
            }
        }
    }
}

fn compare_objects(from: &Map<String, Value>, to: &Map<String, Value>) -> Vec<(String, Delta)> {
    let keys: BTreeSet<&String> = from.keys().chain(to.keys()).collect();
    keys.into_iter()
        .map(|key| {
            let delta = match (from.get(key), to.get(key)) {
                (Some(a), Some(b)) => Delta::compute(a, b),
                (Some(a), None) => Delta::Removed(a.clone()),
                (None, Some(b)) => Delta::Added(b.clone()),
                (None, None) => unreachable!("key taken from one of the maps"),
            };
            (key.clone(), delta)
        })
        .collect()
}

/// A comparison result ready for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralDiff {
    pub match_kind: MatchKind,
    pub delta: Delta,
}

impl StructuralDiff {
    pub fn compare(current: &Value, desired: &Value) -> Self {
        let delta = Delta::compute(current, desired);
        let match_kind = if delta.is_unchanged() {
            MatchKind::FullMatch
        } else {
            MatchKind::PartialMatch
        };
        Self { match_kind, delta }
    }

    /// The degraded result when nothing is stored yet.
    pub fn without_base(desired: &Value) -> Self {
        Self {
            match_kind: MatchKind::NoComparableBase,
            delta: Delta::Added(desired.clone()),
        }
    }

    /// Render as text. With `suppress_unchanged`, unchanged object properties
    /// are left out and unchanged array elements collapse to `{...}`/`[...]`.
    pub fn render(&self, suppress_unchanged: bool) -> String {
        let mut out = String::new();
        Renderer {
            out: &mut out,
            suppress_unchanged,
        }
        .delta(&self.delta, 0, None, "");
        out
    }
}

struct Renderer<'a> {
    out: &'a mut String,
    suppress_unchanged: bool,
}

impl Renderer<'_> {
    fn delta(&mut self, delta: &Delta, depth: usize, label: Option<&str>, comma: &str) {
        match delta {
            Delta::Unchanged(value) => {
                if self.suppress_unchanged && depth > 0 && is_container(value) {
                    let collapsed = if value.is_object() { "{...}" } else { "[...]" };
                    self.line(' ', depth, label, collapsed, comma);
                } else {
                    self.value(' ', value, depth, label, comma);
                }
            }
            Delta::Added(value) => self.value('+', value, depth, label, comma),
            Delta::Removed(value) => self.value('-', value, depth, label, comma),
            Delta::Modified { from, to } => {
                self.value('-', from, depth, label, comma);
                self.value('+', to, depth, label, comma);
            }
            Delta::Object(entries) => {
                let visible: Vec<&(String, Delta)> = entries
                    .iter()
                    .filter(|(_, d)| !(self.suppress_unchanged && d.is_unchanged()))
                    .collect();
                self.line(' ', depth, label, "{", "");
                for (i, (key, entry)) in visible.iter().enumerate() {
                    let key_label = format!("\"{}\"", key);
                    let sep = if i + 1 < visible.len() { "," } else { "" };
                    self.delta(entry, depth + 1, Some(key_label.as_str()), sep);
                }
                self.line(' ', depth, None, "}", comma);
            }
            Delta::Array(items) => {
                self.line(' ', depth, label, "[", "");
                for (i, item) in items.iter().enumerate() {
                    let index_label = i.to_string();
                    let sep = if i + 1 < items.len() { "," } else { "" };
                    self.delta(item, depth + 1, Some(index_label.as_str()), sep);
                }
                self.line(' ', depth, None, "]", comma);
            }
        }
    }

    /// Write a JSON value, one line per pretty-printed line, every line
    /// carrying the same marker.
    fn value(&mut self, marker: char, value: &Value, depth: usize, label: Option<&str>, comma: &str) {
        let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        let lines: Vec<&str> = pretty.lines().collect();
        let last = lines.len().saturating_sub(1);
        for (i, text) in lines.iter().enumerate() {
            let (label, comma) = match (i == 0, i == last) {
                (true, true) => (label, comma),
                (true, false) => (label, ""),
                (false, true) => (None, comma),
                (false, false) => (None, ""),
            };
            // Continuation lines are already indented by the pretty printer.
            self.line(marker, depth, label, text, comma);
        }
    }

    fn line(&mut self, marker: char, depth: usize, label: Option<&str>, text: &str, comma: &str) {
        let indent = "  ".repeat(depth);
        let _ = match label {
            Some(label) => writeln!(self.out, "{}{}{}: {}{}", marker, indent, label, text, comma),
            None => writeln!(self.out, "{}{}{}{}", marker, indent, text, comma),
        };
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}
