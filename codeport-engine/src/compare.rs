//! Side-by-side verification of the Python original and the C++ rewrite.

use crate::runner::RunOutcome;
use serde::Serialize;
use std::fmt::Write;

/// Lines that report wall-clock time differ between runs by nature.
const TIMING_LINE_PREFIXES: [&str; 2] = ["Execution Time", "Elapsed"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub python: RunOutcome,
    pub cpp: RunOutcome,
}

impl Comparison {
    pub fn new(python: RunOutcome, cpp: RunOutcome) -> Self {
        Self { python, cpp }
    }

    /// Both runs succeeded and printed the same thing, ignoring trailing
    /// whitespace and timing lines.
    pub fn outputs_match(&self) -> bool {
        match (self.python.stdout(), self.cpp.stdout()) {
            (Some(py), Some(cpp)) => normalize(py) == normalize(cpp),
            _ => false,
        }
    }

    /// How many times faster the C++ binary ran.
    pub fn speedup(&self) -> Option<f64> {
        let py = self.python.elapsed()?.as_secs_f64();
        let cpp = self.cpp.elapsed()?.as_secs_f64();
        (cpp > 0.0).then(|| py / cpp)
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (label, outcome) in [("Python", &self.python), ("C++", &self.cpp)] {
            match outcome.elapsed() {
                Some(elapsed) => {
                    let _ = writeln!(out, "{:<7} ok      {:>10.6}s", label, elapsed.as_secs_f64());
                }
                None => {
                    let _ = writeln!(out, "{:<7} failed", label);
                }
            }
        }
        let verdict = if self.outputs_match() {
            "outputs match"
        } else {
            "outputs DIFFER"
        };
        let _ = write!(out, "{}", verdict);
        if let Some(speedup) = self.speedup() {
            let _ = write!(out, ", C++ is {:.1}x faster", speedup);
        }
        out
    }
}

fn normalize(output: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !TIMING_LINE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}
