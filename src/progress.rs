//! Crossover search and render progress reporting.
//!
//! Reports observable progress during `find-crossovers` and
//! `render-crossovers` so users see which scene or group is in flight and
//! how much is left. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Searching the catalog for scene `n` of `total`.
    Searching { scene: String, n: u64, total: u64 },
    /// Search finished for a scene; `count` candidates matched.
    Matched { scene: String, count: u64 },
    /// Group `n` of `total` started rendering.
    Rendering { group: String, n: u64, total: u64 },
    /// Group mosaic written.
    Rendered { group: String, layers: u64 },
    /// Group failed after its last attempt.
    GroupFailed { group: String, error: String },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "search E12345  3 / 40 scenes".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Searching { scene, n, total } => {
                format!(
                    "search {}  {} / {} scenes\n",
                    scene,
                    format_number(*n),
                    format_number(*total)
                )
            }
            ProgressEvent::Matched { scene, count } => {
                format!("search {}  {} crossovers\n", scene, format_number(*count))
            }
            ProgressEvent::Rendering { group, n, total } => {
                format!(
                    "render {}  {} / {} groups\n",
                    group,
                    format_number(*n),
                    format_number(*total)
                )
            }
            ProgressEvent::Rendered { group, layers } => {
                format!("render {}  merged {} layers\n", group, layers)
            }
            ProgressEvent::GroupFailed { group, error } => {
                format!("render {}  failed: {}\n", group, error)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &ProgressEvent) -> serde_json::Value {
        match event {
            ProgressEvent::Searching { scene, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "searching",
                "scene": scene,
                "n": n,
                "total": total
            }),
            ProgressEvent::Matched { scene, count } => serde_json::json!({
                "event": "matched",
                "scene": scene,
                "count": count
            }),
            ProgressEvent::Rendering { group, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "rendering",
                "group": group,
                "n": n,
                "total": total
            }),
            ProgressEvent::Rendered { group, layers } => serde_json::json!({
                "event": "rendered",
                "group": group,
                "layers": layers
            }),
            ProgressEvent::GroupFailed { group, error } => serde_json::json!({
                "event": "failed",
                "group": group,
                "error": error
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto if atty::is(atty::Stream::Stderr) => ProgressMode::Human,
            ProgressMode::Auto => ProgressMode::Off,
            other => other,
        }
    }

    pub fn reporter(self) -> std::sync::Arc<dyn ProgressReporter> {
        match self.resolve() {
            ProgressMode::Human => std::sync::Arc::new(StderrProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
            _ => std::sync::Arc::new(NoProgress),
        }
    }
}
