use serde_json::json;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Appends JSON-lines timing records for export runs. On drop, a sibling
/// `<stem>_hot.log` ranks spans by total time.
#[derive(Clone)]
pub struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, document: Option<&str>, page: Option<usize>, ms: f64) {
        let record = json!({
            "type": "perf.span",
            "name": name,
            "document": document,
            "page": page,
            "unit": "ms",
            "ms": (ms * 1000.0).round() / 1000.0,
        });
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{record}");
        }
    }

    pub fn log_counts(&self, name: &str, document: Option<&str>, counts: &[(&str, u64)]) {
        let counts: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(key, value)| (key.to_string(), json!(value)))
            .collect();
        let record = json!({
            "type": "perf.counts",
            "name": name,
            "document": document,
            "counts": counts,
        });
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{record}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

/// Times a region against an optional logger. Cheap when `perf` is `None`.
pub(crate) struct Span<'a> {
    perf: Option<&'a PerfLogger>,
    name: &'static str,
    document: Option<&'a str>,
    page: Option<usize>,
    started: Instant,
}

impl<'a> Span<'a> {
    pub(crate) fn start(
        perf: Option<&'a PerfLogger>,
        name: &'static str,
        document: Option<&'a str>,
        page: Option<usize>,
    ) -> Self {
        Self {
            perf,
            name,
            document,
            page,
            started: Instant::now(),
        }
    }

    pub(crate) fn finish(self) -> f64 {
        let ms = self.started.elapsed().as_secs_f64() * 1000.0;
        if let Some(perf) = self.perf {
            perf.log_span_ms(self.name, self.document, self.page, ms);
        }
        ms
    }
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let Ok(file) = File::create(hot_path_for(&self.path)) else {
            return;
        };
        let mut writer = BufWriter::new(file);
        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (name, ms)) in spans.into_iter().enumerate() {
            let count = self.span_counts.get(name).copied().unwrap_or(1).max(1);
            let record = json!({
                "type": "perf.hot.span",
                "rank": rank + 1,
                "name": name,
                "unit": "ms",
                "ms": ms,
                "count": count,
                "avg_ms": ms / count as f64,
            });
            let _ = writeln!(writer, "{record}");
        }
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|name| name.to_str())
        .unwrap_or("folio_perf");
    path.with_file_name(format!("{stem}_hot.log"))
}
