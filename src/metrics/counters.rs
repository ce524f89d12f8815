//! Counter metrics for monotonically increasing values.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self, out: &mut String) {
        out.push_str(&format!(
            "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n",
            name = self.name,
            help = self.help,
            value = self.get()
        ));
    }
}

/// A counter split by the value of one label.
#[derive(Debug)]
pub struct LabeledCounter {
    name: &'static str,
    help: &'static str,
    label: &'static str,
    counters: RwLock<HashMap<String, AtomicU64>>,
}

impl LabeledCounter {
    /// Create a new labeled counter.
    pub fn new(name: &'static str, help: &'static str, label: &'static str) -> Self {
        Self {
            name,
            help,
            label,
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Increment the series for `value`.
    pub fn inc(&self, value: &str) {
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(value) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        self.counters
            .write()
            .entry(value.to_owned())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get the series for `value`, 0 if never incremented.
    pub fn get(&self, value: &str) -> u64 {
        self.counters
            .read()
            .get(value)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render in Prometheus text exposition format, series sorted by label.
    pub fn render(&self, out: &mut String) {
        out.push_str(&format!(
            "# HELP {name} {help}\n# TYPE {name} counter\n",
            name = self.name,
            help = self.help
        ));

        let counters = self.counters.read();
        let mut series: Vec<_> = counters.iter().collect();
        series.sort_by(|a, b| a.0.cmp(b.0));
        for (value, count) in series {
            out.push_str(&format!(
                "{}{{{}=\"{}\"}} {}\n",
                self.name,
                self.label,
                value,
                count.load(Ordering::Relaxed)
            ));
        }
    }
}
