use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Metrics registry (simple, Prometheus-style)
#[derive(Clone)]
pub struct MetricsRegistry {
    counters: Arc<Mutex<HashMap<String, u64>>>,
    gauges: Arc<Mutex<HashMap<String, f64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            gauges: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn inc_counter(&self, name: &str) {
        let mut counters = self.counters.lock();
        *counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn set_gauge(&self, name: &str, val: f64) {
        let mut gauges = self.gauges.lock();
        gauges.insert(name.to_string(), val);
    }

    pub fn snapshot(&self) -> (HashMap<String, u64>, HashMap<String, f64>) {
        (self.counters.lock().clone(), self.gauges.lock().clone())
    }

    /// Render counters and gauges as a Prometheus-style text block.
    pub fn render(&self) -> String {
        let (counters, gauges) = self.snapshot();
        let mut out = String::from("# ricks-engine metrics\n");
        let mut names: Vec<_> = counters.keys().collect();
        names.sort();
        for name in names {
            out.push_str(&format!("{} {}\n", name, counters[name]));
        }
        let mut names: Vec<_> = gauges.keys().collect();
        names.sort();
        for name in names {
            out.push_str(&format!("{} {}\n", name, gauges[name]));
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}
