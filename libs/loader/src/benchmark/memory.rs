//! Process memory sampling

/// Reads this process' resident set size.
///
/// Backed by prometheus' process collector, which only exists on Linux; other
/// platforms report no sample and the harness prints `n/a`.
pub struct MemoryProbe {
    #[cfg(target_os = "linux")]
    collector: prometheus::process_collector::ProcessCollector,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "linux")]
            collector: prometheus::process_collector::ProcessCollector::for_self(),
        }
    }

    /// Resident memory in bytes, if the platform exposes it.
    #[cfg(target_os = "linux")]
    pub fn resident_bytes(&self) -> Option<i64> {
        use prometheus::core::Collector;

        self.collector
            .collect()
            .iter()
            .find(|family| family.get_name() == "process_resident_memory_bytes")
            .and_then(|family| family.get_metric().first())
            .map(|metric| metric.get_gauge().get_value() as i64)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn resident_bytes(&self) -> Option<i64> {
        None
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn reports_nonzero_rss() {
        let probe = MemoryProbe::new();
        assert!(probe.resident_bytes().unwrap_or(0) > 0);
    }
}
