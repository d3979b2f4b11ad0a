use std::path::Path;

use crate::runner::StressResult;

/// A complete baseline containing results from all workloads.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Baseline {
    pub timestamp: String,
    pub results: Vec<StressResult>,
}

/// Load a baseline from a JSON file. Returns None if the file doesn't exist.
pub fn load_baseline(path: &Path) -> Option<Baseline> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Save a baseline to a JSON file.
pub fn save_baseline(path: &Path, baseline: &Baseline) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(baseline).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Compare current throughput against a baseline. Returns (workload, percent
/// drop) for every workload that slowed down by more than the threshold.
pub fn compare(
    current: &[StressResult],
    baseline: &Baseline,
    threshold_pct: f64,
) -> Vec<(String, f64)> {
    let mut regressions = Vec::new();

    for result in current {
        if let Some(base) = baseline
            .results
            .iter()
            .find(|b| b.workload == result.workload && b.ops_per_sec > 0.0)
        {
            let pct_drop = (base.ops_per_sec - result.ops_per_sec) / base.ops_per_sec * 100.0;
            if pct_drop > threshold_pct {
                regressions.push((result.workload.clone(), pct_drop));
            }
        }
    }

    regressions
}

/// Format results as a markdown summary table.
pub fn format_markdown(results: &[StressResult]) -> String {
    let mut out = String::new();
    out.push_str("| Workload | Threads | Ops/s | Mean (us) | P95 (us) | P99 (us) | Sweeps | Closed | Contended | Peak resident (KiB) | Compressed (KiB) | Mismatches |\n");
    out.push_str("|----------|---------|-------|-----------|----------|----------|--------|--------|-----------|---------------------|------------------|------------|\n");

    for r in results {
        out.push_str(&format!(
            "| {} | {} | {:.0} | {:.2} | {:.2} | {:.2} | {} | {} | {} | {} | {} | {} |\n",
            r.workload,
            r.threads,
            r.ops_per_sec,
            r.latency.mean_us,
            r.latency.p95_us,
            r.latency.p99_us,
            r.sweeps,
            r.chunks_closed,
            r.contended_closes,
            r.peak_resident_bytes / 1024,
            r.final_compressed_bytes / 1024,
            r.mismatches,
        ));
    }

    out
}

/// Format a comparison report showing regressions.
pub fn format_comparison(regressions: &[(String, f64)], threshold_pct: f64) -> String {
    if regressions.is_empty() {
        return format!(
            "All workloads within {:.0}% threshold. No regressions detected.\n",
            threshold_pct
        );
    }

    let mut out = String::new();
    out.push_str(&format!(
        "REGRESSIONS DETECTED (>{:.0}% throughput drop):\n",
        threshold_pct
    ));
    for (workload, pct) in regressions {
        out.push_str(&format!("  - {}: -{:.1}%\n", workload, pct));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TimingSeries;

    fn result(workload: &str, ops_per_sec: f64) -> StressResult {
        StressResult {
            workload: workload.to_string(),
            threads: 2,
            total_ops: 1000,
            elapsed_ms: 10.0,
            ops_per_sec,
            sweeps: 3,
            chunks_closed: 12,
            contended_closes: 1,
            codec_failures: 0,
            peak_resident_bytes: 4096,
            final_compressed_bytes: 2048,
            mismatches: 0,
            latency: TimingSeries {
                mean_us: 1.0,
                median_us: 1.0,
                p95_us: 2.0,
                p99_us: 3.0,
                min_us: 0.5,
                max_us: 4.0,
            },
        }
    }

    #[test]
    fn test_compare_flags_throughput_drop() {
        let baseline = Baseline {
            timestamp: "t".to_string(),
            results: vec![result("a", 1000.0), result("b", 1000.0)],
        };
        let current = vec![result("a", 850.0), result("b", 950.0), result("c", 1.0)];
        let regressions = compare(&current, &baseline, 10.0);
        assert_eq!(regressions.len(), 1);
        assert_eq!(regressions[0].0, "a");
        assert!((regressions[0].1 - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_json_roundtrip() {
        let dir = std::env::temp_dir().join(format!("voxcache-bench-{}", std::process::id()));
        let path = dir.join("baseline.json");
        let baseline = Baseline {
            timestamp: "t".to_string(),
            results: vec![result("a", 1000.0)],
        };
        save_baseline(&path, &baseline).expect("save");
        let loaded = load_baseline(&path).expect("load");
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.results[0].workload, "a");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_markdown_has_row_per_result() {
        let md = format_markdown(&[result("a", 1.0), result("b", 2.0)]);
        assert_eq!(md.lines().count(), 4);
        assert!(md.contains("| a | 2 |"));
    }
}
