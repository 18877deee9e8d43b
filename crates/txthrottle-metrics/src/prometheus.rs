//! Prometheus text exposition format.
//!
//! Renders the throttler metrics for scraping by a Prometheus server or
//! compatible agent.

use crate::collector::ThrottlerMetrics;

/// Render all throttler metrics into Prometheus text format.
pub fn render_prometheus(metrics: &ThrottlerMetrics) -> String {
    let mut out = String::new();

    out.push_str("# HELP transaction_throttler_running Transaction throttler running state.\n");
    out.push_str("# TYPE transaction_throttler_running gauge\n");
    out.push_str(&format!(
        "transaction_throttler_running {}\n",
        i64::from(metrics.is_running())
    ));

    out.push_str("# HELP transaction_throttler_topo_watchers Transaction throttler topology watchers.\n");
    out.push_str("# TYPE transaction_throttler_topo_watchers gauge\n");
    for (cell, count) in metrics.topo_watcher_snapshot() {
        let cell = escape_label_value(&cell);
        out.push_str(&format!(
            "transaction_throttler_topo_watchers{{cell=\"{cell}\"}} {count}\n"
        ));
    }

    out.push_str("# HELP transaction_throttler_healthchecks_read Transaction throttler healthchecks read.\n");
    out.push_str("# TYPE transaction_throttler_healthchecks_read counter\n");
    for ((cell, tablet_type), count) in metrics.healthchecks_read_snapshot() {
        let cell = escape_label_value(&cell);
        out.push_str(&format!(
            "transaction_throttler_healthchecks_read{{cell=\"{cell}\",db_type=\"{tablet_type}\"}} {count}\n"
        ));
    }

    out.push_str("# HELP transaction_throttler_healthchecks_recorded Transaction throttler healthchecks recorded.\n");
    out.push_str("# TYPE transaction_throttler_healthchecks_recorded counter\n");
    for ((cell, tablet_type), count) in metrics.healthchecks_recorded_snapshot() {
        let cell = escape_label_value(&cell);
        out.push_str(&format!(
            "transaction_throttler_healthchecks_recorded{{cell=\"{cell}\",db_type=\"{tablet_type}\"}} {count}\n"
        ));
    }

    out.push_str("# HELP transaction_throttler_requests Transaction throttler requests.\n");
    out.push_str("# TYPE transaction_throttler_requests counter\n");
    for (workload, count) in metrics.requests_snapshot() {
        let workload = escape_label_value(&workload);
        out.push_str(&format!(
            "transaction_throttler_requests{{workload=\"{workload}\"}} {count}\n"
        ));
    }

    out.push_str("# HELP transaction_throttler_throttled Transaction throttler requests throttled.\n");
    out.push_str("# TYPE transaction_throttler_throttled counter\n");
    for (workload, count) in metrics.throttled_snapshot() {
        let workload = escape_label_value(&workload);
        out.push_str(&format!(
            "transaction_throttler_throttled{{workload=\"{workload}\"}} {count}\n"
        ));
    }

    out
}

/// Escape a label value for the text format: `\`, `"` and newline.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
