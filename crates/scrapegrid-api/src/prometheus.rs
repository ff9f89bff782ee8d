//! Prometheus text exposition of the coordinator's own state.

use std::collections::BTreeMap;
use std::fmt::Write;

use scrapegrid_coordinator::CycleSnapshot;
use scrapegrid_explore::JobStats;

/// Render pool and explorer state in the text exposition format.
pub fn render_prometheus(snapshot: &CycleSnapshot, explore: &BTreeMap<String, JobStats>) -> String {
    let mut out = String::new();

    gauge(&mut out, "scrapegrid_shards", "Shards in the pool during the last cycle.", snapshot.shards.len());
    gauge(
        &mut out,
        "scrapegrid_shards_changeable",
        "Shards that accepted placement decisions in the last cycle.",
        snapshot.shards.iter().filter(|s| s.changeable).count(),
    );
    gauge(&mut out, "scrapegrid_desired_shards", "Pool size requested from the shard manager.", snapshot.desired_shards);
    gauge(&mut out, "scrapegrid_need_space_series", "Series demand no shard could absorb.", snapshot.need_space);
    gauge(
        &mut out,
        "scrapegrid_active_targets",
        "Targets currently discovered.",
        snapshot.active.values().map(Vec::len).sum::<usize>(),
    );

    out.push_str("# HELP scrapegrid_cycles_total Completed reconcile cycles.\n");
    out.push_str("# TYPE scrapegrid_cycles_total counter\n");
    let _ = writeln!(out, "scrapegrid_cycles_total {}", snapshot.cycles);

    out.push_str("# HELP scrapegrid_shard_head_series Head series reported by each shard.\n");
    out.push_str("# TYPE scrapegrid_shard_head_series gauge\n");
    for s in &snapshot.shards {
        let _ = writeln!(out, "scrapegrid_shard_head_series{{shard=\"{}\"}} {}", s.id, s.head_series);
    }

    out.push_str("# HELP scrapegrid_explored_total Successful explore scrapes.\n");
    out.push_str("# TYPE scrapegrid_explored_total counter\n");
    for (job, stats) in explore {
        let _ = writeln!(out, "scrapegrid_explored_total{{job=\"{job}\"}} {}", stats.explored);
    }

    out.push_str("# HELP scrapegrid_explore_failed_total Failed explore scrapes.\n");
    out.push_str("# TYPE scrapegrid_explore_failed_total counter\n");
    for (job, stats) in explore {
        let _ = writeln!(out, "scrapegrid_explore_failed_total{{job=\"{job}\"}} {}", stats.failed);
    }

    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}
