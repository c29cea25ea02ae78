use crate::output::print_json;
use crate::ticker::Ticker;
use anyhow::Context;
use flashpoint_core::config;
use flashpoint_core::liveness::LivenessProber;
use flashpoint_core::platform::{HerokuCli, LazyHerokuApi};
use flashpoint_core::reclaim::{AppOutcome, AppReclaimReport, ReclaimPolicy, Reclaimer};
use std::path::Path;

pub fn run(config_dir: &Path, force: bool, max_inactive_hours: i64, json: bool) -> anyhow::Result<()> {
    if max_inactive_hours < 0 {
        anyhow::bail!("--max-inactive-hours must not be negative");
    }

    // Every config is loaded before anything is destroyed.
    let projects: Vec<_> = config::load_all(config_dir)
        .with_context(|| format!("failed to load project configs from {}", config_dir.display()))?
        .into_iter()
        .map(|(_, cfg)| cfg)
        .collect();

    if projects.is_empty() {
        if json {
            print_json(&Vec::<AppReclaimReport>::new())?;
        } else {
            println!("No project configs in {}.", config_dir.display());
        }
        return Ok(());
    }

    let heroku = HerokuCli::default();
    let prober = LivenessProber::new(LazyHerokuApi::new(heroku.clone()));
    let policy = ReclaimPolicy {
        force,
        max_inactive_hours,
    };

    let ticker = Ticker::for_stderr(json);
    let reports = Reclaimer::new(&heroku, &prober, policy).reclaim_all(&projects);
    ticker.stop();

    if json {
        print_json(&reports)?;
    } else {
        for report in &reports {
            for line in summary_lines(report) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn summary_lines(report: &AppReclaimReport) -> Vec<String> {
    let who = format!("{} [{}]", report.project, report.app);
    let mut lines = match &report.outcome {
        AppOutcome::NoEntries => vec![format!("{who} has no running review apps.")],
        AppOutcome::NothingExpired { checked } => {
            vec![format!("{who} has no expired review apps ({checked} checked).")]
        }
        AppOutcome::Reclaimed {
            deleted,
            destroy_failures,
        } => {
            let mut lines = vec![format!(
                "{who} SUCCESS: {} review apps deleted.",
                report.removed_count()
            )];
            lines.extend(deleted.iter().map(|name| format!("  deleted {name}")));
            lines.extend(destroy_failures.iter().map(|f| {
                format!(
                    "  failed to destroy {} (dropped from registry): {}",
                    f.name, f.error
                )
            }));
            lines
        }
        AppOutcome::Skipped { reason } => vec![format!("{who} skipped: {reason}")],
    };
    lines.extend(
        report
            .probe_failures
            .iter()
            .map(|f| format!("  could not check {} (kept): {}", f.name, f.error)),
    );
    lines
}
