use crate::output::print_json;
use crate::ticker::Ticker;
use anyhow::Context;
use flashpoint_core::config::{ProjectConfig, WarnLevel};
use flashpoint_core::naming::NameGenerator;
use flashpoint_core::platform::HerokuCli;
use flashpoint_core::provision::{ProvisionReport, Provisioner};
use flashpoint_core::scm::{GitCli, SourceControl, Sh};
use flashpoint_core::{paths, process};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

pub fn run(
    config_dir: &Path,
    config_name: &str,
    branch_overrides: Vec<(String, String)>,
    seed: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();

    let path = paths::project_config_path(config_dir, config_name);
    let config = ProjectConfig::load(&path)
        .with_context(|| format!("failed to load project config {}", path.display()))?;
    check_config(&config)?;

    for program in ["heroku", "git"] {
        process::resolve_program(program)?;
    }

    let git = GitCli;
    let branches = resolve_branches(&config, branch_overrides, &git)?;
    let mut names = match seed {
        Some(seed) => NameGenerator::seeded(seed),
        None => NameGenerator::from_entropy(),
    };

    let heroku = HerokuCli::default();
    let ticker = Ticker::for_stderr(json);
    let result = Provisioner::new(&heroku, &git, &Sh).provision(&config, &branches, &mut names);
    ticker.stop();

    let report = result.context(
        "provisioning stopped; review apps created so far stay registered for `flashpoint reclaim`",
    )?;

    if json {
        print_json(&serde_json::json!({
            "project": report.project,
            "apps": report.apps.iter().map(|a| serde_json::json!({
                "app": a.app,
                "review_app_name": a.review_app_name,
                "url": a.url,
                "branch": a.branch,
                "deploy_branch": a.deploy_branch,
                "update_command": a.update_command(),
            })).collect::<Vec<_>>(),
            "elapsed_secs": started.elapsed().as_secs_f64(),
        }))?;
    } else {
        print_report(&report, started);
    }
    Ok(())
}

fn check_config(config: &ProjectConfig) -> anyhow::Result<()> {
    let warnings = config.validate();
    for w in &warnings {
        if w.level == WarnLevel::Warning {
            tracing::warn!("{}", w.message);
        }
    }
    let errors: Vec<&str> = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message.as_str())
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid project config: {}", errors.join("; "));
    }
    Ok(())
}

/// One branch per app, in config order: an explicit `APP=BRANCH` override, or
/// whatever the app's checkout has checked out.
fn resolve_branches(
    config: &ProjectConfig,
    overrides: Vec<(String, String)>,
    scm: &dyn SourceControl,
) -> anyhow::Result<Vec<String>> {
    let mut overrides: BTreeMap<String, String> = overrides.into_iter().collect();
    for name in overrides.keys() {
        if !config.apps.iter().any(|a| &a.name == name) {
            anyhow::bail!("--branch names unknown app '{name}'");
        }
    }

    config
        .apps
        .iter()
        .map(|app| match overrides.remove(&app.name) {
            Some(branch) => Ok(branch),
            None => scm.current_branch(&app.checkout()).with_context(|| {
                format!(
                    "cannot determine the current branch of '{}' in {}",
                    app.name,
                    app.checkout().display()
                )
            }),
        })
        .collect()
}

fn print_report(report: &ProvisionReport, started: Instant) {
    println!("ALL DONE");
    println!("==============================");
    for app in &report.apps {
        println!();
        println!("{}", app.app);
        println!("  URL:            {}", app.url);
        println!("  Branch:         {}", app.branch);
        println!("  Update command: {}", app.update_command());
    }
    println!();
    println!(
        "IMPORTANT: run `flashpoint reclaim` regularly; it destroys review apps idle for more than 5 days."
    );
    println!(
        "Flashpoint took {:.1} seconds",
        started.elapsed().as_secs_f64()
    );
}
