use crate::output::{print_json, print_table};
use anyhow::Context;
use flashpoint_core::config::{self, ProjectConfig};
use flashpoint_core::{paths, registry};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ListedApp {
    project: String,
    app: String,
    review_apps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(config_dir: &Path, config_name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let projects = match config_name {
        Some(name) => {
            let path = paths::project_config_path(config_dir, name);
            vec![ProjectConfig::load(&path)
                .with_context(|| format!("failed to load project config {}", path.display()))?]
        }
        None => config::load_all(config_dir)
            .context("failed to load project configs")?
            .into_iter()
            .map(|(_, cfg)| cfg)
            .collect(),
    };

    let listed: Vec<ListedApp> = projects
        .iter()
        .flat_map(|cfg| {
            cfg.apps.iter().map(|app| {
                let (review_apps, error) = match registry::list_entries(&app.registry_path()) {
                    Ok(names) => (names, None),
                    Err(e) => (Vec::new(), Some(e.to_string())),
                };
                ListedApp {
                    project: cfg.project.clone(),
                    app: app.name.clone(),
                    review_apps,
                    error,
                }
            })
        })
        .collect();

    if json {
        return print_json(&listed);
    }

    let mut rows = Vec::new();
    for item in &listed {
        if let Some(error) = &item.error {
            rows.push(vec![
                item.project.clone(),
                item.app.clone(),
                "-".to_string(),
                format!("unreadable registry: {error}"),
            ]);
            continue;
        }
        for name in &item.review_apps {
            rows.push(vec![
                item.project.clone(),
                item.app.clone(),
                name.clone(),
                paths::app_url(name),
            ]);
        }
    }

    if rows.is_empty() {
        println!("No review apps registered.");
    } else {
        print_table(&["PROJECT", "APP", "REVIEW APP", "URL"], rows);
    }
    Ok(())
}
