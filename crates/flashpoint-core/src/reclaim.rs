//! Registry-driven reclamation of expired review apps.
//!
//! For every app of every project, the registry lists the review apps that
//! were forked from it. Each one is probed; those that are gone, idle past the
//! policy threshold, or (in force mode) all of them are destroyed and dropped
//! from the registry in a single rewrite.
//!
//! Reclamation favours progress over consistency: a failed destroy is recorded
//! and the entry is still removed, a failed probe keeps the entry and moves on,
//! and a corrupt registry skips only that app.

use crate::config::{AppSpec, ProjectConfig};
use crate::liveness::{Probe, DEFAULT_MAX_INACTIVE_HOURS};
use crate::platform::PlatformClient;
use crate::registry;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
pub struct ReclaimPolicy {
    /// Destroy every registered review app regardless of activity.
    pub force: bool,
    pub max_inactive_hours: i64,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            force: false,
            max_inactive_hours: DEFAULT_MAX_INACTIVE_HOURS,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Failure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppOutcome {
    /// The registry is missing or empty.
    NoEntries,
    NothingExpired { checked: usize },
    Reclaimed {
        deleted: Vec<String>,
        destroy_failures: Vec<Failure>,
    },
    /// The registry could not be read; nothing was touched.
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AppReclaimReport {
    pub project: String,
    pub app: String,
    #[serde(flatten)]
    pub outcome: AppOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub probe_failures: Vec<Failure>,
}

impl AppReclaimReport {
    /// Review apps dropped from the registry, destroyed or not.
    pub fn removed_count(&self) -> usize {
        match &self.outcome {
            AppOutcome::Reclaimed {
                deleted,
                destroy_failures,
            } => deleted.len() + destroy_failures.len(),
            _ => 0,
        }
    }
}

pub struct Reclaimer<'a> {
    platform: &'a dyn PlatformClient,
    prober: &'a dyn Probe,
    policy: ReclaimPolicy,
}

impl<'a> Reclaimer<'a> {
    pub fn new(platform: &'a dyn PlatformClient, prober: &'a dyn Probe, policy: ReclaimPolicy) -> Self {
        Self {
            platform,
            prober,
            policy,
        }
    }

    /// Reclaim across every loaded project, app by app.
    pub fn reclaim_all(&self, projects: &[ProjectConfig]) -> Vec<AppReclaimReport> {
        projects
            .iter()
            .flat_map(|cfg| self.reclaim_project(cfg))
            .collect()
    }

    pub fn reclaim_project(&self, config: &ProjectConfig) -> Vec<AppReclaimReport> {
        config
            .apps
            .iter()
            .map(|app| self.reclaim_app(&config.project, app))
            .collect()
    }

    pub fn reclaim_app(&self, project: &str, app: &AppSpec) -> AppReclaimReport {
        let mut report = AppReclaimReport {
            project: project.to_string(),
            app: app.name.clone(),
            outcome: AppOutcome::NoEntries,
            probe_failures: Vec::new(),
        };
        let registry_path = app.registry_path();

        let names = match registry::list_entries(&registry_path) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(%project, app = %app.name, error = %e, "skipping app with unreadable registry");
                report.outcome = AppOutcome::Skipped {
                    reason: e.to_string(),
                };
                return report;
            }
        };
        if names.is_empty() {
            tracing::info!(%project, app = %app.name, "no review apps registered");
            return report;
        }

        let mut marked = Vec::new();
        for name in &names {
            if self.policy.force {
                marked.push(name.clone());
                continue;
            }
            match self.prober.probe(name) {
                Ok(status) if status.is_expired(self.policy.max_inactive_hours) => {
                    tracing::info!(%project, app = %app.name, review_app = %name, %status, "expired");
                    marked.push(name.clone());
                }
                Ok(status) => {
                    tracing::debug!(%project, app = %app.name, review_app = %name, %status, "keeping");
                }
                Err(e) => {
                    tracing::warn!(%project, app = %app.name, review_app = %name, error = %e, "probe failed, keeping entry");
                    report.probe_failures.push(Failure {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if marked.is_empty() {
            report.outcome = AppOutcome::NothingExpired {
                checked: names.len(),
            };
            return report;
        }

        let mut deleted = Vec::new();
        let mut destroy_failures = Vec::new();
        for name in &marked {
            match self.platform.destroy_app(name) {
                Ok(out) => {
                    tracing::info!(%project, app = %app.name, review_app = %name, "destroyed");
                    tracing::debug!(output = %out.trim());
                    deleted.push(name.clone());
                }
                Err(e) => {
                    tracing::warn!(%project, app = %app.name, review_app = %name, error = %e, "destroy failed, removing entry anyway");
                    destroy_failures.push(Failure {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let marked_set: HashSet<String> = marked.into_iter().collect();
        if let Err(e) = registry::remove_entries(&registry_path, &marked_set) {
            tracing::warn!(%project, app = %app.name, error = %e, "failed to rewrite registry");
            report.outcome = AppOutcome::Skipped {
                reason: format!("destroyed apps but could not rewrite registry: {e}"),
            };
            return report;
        }

        report.outcome = AppOutcome::Reclaimed {
            deleted,
            destroy_failures,
        };
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
