//! Fan-out provisioning of review apps.
//!
//! Every review-app name is generated before the first app is touched, so any
//! app's env vars and scripts can refer to any sibling through
//! `$REVIEW_APP_NAMES[i]` / `$REVIEW_APP_URLS[i]`. Apps are then provisioned
//! one at a time:
//!
//! 1. fork the parent app
//! 2. copy the parent's collaborators onto the fork
//! 3. register the fork in the app's registry (and include it in git config)
//! 4. set env vars
//! 5. force-push the chosen branch
//! 6. run scripts, remotely or locally
//!
//! The first failure aborts the run. Apps forked before the failure stay
//! registered and are cleaned up by reclamation.

use crate::config::{AppSpec, ProjectConfig, ScriptTarget};
use crate::error::{FlashpointError, Result};
use crate::naming::NameGenerator;
use crate::platform::PlatformClient;
use crate::registry::{self, RegistryEntry};
use crate::scm::{LocalShell, SourceControl};
use crate::{paths, vars};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProvisionedApp {
    pub app: String,
    pub review_app_name: String,
    pub url: String,
    pub branch: String,
    pub deploy_branch: String,
}

impl ProvisionedApp {
    /// The command that redeploys the branch to this review app.
    pub fn update_command(&self) -> String {
        format!(
            "git push -f {} {}:{}",
            self.review_app_name, self.branch, self.deploy_branch
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub project: String,
    pub apps: Vec<ProvisionedApp>,
}

/// One review-app name per app, in config order.
pub fn generate_names(config: &ProjectConfig, names: &mut NameGenerator) -> Vec<String> {
    config
        .apps
        .iter()
        .map(|app| names.review_app_name(&app.parent_app_name))
        .collect()
}

pub struct Provisioner<'a> {
    platform: &'a dyn PlatformClient,
    scm: &'a dyn SourceControl,
    shell: &'a dyn LocalShell,
}

fn step<T>(app: &AppSpec, step: &'static str, result: Result<T>) -> Result<T> {
    result.map_err(|e| FlashpointError::Step {
        app: app.name.clone(),
        step,
        source: Box::new(e),
    })
}

impl<'a> Provisioner<'a> {
    pub fn new(
        platform: &'a dyn PlatformClient,
        scm: &'a dyn SourceControl,
        shell: &'a dyn LocalShell,
    ) -> Self {
        Self {
            platform,
            scm,
            shell,
        }
    }

    /// Provision one review app per entry of `config.apps`. `branches[i]` is
    /// the local branch pushed for `config.apps[i]`.
    pub fn provision(
        &self,
        config: &ProjectConfig,
        branches: &[String],
        names: &mut NameGenerator,
    ) -> Result<ProvisionReport> {
        if branches.len() != config.apps.len() {
            return Err(FlashpointError::InvalidConfig(format!(
                "{} branches given for {} apps",
                branches.len(),
                config.apps.len()
            )));
        }

        let review_app_names = generate_names(config, names);
        tracing::info!(project = %config.project, names = ?review_app_names, "generated review app names");

        let mut provisioned = Vec::with_capacity(config.apps.len());
        for ((app, branch), review_app_name) in config
            .apps
            .iter()
            .zip(branches)
            .zip(&review_app_names)
        {
            self.provision_app(app, branch, review_app_name, &review_app_names)?;
            provisioned.push(ProvisionedApp {
                app: app.name.clone(),
                review_app_name: review_app_name.clone(),
                url: paths::app_url(review_app_name),
                branch: branch.clone(),
                deploy_branch: app.deploy_branch.clone(),
            });
        }

        Ok(ProvisionReport {
            project: config.project.clone(),
            apps: provisioned,
        })
    }

    fn provision_app(
        &self,
        app: &AppSpec,
        branch: &str,
        review_app_name: &str,
        all_names: &[String],
    ) -> Result<()> {
        let checkout = app.checkout();

        tracing::info!(app = %app.name, parent = %app.parent_app_name, review_app = %review_app_name, "forking");
        let out = step(app, "fork", self.platform.fork(&app.parent_app_name, review_app_name))?;
        tracing::debug!(app = %app.name, output = %out.trim());

        // Register before any step that can fail after the fork exists.
        tracing::info!(app = %app.name, registry = %app.registry_path().display(), "registering");
        step(
            app,
            "register",
            registry::append_entry(
                &app.registry_path(),
                &RegistryEntry::for_review_app(review_app_name),
            )
            .and_then(|_| registry::ensure_include_directive(&app.git_config_path())),
        )?;

        step(
            app,
            "copy collaborators",
            self.copy_collaborators(&app.parent_app_name, review_app_name),
        )?;

        if !app.env.is_empty() {
            let env: BTreeMap<String, String> = app
                .env
                .iter()
                .map(|(k, v)| (k.clone(), vars::evaluate(v, all_names)))
                .collect();
            tracing::info!(app = %app.name, keys = env.len(), "setting environment");
            let out = step(app, "set config", self.platform.set_config(review_app_name, &env))?;
            tracing::debug!(app = %app.name, output = %out.trim());
        }

        tracing::info!(app = %app.name, %branch, target = %app.deploy_branch, "pushing");
        let out = step(
            app,
            "push",
            self.scm
                .push_branch(&checkout, review_app_name, branch, &app.deploy_branch),
        )?;
        tracing::debug!(app = %app.name, output = %out.trim());

        for script in &app.scripts {
            let command = vars::evaluate(&script.command, all_names);
            tracing::info!(app = %app.name, target = %script.target, %command, "running script");
            let out = match script.target {
                ScriptTarget::Remote => step(
                    app,
                    "remote script",
                    self.platform.run_remote_script(review_app_name, &command),
                )?,
                ScriptTarget::Local => {
                    step(app, "local script", self.shell.run(&checkout, &command))?
                }
            };
            tracing::debug!(app = %app.name, output = %out.trim());
        }

        Ok(())
    }

    fn copy_collaborators(&self, parent: &str, review_app_name: &str) -> Result<()> {
        let wanted = self.platform.list_collaborators(parent)?;
        if wanted.is_empty() {
            return Ok(());
        }
        let present: HashSet<String> = self
            .platform
            .list_collaborators(review_app_name)?
            .into_iter()
            .collect();
        for identity in wanted.iter().filter(|id| !present.contains(*id)) {
            tracing::debug!(%review_app_name, %identity, "adding collaborator");
            self.platform.add_collaborator(review_app_name, identity)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Script;
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    /// Records every capability call as a readable line.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub calls: RefCell<Vec<String>>,
        pub fail_on: Option<&'static str>,
        pub collaborators: BTreeMap<String, Vec<String>>,
    }

    impl Recorder {
        fn record(&self, kind: &'static str, line: String) -> Result<String> {
            self.calls.borrow_mut().push(line.clone());
            if self.fail_on == Some(kind) {
                return Err(FlashpointError::Subprocess {
                    command: line,
                    output: "simulated failure".into(),
                });
            }
            Ok(String::new())
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl PlatformClient for Recorder {
        fn fork(&self, parent_app: &str, new_app: &str) -> Result<String> {
            self.record("fork", format!("fork {parent_app} {new_app}"))
        }

        fn set_config(&self, app: &str, vars: &BTreeMap<String, String>) -> Result<String> {
            let pairs: Vec<String> = vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
            self.record("set_config", format!("config {app} {}", pairs.join(" ")))
        }

        fn run_remote_script(&self, app: &str, command: &str) -> Result<String> {
            self.record("remote", format!("remote {app} {command}"))
        }

        fn destroy_app(&self, app: &str) -> Result<String> {
            self.record("destroy", format!("destroy {app}"))
        }

        fn list_collaborators(&self, app: &str) -> Result<Vec<String>> {
            self.calls.borrow_mut().push(format!("access {app}"));
            Ok(self.collaborators.get(app).cloned().unwrap_or_default())
        }

        fn add_collaborator(&self, app: &str, identity: &str) -> Result<()> {
            self.record("access_add", format!("access:add {app} {identity}"))
                .map(|_| ())
        }
    }

    impl SourceControl for Recorder {
        fn current_branch(&self, _repo: &Path) -> Result<String> {
            Ok("main".into())
        }

        fn push_branch(
            &self,
            _repo: &Path,
            remote: &str,
            branch: &str,
            target_branch: &str,
        ) -> Result<String> {
            self.record("push", format!("push {remote} {branch}:{target_branch}"))
        }
    }

    impl LocalShell for Recorder {
        fn run(&self, _dir: &Path, command: &str) -> Result<String> {
            self.record("local", format!("local {command}"))
        }
    }

    fn app(dir: &Path, name: &str, parent: &str) -> AppSpec {
        AppSpec {
            name: name.into(),
            parent_app_name: parent.into(),
            path: dir.join(name),
            env: BTreeMap::new(),
            scripts: vec![],
            deploy_branch: "master".into(),
        }
    }

    fn two_app_project(dir: &Path) -> ProjectConfig {
        let mut a = app(dir, "A", "app-a");
        a.env.insert("URL".into(), "$REVIEW_APP_URLS[1]".into());
        a.scripts = vec![
            Script::remote("rake db:migrate"),
            Script::local("notify $REVIEW_APP_NAMES[0]"),
        ];
        let b = app(dir, "B", "app-b");
        ProjectConfig {
            project: "shop".into(),
            apps: vec![a, b],
        }
    }

    fn branches() -> Vec<String> {
        vec!["feature-x".into(), "main".into()]
    }

    fn expected_names(seed: u64, cfg: &ProjectConfig) -> Vec<String> {
        generate_names(cfg, &mut NameGenerator::seeded(seed))
    }

    #[test]
    fn provisions_in_order_with_cross_app_substitution() {
        let dir = TempDir::new().unwrap();
        let cfg = two_app_project(dir.path());
        let names = expected_names(9, &cfg);
        let (a, b) = (&names[0], &names[1]);

        let rec = Recorder::default();
        let report = Provisioner::new(&rec, &rec, &rec)
            .provision(&cfg, &branches(), &mut NameGenerator::seeded(9))
            .unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                format!("fork app-a {a}"),
                "access app-a".to_string(),
                format!("config {a} URL=https://{b}.herokuapp.com"),
                format!("push {a} feature-x:master"),
                format!("remote {a} rake db:migrate"),
                format!("local notify {a}"),
                format!("fork app-b {b}"),
                "access app-b".to_string(),
                format!("push {b} main:master"),
            ]
        );
        assert_eq!(report.apps.len(), 2);
        assert_eq!(report.apps[1].url, format!("https://{b}.herokuapp.com"));
        assert_eq!(
            report.apps[0].update_command(),
            format!("git push -f {a} feature-x:master")
        );
    }

    #[test]
    fn registers_every_fork() {
        let dir = TempDir::new().unwrap();
        let cfg = two_app_project(dir.path());
        let names = expected_names(3, &cfg);
        let rec = Recorder::default();
        Provisioner::new(&rec, &rec, &rec)
            .provision(&cfg, &branches(), &mut NameGenerator::seeded(3))
            .unwrap();

        for (app, name) in cfg.apps.iter().zip(&names) {
            assert_eq!(
                registry::list_entries(&app.registry_path()).unwrap(),
                vec![name.clone()]
            );
            let git_config = std::fs::read_to_string(app.git_config_path()).unwrap();
            assert!(git_config.contains("path = ./flashpointrepos"));
        }
    }

    #[test]
    fn copies_missing_collaborators() {
        let dir = TempDir::new().unwrap();
        let cfg = ProjectConfig {
            project: "solo".into(),
            apps: vec![app(dir.path(), "web", "shop-web")],
        };
        let name = expected_names(5, &cfg).remove(0);
        let mut rec = Recorder::default();
        rec.collaborators.insert(
            "shop-web".into(),
            vec!["owner@example.com".into(), "dev@example.com".into()],
        );
        rec.collaborators
            .insert(name.clone(), vec!["owner@example.com".into()]);

        Provisioner::new(&rec, &rec, &rec)
            .provision(&cfg, &["main".into()], &mut NameGenerator::seeded(5))
            .unwrap();

        let adds: Vec<String> = rec
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("access:add"))
            .collect();
        assert_eq!(adds, vec![format!("access:add {name} dev@example.com")]);
    }

    #[test]
    fn failure_aborts_remaining_apps() {
        let dir = TempDir::new().unwrap();
        let cfg = two_app_project(dir.path());
        let rec = Recorder {
            fail_on: Some("push"),
            ..Default::default()
        };
        let err = Provisioner::new(&rec, &rec, &rec)
            .provision(&cfg, &branches(), &mut NameGenerator::seeded(1))
            .unwrap_err();

        match &err {
            FlashpointError::Step { app, step, .. } => {
                assert_eq!(app, "A");
                assert_eq!(*step, "push");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let calls = rec.calls();
        assert!(calls.last().unwrap().starts_with("push "));
        assert!(!calls.iter().any(|c| c.starts_with("fork app-b")));
        // The fork that did happen is still registered for reclamation.
        assert_eq!(
            registry::list_entries(&cfg.apps[0].registry_path())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn fork_stays_registered_when_collaborator_copy_fails() {
        let dir = TempDir::new().unwrap();
        let cfg = ProjectConfig {
            project: "solo".into(),
            apps: vec![app(dir.path(), "web", "shop-web")],
        };
        let name = expected_names(7, &cfg).remove(0);
        let mut rec = Recorder {
            fail_on: Some("access_add"),
            ..Default::default()
        };
        rec.collaborators
            .insert("shop-web".into(), vec!["dev@example.com".into()]);

        let err = Provisioner::new(&rec, &rec, &rec)
            .provision(&cfg, &["main".into()], &mut NameGenerator::seeded(7))
            .unwrap_err();

        assert!(matches!(
            err,
            FlashpointError::Step {
                step: "copy collaborators",
                ..
            }
        ));
        assert_eq!(
            registry::list_entries(&cfg.apps[0].registry_path()).unwrap(),
            vec![name]
        );
        assert!(!rec.calls().iter().any(|c| c.starts_with("push ")));
    }

    #[test]
    fn branch_count_mismatch_is_rejected_before_any_call() {
        let dir = TempDir::new().unwrap();
        let cfg = two_app_project(dir.path());
        let rec = Recorder::default();
        let err = Provisioner::new(&rec, &rec, &rec)
            .provision(&cfg, &["main".into()], &mut NameGenerator::seeded(1))
            .unwrap_err();
        assert!(matches!(err, FlashpointError::InvalidConfig(_)));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn scenario_names_resolve_sibling_url() {
        let dir = TempDir::new().unwrap();
        let cfg = two_app_project(dir.path());
        let names = vec!["zabc123-app-a".to_string(), "zdef456-app-b".to_string()];
        assert_eq!(
            vars::evaluate(&cfg.apps[0].env["URL"], &names),
            "https://zdef456-app-b.herokuapp.com"
        );
    }
}
