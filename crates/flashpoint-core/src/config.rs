use crate::error::{FlashpointError, Result};
use crate::naming::{MAX_APP_NAME_LEN, TOKEN_LEN};
use crate::{paths, vars};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptTarget {
    /// One-off dyno on the review app (`heroku run`).
    Remote,
    /// Shell in the local checkout.
    Local,
}

impl std::fmt::Display for ScriptTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptTarget::Remote => write!(f, "remote"),
            ScriptTarget::Local => write!(f, "local"),
        }
    }
}

/// A post-deploy command. In JSON either a bare string (runs remotely) or a
/// single-key object such as `{"local": "npm run seed"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScriptRepr", into = "ScriptRepr")]
pub struct Script {
    pub target: ScriptTarget,
    pub command: String,
}

impl Script {
    pub fn remote(command: impl Into<String>) -> Self {
        Self {
            target: ScriptTarget::Remote,
            command: command.into(),
        }
    }

    pub fn local(command: impl Into<String>) -> Self {
        Self {
            target: ScriptTarget::Local,
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ScriptRepr {
    Bare(String),
    Targeted(BTreeMap<ScriptTarget, String>),
}

impl TryFrom<ScriptRepr> for Script {
    type Error = String;

    fn try_from(repr: ScriptRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ScriptRepr::Bare(command) => Ok(Script::remote(command)),
            ScriptRepr::Targeted(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "a script object must have exactly one of \"remote\" or \"local\", found {} keys",
                        map.len()
                    ));
                }
                let (target, command) = map.into_iter().next().ok_or("empty script object")?;
                Ok(Script { target, command })
            }
        }
    }
}

impl From<Script> for ScriptRepr {
    fn from(script: Script) -> Self {
        ScriptRepr::Targeted(BTreeMap::from([(script.target, script.command)]))
    }
}

// ---------------------------------------------------------------------------
// AppSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSpec {
    pub name: String,
    pub parent_app_name: String,
    /// Local checkout of the template app. A leading `~/` is expanded.
    pub path: PathBuf,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    /// Branch on the review app that receives the push.
    #[serde(default = "default_deploy_branch")]
    pub deploy_branch: String,
}

fn default_deploy_branch() -> String {
    "master".to_string()
}

impl AppSpec {
    pub fn checkout(&self) -> PathBuf {
        paths::expand_home(&self.path)
    }

    pub fn registry_path(&self) -> PathBuf {
        paths::registry_path(&self.checkout())
    }

    pub fn git_config_path(&self) -> PathBuf {
        paths::git_config_path(&self.checkout())
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: String,
    #[serde(default)]
    pub apps: Vec<AppSpec>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FlashpointError::ConfigNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(path, &data)
    }

    pub fn parse(path: &Path, data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|source| FlashpointError::ConfigMalformed {
            path: path.to_path_buf(),
            source,
        })
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.apps.is_empty() {
            push(WarnLevel::Error, "no apps configured".to_string());
        }

        let mut seen = HashSet::new();
        for app in &self.apps {
            if app.name.trim().is_empty() {
                push(WarnLevel::Error, "an app has an empty name".to_string());
            } else if !seen.insert(app.name.as_str()) {
                push(
                    WarnLevel::Warning,
                    format!("app name '{}' is used more than once", app.name),
                );
            }

            if app.parent_app_name.trim().is_empty() {
                push(
                    WarnLevel::Error,
                    format!("app '{}' has an empty parent_app_name", app.name),
                );
            } else if 1 + TOKEN_LEN + 1 + app.parent_app_name.len() > MAX_APP_NAME_LEN {
                push(
                    WarnLevel::Warning,
                    format!(
                        "parent app '{}' is long; review app names will be truncated to {} characters",
                        app.parent_app_name, MAX_APP_NAME_LEN
                    ),
                );
            }

            if !app.checkout().is_dir() {
                push(
                    WarnLevel::Warning,
                    format!(
                        "path '{}' for app '{}' does not exist",
                        app.path.display(),
                        app.name
                    ),
                );
            }

            let texts = app
                .env
                .values()
                .chain(app.scripts.iter().map(|s| &s.command));
            for text in texts {
                for index in vars::referenced_indices(text) {
                    if index >= self.apps.len() {
                        push(
                            WarnLevel::Error,
                            format!(
                                "app '{}' references review app {} but only {} apps are configured",
                                app.name,
                                index,
                                self.apps.len()
                            ),
                        );
                    }
                }
            }

            for script in &app.scripts {
                if script.command.trim().is_empty() {
                    push(
                        WarnLevel::Warning,
                        format!("app '{}' has an empty {} script", app.name, script.target),
                    );
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Every `*.json` file under `dir`, recursively, sorted by path.
/// A missing directory yields no files.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if dir.is_dir() {
        walk(dir, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == paths::CONFIG_EXT) {
            found.push(path);
        }
    }
    Ok(())
}

/// Load every project config under `dir`. Fails on the first malformed file.
pub fn load_all(dir: &Path) -> Result<Vec<(PathBuf, ProjectConfig)>> {
    discover(dir)?
        .into_iter()
        .map(|path| ProjectConfig::load(&path).map(|cfg| (path, cfg)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
  "project": "shop",
  "apps": [
    {
      "name": "web",
      "parent_app_name": "shop-web",
      "path": "/src/web",
      "env": { "API_URL": "$REVIEW_APP_URLS[1]" },
      "scripts": ["rake db:migrate", { "local": "npm run seed" }]
    },
    {
      "name": "api",
      "parent_app_name": "shop-api",
      "path": "/src/api",
      "deploy_branch": "main"
    }
  ]
}"#;

    #[test]
    fn parses_sample_config() {
        let cfg = ProjectConfig::parse(Path::new("shop.json"), SAMPLE).unwrap();
        assert_eq!(cfg.project, "shop");
        assert_eq!(cfg.apps.len(), 2);
        let web = &cfg.apps[0];
        assert_eq!(web.env["API_URL"], "$REVIEW_APP_URLS[1]");
        assert_eq!(
            web.scripts,
            vec![Script::remote("rake db:migrate"), Script::local("npm run seed")]
        );
        assert_eq!(web.deploy_branch, "master");
        assert_eq!(cfg.apps[1].deploy_branch, "main");
        assert!(cfg.apps[1].env.is_empty());
        assert!(cfg.apps[1].scripts.is_empty());
    }

    #[test]
    fn script_object_with_two_targets_is_rejected() {
        let data = r#"{"project":"p","apps":[{"name":"a","parent_app_name":"b","path":"/x",
            "scripts":[{"remote":"one","local":"two"}]}]}"#;
        let err = ProjectConfig::parse(Path::new("p.json"), data).unwrap_err();
        assert!(matches!(err, FlashpointError::ConfigMalformed { .. }));
    }

    #[test]
    fn script_roundtrips_as_object() {
        let json = serde_json::to_string(&Script::local("make")).unwrap();
        assert_eq!(json, r#"{"local":"make"}"#);
        let back: Script = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Script::local("make"));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ProjectConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, FlashpointError::ConfigNotFound(_)));
    }

    #[test]
    fn load_malformed_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ProjectConfig::load(&path).unwrap_err();
        assert!(matches!(err, FlashpointError::ConfigMalformed { .. }));
    }

    #[test]
    fn validate_flags_out_of_range_tokens() {
        let mut cfg = ProjectConfig::parse(Path::new("shop.json"), SAMPLE).unwrap();
        cfg.apps[1]
            .env
            .insert("WEB".into(), "$REVIEW_APP_NAMES[2]".into());
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("references review app 2")));
        assert!(!warnings
            .iter()
            .any(|w| w.message.contains("references review app 1")));
    }

    #[test]
    fn validate_empty_project() {
        let cfg = ProjectConfig {
            project: "empty".into(),
            apps: vec![],
        };
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }

    #[test]
    fn validate_warns_on_missing_path_and_long_parent() {
        let data = r#"{"project":"p","apps":[{"name":"a",
            "parent_app_name":"a-very-long-parent-app-name","path":"/definitely/not/here"}]}"#;
        let cfg = ProjectConfig::parse(Path::new("p.json"), data).unwrap();
        let warnings = cfg.validate();
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Warning));
        assert!(warnings.iter().any(|w| w.message.contains("does not exist")));
        assert!(warnings.iter().any(|w| w.message.contains("truncated")));
    }

    #[test]
    fn discover_walks_recursively() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("team/nested")).unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("team/nested/a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let found = discover(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![
                dir.path().join("b.json"),
                dir.path().join("team/nested/a.json")
            ]
        );
    }

    #[test]
    fn discover_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(discover(&dir.path().join("none")).unwrap().is_empty());
    }

    #[test]
    fn load_all_stops_on_malformed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("good.json"), r#"{"project":"g","apps":[]}"#).unwrap();
        std::fs::write(dir.path().join("worse.json"), "[").unwrap();
        assert!(load_all(dir.path()).is_err());
    }
}
