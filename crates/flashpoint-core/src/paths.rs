use crate::error::{FlashpointError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CONFIG_DIR: &str = ".flashpoint";
pub const CONFIG_EXT: &str = "json";

pub const GIT_DIR: &str = ".git";
pub const GIT_CONFIG_FILE: &str = "config";
pub const REGISTRY_FILE: &str = "flashpointrepos";
pub const REGISTRY_LOCK_SUFFIX: &str = ".lock";

pub const PLATFORM_GIT_HOST: &str = "git.heroku.com";
pub const PLATFORM_APP_DOMAIN: &str = "herokuapp.com";
pub const PLATFORM_API_URL: &str = "https://api.heroku.com";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `~/.flashpoint`, the default home of project configuration files.
pub fn default_config_dir() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(FlashpointError::HomeNotFound)?;
    Ok(home.join(CONFIG_DIR))
}

/// Resolve a project config argument: an existing path is used as-is,
/// otherwise `<config_dir>/<name>.json`.
pub fn project_config_path(config_dir: &Path, name: &str) -> PathBuf {
    let direct = Path::new(name);
    if direct.is_file() {
        return direct.to_path_buf();
    }
    let suffix = format!(".{CONFIG_EXT}");
    if name.ends_with(&suffix) {
        config_dir.join(name)
    } else {
        config_dir.join(format!("{name}{suffix}"))
    }
}

pub fn registry_path(app_checkout: &Path) -> PathBuf {
    app_checkout.join(GIT_DIR).join(REGISTRY_FILE)
}

pub fn registry_lock_path(registry: &Path) -> PathBuf {
    let mut name = registry
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| REGISTRY_FILE.into());
    name.push(REGISTRY_LOCK_SUFFIX);
    registry.with_file_name(name)
}

pub fn git_config_path(app_checkout: &Path) -> PathBuf {
    app_checkout.join(GIT_DIR).join(GIT_CONFIG_FILE)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match home::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Platform naming
// ---------------------------------------------------------------------------

pub fn app_url(app_name: &str) -> String {
    format!("https://{app_name}.{PLATFORM_APP_DOMAIN}")
}

pub fn app_git_url(app_name: &str) -> String {
    format!("https://{PLATFORM_GIT_HOST}/{app_name}.git")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
