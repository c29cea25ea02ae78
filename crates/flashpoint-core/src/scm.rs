//! Local capabilities: git for branches and pushes, a shell for local scripts.

use crate::error::{FlashpointError, Result};
use crate::process;
use std::path::Path;

pub trait SourceControl {
    /// Name of the branch checked out in `repo`.
    fn current_branch(&self, repo: &Path) -> Result<String>;

    /// Force-push `branch` to `target_branch` on `remote`.
    fn push_branch(&self, repo: &Path, remote: &str, branch: &str, target_branch: &str)
        -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl SourceControl for GitCli {
    fn current_branch(&self, repo: &Path) -> Result<String> {
        let out = process::run("git", &["symbolic-ref", "--short", "HEAD"], Some(repo))?;
        let branch = out.trim();
        if branch.is_empty() {
            return Err(FlashpointError::Subprocess {
                command: "git symbolic-ref --short HEAD".to_string(),
                output: format!("no branch checked out in {}", repo.display()),
            });
        }
        Ok(branch.to_string())
    }

    fn push_branch(
        &self,
        repo: &Path,
        remote: &str,
        branch: &str,
        target_branch: &str,
    ) -> Result<String> {
        let refspec = format!("{branch}:{target_branch}");
        process::run(
            "git",
            &["push", "-u", "-f", "--no-verify", remote, &refspec],
            Some(repo),
        )
    }
}

pub trait LocalShell {
    /// Run `command` through the shell with `dir` as working directory.
    fn run(&self, dir: &Path, command: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct Sh;

impl LocalShell for Sh {
    fn run(&self, dir: &Path, command: &str) -> Result<String> {
        process::run("sh", &["-c", command], Some(dir))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        process::run("git", args, Some(dir)).unwrap();
    }

    #[test]
    fn shell_runs_in_directory() {
        let dir = TempDir::new().unwrap();
        Sh.run(dir.path(), "echo seeded > out.txt").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "seeded\n"
        );
    }

    #[test]
    fn shell_failure_propagates() {
        let dir = TempDir::new().unwrap();
        assert!(Sh.run(dir.path(), "false").is_err());
    }

    #[test]
    fn current_branch_of_fresh_repo() {
        if process::resolve_program("git").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/feature/login"]);
        assert_eq!(GitCli.current_branch(dir.path()).unwrap(), "feature/login");
    }
}
