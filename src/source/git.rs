//! # Git CLI Fetcher
//!
//! Clones a branch with command-line git into a temporary directory, reads
//! every file of the working tree into memory and removes the clone again.
//! Command-line git is used instead of libgit2 to avoid OpenSSL dependency
//! issues.

use super::{BranchRef, Snapshot, SourceError, SourceFetcher, SourceKey};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, Instrument};
use walkdir::WalkDir;

/// Full-clone fetcher backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCliFetcher {
    git_binary: String,
    /// `None` lets every git invocation run to completion
    timeout: Option<Duration>,
}

impl GitCliFetcher {
    #[must_use]
    pub fn new(git_binary: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            git_binary: git_binary.into(),
            timeout,
        }
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output, String> {
        let mut cmd = tokio::process::Command::new(&self.git_binary);
        cmd.args(args)
            // Never block on a credential prompt inside the controller
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_elapsed| {
                    format!(
                        "git {} timed out after {}s",
                        args.first().unwrap_or(&""),
                        limit.as_secs()
                    )
                })?,
            None => cmd.output().await,
        };

        match result {
            Err(e) => Err(format!("failed to execute {}: {e}", self.git_binary)),
            Ok(output) if output.status.success() => Ok(output),
            Ok(output) => Err(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        }
    }

    async fn clone_into(&self, key: &SourceKey, target: &Path) -> Result<(), SourceError> {
        let target_str = target.to_string_lossy();
        let mut args = vec!["clone", "--quiet"];
        if let BranchRef::Named(branch) = &key.reference {
            args.extend(["--branch", branch.as_str(), "--single-branch"]);
        }
        args.extend(["--", key.repository.as_str(), &*target_str]);

        self.run_git(&args, None)
            .await
            .map(|_| ())
            .map_err(|message| SourceError::Unavailable {
                key: key.clone(),
                message,
            })
    }

    async fn head_commit(&self, key: &SourceKey, checkout: &Path) -> Result<String, SourceError> {
        let output = self
            .run_git(&["rev-parse", "HEAD"], Some(checkout))
            .await
            .map_err(|message| SourceError::History {
                key: key.clone(),
                message,
            })?;
        let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if commit.is_empty() {
            return Err(SourceError::History {
                key: key.clone(),
                message: "git rev-parse HEAD returned no commit".to_string(),
            });
        }
        Ok(commit)
    }
}

#[async_trait]
impl SourceFetcher for GitCliFetcher {
    async fn fetch(&self, key: &SourceKey) -> Result<Snapshot, SourceError> {
        let span = info_span!(
            "git.fetch",
            repository = %key.repository,
            branch = %key.reference
        );

        async move {
            let start = Instant::now();
            // Dropped at the end of this block, which deletes the clone
            let workdir = tempfile::tempdir().map_err(|e| SourceError::Unavailable {
                key: key.clone(),
                message: format!("cannot create temporary clone directory: {e}"),
            })?;
            let checkout = workdir.path().join("checkout");

            self.clone_into(key, &checkout).await?;
            let commit = self.head_commit(key, &checkout).await?;

            let files = tokio::task::spawn_blocking(move || read_tree(&checkout))
                .await
                .map_err(|e| SourceError::History {
                    key: key.clone(),
                    message: format!("tree reader panicked: {e}"),
                })?
                .map_err(|message| SourceError::History {
                    key: key.clone(),
                    message,
                })?;

            info!(
                commit = %commit,
                files = files.len(),
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "fetched repository snapshot"
            );
            Ok(Snapshot::new(commit, files))
        }
        .instrument(span)
        .await
    }
}

/// Read every regular file below `root`, skipping the `.git` directory
fn read_tree(root: &Path) -> Result<BTreeMap<String, Vec<u8>>, String> {
    let mut files = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| format!("cannot walk checkout: {e}"))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = relative_path(root, entry.path())?;
        let bytes = std::fs::read(entry.path())
            .map_err(|e| format!("cannot read {relative}: {e}"))?;
        debug!(path = %relative, bytes = bytes.len(), "read snapshot file");
        files.insert(relative, bytes);
    }
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> Result<String, String> {
    let relative: PathBuf = path
        .strip_prefix(root)
        .map_err(|e| format!("{} is outside the checkout: {e}", path.display()))?
        .to_path_buf();
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_tree_skips_git_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/master").unwrap();
        std::fs::create_dir_all(dir.path().join("apps/web")).unwrap();
        std::fs::write(dir.path().join("apps/web/deploy.yaml"), "kind: Deployment").unwrap();
        std::fs::write(dir.path().join("service.yaml"), "kind: Service").unwrap();

        let files = read_tree(dir.path()).unwrap();
        let paths: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["apps/web/deploy.yaml", "service.yaml"]);
        assert_eq!(files["service.yaml"], b"kind: Service".to_vec());
    }

    #[tokio::test]
    async fn test_missing_repository_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = GitCliFetcher::new("git", Some(Duration::from_secs(30)));
        let key = SourceKey {
            repository: dir.path().join("does-not-exist").to_string_lossy().to_string(),
            reference: BranchRef::Default,
        };

        let err = fetcher.fetch(&key).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_missing_git_binary_is_unavailable() {
        let fetcher = GitCliFetcher::new("/nonexistent/git-binary", None);
        let key = SourceKey {
            repository: "https://example.invalid/repo.git".to_string(),
            reference: BranchRef::Named("main".to_string()),
        };

        let err = fetcher.fetch(&key).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }), "got {err:?}");
    }
}
