//! Listing of refs advertised by a remote repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::common::error::VcsError;
use crate::common::operation::{operation, Retry, Timed, VcsOperation};
use crate::common::result::VcsResult;
use crate::domain::entities::server_config::ServerConfig;
use crate::domain::entities::vcs_root::VcsRootConfig;
use crate::domain::value_objects::ref_commit::{RefCommit, TAGS_PREFIX};
use crate::infrastructure::git::auth::AuthEnv;
use crate::infrastructure::git::git_detector::GitDetector;
use crate::infrastructure::process::git_command_line::GitCommandLine;
use crate::infrastructure::ssh::key_manager::VcsRootSshKeyManager;

const PEELED_SUFFIX: &str = "^{}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsRemoteOptions {
    /// Only list `refs/tags/*`.
    pub tags_only: bool,
    /// Ref name patterns, matched against the tail of the ref name.
    pub patterns: Vec<String>,
    /// Resolve annotated tags to the commit they point to.
    pub peel_refs: bool,
}

impl Default for LsRemoteOptions {
    fn default() -> Self {
        Self {
            tags_only: false,
            patterns: Vec::new(),
            peel_refs: true,
        }
    }
}

impl LsRemoteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags_only(mut self, tags_only: bool) -> Self {
        self.tags_only = tags_only;
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_peel_refs(mut self, peel_refs: bool) -> Self {
        self.peel_refs = peel_refs;
        self
    }

    /// Whether `ref_name` passes the tag filter and the patterns.
    pub fn accepts(&self, ref_name: &str) -> bool {
        let base = ref_name.strip_suffix(PEELED_SUFFIX).unwrap_or(ref_name);
        if self.tags_only && !base.starts_with(TAGS_PREFIX) {
            return false;
        }
        self.patterns.is_empty() || self.patterns.iter().any(|p| matches_pattern(base, p))
    }
}

/// `git ls-remote` pattern matching: the pattern matches whole trailing path components.
fn matches_pattern(ref_name: &str, pattern: &str) -> bool {
    ref_name == pattern || ref_name.ends_with(&format!("/{}", pattern.trim_start_matches('/')))
}

/// Lists refs of a remote repository.
#[async_trait]
pub trait LsRemoteCommand: Send + Sync {
    async fn ls_remote(
        &self,
        root: &VcsRootConfig,
        options: &LsRemoteOptions,
    ) -> VcsResult<Vec<RefCommit>>;
}

/// Collects advertised `(commit, ref)` pairs into ref commits.
///
/// With peeling, a `<ref>^{}` entry replaces the commit of the `<ref>` entry
/// advertised before it. Order of first advertisement is preserved.
pub fn collect_advertised_refs<I>(advertised: I, peel: bool) -> VcsResult<Vec<RefCommit>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut refs: Vec<RefCommit> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (commit, name) in advertised {
        if peel {
            if let Some(base) = name.strip_suffix(PEELED_SUFFIX) {
                let Some(&position) = index.get(base) else {
                    return Err(VcsError::internal_error(format!(
                        "Advertisement of {}^{{}} came before {}",
                        base, base
                    )));
                };
                refs[position] = RefCommit::tip(base, commit)?;
                continue;
            }
        }

        let ref_commit = RefCommit::tip(name.clone(), commit)?;
        match index.get(&name) {
            Some(&position) => refs[position] = ref_commit,
            None => {
                index.insert(name, refs.len());
                refs.push(ref_commit);
            }
        }
    }
    Ok(refs)
}

/// Parses `git ls-remote` output (`<sha>\t<ref>` per line).
pub fn parse_ls_remote_output(output: &str, peel: bool) -> VcsResult<Vec<RefCommit>> {
    let mut advertised = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (commit, name) = line
            .split_once(char::is_whitespace)
            .map(|(c, n)| (c.trim(), n.trim()))
            .filter(|(c, n)| is_object_id(c) && !n.is_empty())
            .ok_or_else(|| {
                VcsError::internal_error(format!("Unexpected ls-remote output line: {}", line))
            })?;
        advertised.push((commit.to_string(), name.to_string()));
    }
    collect_advertised_refs(advertised, peel)
}

fn is_object_id(s: &str) -> bool {
    (s.len() == 40 || s.len() == 64) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// `git ls-remote` through the native executable.
pub struct NativeLsRemoteCommand {
    detector: Arc<GitDetector>,
    key_manager: Arc<dyn VcsRootSshKeyManager>,
    config: Arc<ServerConfig>,
}

impl NativeLsRemoteCommand {
    pub fn new(
        detector: Arc<GitDetector>,
        key_manager: Arc<dyn VcsRootSshKeyManager>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            detector,
            key_manager,
            config,
        }
    }
}

#[async_trait]
impl LsRemoteCommand for NativeLsRemoteCommand {
    #[instrument(skip_all, fields(root = %root.id))]
    async fn ls_remote(
        &self,
        root: &VcsRootConfig,
        options: &LsRemoteOptions,
    ) -> VcsResult<Vec<RefCommit>> {
        let git = self.detector.detect().await?;
        let auth = AuthEnv::build(root, self.key_manager.as_ref(), &self.config.ssh)?;

        let mut cmd = GitCommandLine::new(&git.path)
            .arg("ls-remote")
            .envs(auth.env_vars.iter().cloned())
            .timeout(self.config.ls_remote_timeout());
        if options.tags_only {
            cmd = cmd.arg("--tags");
        }
        cmd = cmd
            .masked_arg(&auth.remote_url, &auth.display_url)
            .args(options.patterns.iter().cloned());

        let cmd = &cmd;
        let op = Timed::new(
            Retry::new(operation(|| cmd.run()), self.config.retry_policy())
                .with_description(format!("git ls-remote {}", auth.display_url)),
            "git ls-remote",
            &auth.display_url,
        );
        let output = op.call().await?;

        let refs: Vec<RefCommit> = parse_ls_remote_output(&output.stdout, options.peel_refs)?
            .into_iter()
            .filter(|r| options.accepts(r.ref_name()))
            .collect();
        debug!("{} advertised {} refs", auth.display_url, refs.len());
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: &str = "2c7e90053e0f7a5dd25ea2a16ef8909ba71826f6";
    const B: &str = "5f7b9e1b0a3b8c2d6e4f1a9b7c5d3e1f2a4b6c8d";
    const C: &str = "0123456789abcdef0123456789abcdef01234567";

    fn pairs(refs: &[RefCommit]) -> Vec<(String, String)> {
        refs.iter()
            .map(|r| (r.ref_name().to_string(), r.commit().to_string()))
            .collect()
    }

    #[test]
    fn test_parse_output_with_peeled_tag() {
        let output = format!(
            "{A}\tHEAD\n{A}\trefs/heads/main\n{B}\trefs/tags/v1.0\n{C}\trefs/tags/v1.0^{{}}\n"
        );
        let refs = parse_ls_remote_output(&output, true).unwrap();
        assert_eq!(
            pairs(&refs),
            vec![
                ("HEAD".to_string(), A.to_string()),
                ("refs/heads/main".to_string(), A.to_string()),
                ("refs/tags/v1.0".to_string(), C.to_string()),
            ]
        );
        assert!(refs.iter().all(|r| r.is_ref_tip()));
    }

    #[test]
    fn test_parse_output_without_peeling_keeps_entries() {
        let output = format!("{B}\trefs/tags/v1.0\n{C}\trefs/tags/v1.0^{{}}\n");
        let refs = parse_ls_remote_output(&output, false).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].commit(), B);
        assert_eq!(refs[1].ref_name(), "refs/tags/v1.0^{}");
    }

    #[test]
    fn test_peeled_before_ref_is_error() {
        let output = format!("{C}\trefs/tags/v1.0^{{}}\n{B}\trefs/tags/v1.0\n");
        let err = parse_ls_remote_output(&output, true).unwrap_err();
        assert!(err
            .to_string()
            .contains("Advertisement of refs/tags/v1.0^{} came before refs/tags/v1.0"));
    }

    #[test]
    fn test_malformed_line_is_error() {
        assert!(parse_ls_remote_output("not-a-sha\trefs/heads/main", true).is_err());
        assert!(parse_ls_remote_output(A, true).is_err());
        assert!(parse_ls_remote_output("\n\n", true).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_refs_keep_first_position() {
        let refs = collect_advertised_refs(
            vec![
                (A.to_string(), "refs/heads/a".to_string()),
                (B.to_string(), "refs/heads/b".to_string()),
                (C.to_string(), "refs/heads/a".to_string()),
            ],
            true,
        )
        .unwrap();
        assert_eq!(refs[0].ref_name(), "refs/heads/a");
        assert_eq!(refs[0].commit(), C);
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_options_filter() {
        let tags = LsRemoteOptions::new().tags_only(true);
        assert!(tags.accepts("refs/tags/v1"));
        assert!(tags.accepts("refs/tags/v1^{}"));
        assert!(!tags.accepts("refs/heads/main"));

        let patterns = LsRemoteOptions::new().with_patterns(vec!["main".to_string()]);
        assert!(patterns.accepts("refs/heads/main"));
        assert!(!patterns.accepts("refs/heads/domain"));
        assert!(LsRemoteOptions::new().accepts("HEAD"));
    }
}
