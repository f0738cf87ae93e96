//! Gitignore-style exclusion rules.
//!
//! Rules come from three ordered sources: CLI `--exclude` patterns first
//! (broadest), then the submission's `.gitignore`, then its `.graderignore`.
//! Matching follows gitignore precedence: the last matching rule wins, and a
//! leading `!` re-includes a previously excluded path. A matched directory is
//! pruned by the walker, so its contents are never visited.

use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

/// Per-submission ignore file read from the submission root only.
pub const GRADER_IGNORE_FILE: &str = ".graderignore";
pub const GIT_IGNORE_FILE: &str = ".gitignore";

/// Where a rule was declared. Later sources override earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Cli,
    GitIgnore,
    GraderIgnore,
}

#[derive(Debug)]
struct CompiledRule {
    pattern: String,
    globs: Vec<GlobMatcher>,
    negated: bool,
    dir_only: bool,
    source: RuleSource,
}

impl CompiledRule {
    /// Parse one pattern line. Blank lines, `#` comments, and malformed globs
    /// are skipped permissively.
    fn parse(raw: &str, source: RuleSource) -> Option<Self> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (negated, line) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, line) = match line.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        if line.is_empty() {
            return None;
        }

        // A slash anywhere except the end anchors the pattern to the
        // submission root; everything else matches at any depth.
        let anchored = line.starts_with('/') || line.trim_start_matches('/').contains('/');
        let body = line.trim_start_matches('/');

        let mut texts = vec![body.to_string()];
        if !anchored {
            texts.push(format!("**/{body}"));
        }

        let mut globs = Vec::with_capacity(texts.len());
        for text in &texts {
            match GlobBuilder::new(text).literal_separator(true).build() {
                Ok(glob) => globs.push(glob.compile_matcher()),
                Err(err) => {
                    debug!("skipping malformed ignore pattern {raw:?}: {err}");
                    return None;
                }
            }
        }

        Some(Self {
            pattern: raw.trim().to_string(),
            globs,
            negated,
            dir_only,
            source,
        })
    }

    fn is_match(&self, relative_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        self.globs.iter().any(|glob| glob.is_match(relative_path))
    }
}

/// An ordered set of compiled ignore rules for one submission.
///
/// Each rule keeps its own compiled glob rather than being merged into a
/// single `GlobSet`: gitignore precedence is positional, and a set loses
/// rule order.
#[derive(Debug, Default)]
pub struct IgnoreMatcher {
    rules: Vec<CompiledRule>,
}

impl IgnoreMatcher {
    /// Compile an ordered sequence of `(pattern, source)` pairs.
    pub fn compile<'a, I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, RuleSource)>,
    {
        let rules = patterns
            .into_iter()
            .filter_map(|(raw, source)| CompiledRule::parse(raw, source))
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `relative_path` (forward slashes, no leading `/`) is ignored.
    ///
    /// The last matching rule decides; unmatched paths are kept.
    pub fn matches(&self, relative_path: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.is_match(relative_path, is_dir) {
                ignored = !rule.negated;
                debug!(
                    "{:?} rule {:?} {} {}",
                    rule.source,
                    rule.pattern,
                    if ignored { "excludes" } else { "re-includes" },
                    relative_path
                );
            }
        }
        ignored
    }
}

/// Build the matcher for one submission: CLI patterns first, then the
/// submission's own ignore files (absence of either is not an error).
pub fn matcher_for_submission(root: &Path, cli_patterns: &[String]) -> IgnoreMatcher {
    let mut patterns: Vec<(String, RuleSource)> = cli_patterns
        .iter()
        .map(|p| (p.clone(), RuleSource::Cli))
        .collect();

    for (file, source) in [
        (GIT_IGNORE_FILE, RuleSource::GitIgnore),
        (GRADER_IGNORE_FILE, RuleSource::GraderIgnore),
    ] {
        if let Ok(contents) = fs::read_to_string(root.join(file)) {
            patterns.extend(contents.lines().map(|line| (line.to_string(), source)));
        }
    }

    IgnoreMatcher::compile(patterns.iter().map(|(p, s)| (p.as_str(), *s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> IgnoreMatcher {
        IgnoreMatcher::compile(patterns.iter().map(|p| (*p, RuleSource::Cli)))
    }

    #[test]
    fn unanchored_patterns_match_at_any_depth() {
        let m = matcher(&["*.pyc"]);
        assert!(m.matches("main.pyc", false));
        assert!(m.matches("src/deep/main.pyc", false));
        assert!(!m.matches("main.py", false));
    }

    #[test]
    fn leading_slash_anchors_to_root() {
        let m = matcher(&["/build"]);
        assert!(m.matches("build", true));
        assert!(!m.matches("src/build", true));
    }

    #[test]
    fn interior_slash_anchors_to_root() {
        let m = matcher(&["docs/*.md"]);
        assert!(m.matches("docs/readme.md", false));
        assert!(!m.matches("src/docs/readme.md", false));
    }

    #[test]
    fn trailing_slash_restricts_to_directories() {
        let m = matcher(&["target/"]);
        assert!(m.matches("target", true));
        assert!(!m.matches("target", false));
    }

    #[test]
    fn later_negation_re_includes() {
        let m = matcher(&["*.log", "!keep.log"]);
        assert!(m.matches("run.log", false));
        assert!(!m.matches("keep.log", false));
        assert!(!m.matches("nested/keep.log", false));
    }

    #[test]
    fn last_match_wins_in_declaration_order() {
        // The re-include is itself overridden by a later exclude.
        let m = matcher(&["*.log", "!keep.log", "keep.*"]);
        assert!(m.matches("keep.log", false));
    }

    #[test]
    fn star_does_not_cross_separators() {
        let m = matcher(&["/src/*.py"]);
        assert!(m.matches("src/a.py", false));
        assert!(!m.matches("src/nested/a.py", false));
    }

    #[test]
    fn double_star_crosses_separators() {
        let m = matcher(&["**/__pycache__/"]);
        assert!(m.matches("__pycache__", true));
        assert!(m.matches("src/__pycache__", true));
    }

    #[test]
    fn comments_blanks_and_bare_negations_are_skipped() {
        let m = matcher(&["# a comment", "", "   ", "!", "*.tmp"]);
        assert!(m.matches("x.tmp", false));
        assert!(!m.matches("x.py", false));
    }

    #[test]
    fn malformed_globs_are_skipped_permissively() {
        let m = matcher(&["[invalid", "*.tmp"]);
        assert!(m.matches("x.tmp", false));
        assert!(!m.matches("[invalid", false));
    }

    #[test]
    fn graderignore_overrides_cli_patterns() {
        // Concatenation order puts per-submission rules after CLI ones, so
        // they win conflicts in both directions.
        let m = IgnoreMatcher::compile([
            ("*.txt", RuleSource::Cli),
            ("!notes.txt", RuleSource::GraderIgnore),
        ]);
        assert!(m.matches("other.txt", false));
        assert!(!m.matches("notes.txt", false));
    }
}
