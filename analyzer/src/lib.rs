//! Statistics over persisted feedback artifacts.
//!
//! Consumes only the orchestrator's output directory: every `*_feedback.md`
//! is classified as graded or failed from its contents alone (via the stable
//! error marker), total scores are parsed out of the graded ones, and the
//! whole lot is rendered as a markdown report.

use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use common::artifact;

static SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)").unwrap());

/// One graded submission's parsed total.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub submission: String,
    pub score: f64,
    pub out_of: f64,
}

/// Classification of everything found in the output directory.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Graded submissions with a parseable total, in file order.
    pub scores: Vec<ScoreEntry>,
    /// Graded submissions where no `x/y` total could be found.
    pub unparsed: Vec<String>,
    /// Submissions whose artifact carries the error marker.
    pub failed: Vec<String>,
}

impl Analysis {
    pub fn graded(&self) -> usize {
        self.scores.len() + self.unparsed.len()
    }

    pub fn total(&self) -> usize {
        self.graded() + self.failed.len()
    }
}

/// Summary statistics over the parsed scores.
#[derive(Debug)]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    pub mean_pct: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    /// The common scale, when every submission was graded on the same one.
    pub out_of: Option<f64>,
    /// `score/out_of` label -> count, highest label first.
    pub distribution: Vec<(String, usize)>,
}

/// Read and classify every feedback artifact under `output_dir`.
pub fn analyze_outputs(output_dir: &Path) -> io::Result<Analysis> {
    let mut names: Vec<String> = fs::read_dir(output_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| artifact::submission_name(name).is_some())
        .collect();
    names.sort();

    let mut analysis = Analysis::default();
    for file_name in names {
        let submission = artifact::submission_name(&file_name)
            .expect("filtered above")
            .to_string();
        let contents = match fs::read_to_string(output_dir.join(&file_name)) {
            Ok(contents) => contents,
            Err(err) => {
                debug!("skipping unreadable artifact {file_name}: {err}");
                continue;
            }
        };

        if artifact::is_error_artifact(&contents) {
            analysis.failed.push(submission);
        } else {
            match parse_score(&contents) {
                Some((score, out_of)) => analysis.scores.push(ScoreEntry {
                    submission,
                    score,
                    out_of,
                }),
                None => analysis.unparsed.push(submission),
            }
        }
    }
    Ok(analysis)
}

/// Extract the total score from feedback text: a line mentioning "total"
/// first, then the last `x/y` anywhere in the file as a fallback.
fn parse_score(text: &str) -> Option<(f64, f64)> {
    let from_total_line = text
        .lines()
        .filter(|line| line.to_lowercase().contains("total"))
        .find_map(|line| SCORE.captures(line));

    let caps = match from_total_line {
        Some(caps) => caps,
        None => SCORE.captures_iter(text).last()?,
    };
    let score: f64 = caps[1].parse().ok()?;
    let out_of: f64 = caps[2].parse().ok()?;
    (out_of > 0.0).then_some((score, out_of))
}

impl Analysis {
    /// Compute summary statistics; `None` when nothing parseable was graded.
    pub fn stats(&self) -> Option<Stats> {
        if self.scores.is_empty() {
            return None;
        }

        let raw: Vec<f64> = self.scores.iter().map(|s| s.score).collect();
        let pcts: Vec<f64> = self
            .scores
            .iter()
            .map(|s| s.score / s.out_of * 100.0)
            .collect();

        let count = raw.len();
        let mean = raw.iter().sum::<f64>() / count as f64;
        let mean_pct = pcts.iter().sum::<f64>() / count as f64;

        let mut sorted = raw.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("scores are finite"));
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };

        // Sample standard deviation, zero for a single data point.
        let std_dev = if count > 1 {
            let variance =
                raw.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        let first_out_of = self.scores[0].out_of;
        let out_of = self
            .scores
            .iter()
            .all(|s| (s.out_of - first_out_of).abs() < f64::EPSILON)
            .then_some(first_out_of);

        let mut distribution: Vec<(String, usize)> = Vec::new();
        for entry in &self.scores {
            let key = format!("{}/{}", entry.score.trunc() as i64, entry.out_of.trunc() as i64);
            match distribution.iter_mut().find(|(k, _)| *k == key) {
                Some((_, n)) => *n += 1,
                None => distribution.push((key, 1)),
            }
        }
        distribution.sort_by(|a, b| b.0.cmp(&a.0));

        Some(Stats {
            count,
            mean: round2(mean),
            mean_pct: round1(mean_pct),
            median: round2(median),
            min: sorted[0],
            max: sorted[count - 1],
            std_dev: round2(std_dev),
            out_of,
            distribution,
        })
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Render the analysis as a readable markdown report.
pub fn format_stats_report(analysis: &Analysis, output_dir: &Path) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("# Grading Statistics".to_string());
    lines.push(String::new());
    lines.push(format!("**Output directory:** `{}`", output_dir.display()));
    lines.push(String::new());

    let Some(stats) = analysis.stats() else {
        lines.push("No graded feedback files found.".to_string());
        if !analysis.failed.is_empty() {
            lines.push(format!("Error files: {}", analysis.failed.len()));
        }
        return lines.join("\n");
    };

    let out_of_label = stats
        .out_of
        .map(|v| format!("{v}"))
        .unwrap_or_else(|| "?".to_string());

    lines.push("## Summary".to_string());
    lines.push(String::new());
    lines.push("| Metric | Value |".to_string());
    lines.push("|--------|-------|".to_string());
    lines.push(format!("| Graded | {} |", stats.count));
    lines.push(format!("| Errors | {} |", analysis.failed.len()));
    lines.push(format!("| Total submissions | {} |", analysis.total()));
    lines.push(format!(
        "| Mean score | {}/{} ({}%) |",
        stats.mean, out_of_label, stats.mean_pct
    ));
    lines.push(format!("| Median score | {} |", stats.median));
    lines.push(format!("| Min | {} |", stats.min));
    lines.push(format!("| Max | {} |", stats.max));
    lines.push(format!("| Std dev | {} |", stats.std_dev));
    lines.push(String::new());

    if !stats.distribution.is_empty() {
        lines.push("## Score distribution".to_string());
        lines.push(String::new());
        lines.push("| Score | Count |".to_string());
        lines.push("|-------|-------|".to_string());
        for (label, count) in &stats.distribution {
            lines.push(format!("| {label} | {count} |"));
        }
        lines.push(String::new());
    }

    if !analysis.failed.is_empty() {
        lines.push("## Submissions with errors".to_string());
        lines.push(String::new());
        for name in analysis.failed.iter().take(20) {
            lines.push(format!("- {name}"));
        }
        if analysis.failed.len() > 20 {
            lines.push(format!("- ... and {} more", analysis.failed.len() - 20));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_artifact(dir: &Path, name: &str, contents: &str) {
        fs::write(artifact::feedback_path(dir, name), contents).unwrap();
    }

    #[test]
    fn classifies_graded_and_failed_from_contents_alone() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "alice", "Nice.\n\n| Total | 2/2 |\n");
        write_artifact(dir.path(), "bob", "Ok-ish.\n\n| Total | 1/2 |\n");
        write_artifact(
            dir.path(),
            "carol",
            &artifact::render_error_artifact("carol", "grading", "timeout", "deadline"),
        );
        fs::write(dir.path().join("stats.md"), "not an artifact").unwrap();

        let analysis = analyze_outputs(dir.path()).unwrap();

        assert_eq!(analysis.scores.len(), 2);
        assert_eq!(analysis.failed, vec!["carol"]);
        assert_eq!(analysis.total(), 3);
    }

    #[test]
    fn prefers_the_total_line_over_earlier_scores() {
        let dir = tempdir().unwrap();
        write_artifact(
            dir.path(),
            "alice",
            "Task 1: 3/5\nTask 2: 4/5\n\n| Total | 7/10 |\n",
        );

        let analysis = analyze_outputs(dir.path()).unwrap();
        assert_eq!(
            analysis.scores[0],
            ScoreEntry {
                submission: "alice".to_string(),
                score: 7.0,
                out_of: 10.0
            }
        );
    }

    #[test]
    fn falls_back_to_the_last_score_when_no_total_line_exists() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "bob", "Part A 1/2, later Part B 2/2.");

        let analysis = analyze_outputs(dir.path()).unwrap();
        assert_eq!(analysis.scores[0].score, 2.0);
    }

    #[test]
    fn graded_file_without_scores_is_counted_but_unparsed() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "dan", "Great work, no score requested.");

        let analysis = analyze_outputs(dir.path()).unwrap();
        assert!(analysis.scores.is_empty());
        assert_eq!(analysis.unparsed, vec!["dan"]);
        assert_eq!(analysis.graded(), 1);
    }

    #[test]
    fn stats_match_hand_computed_values() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "a", "| Total | 1/2 |");
        write_artifact(dir.path(), "b", "| Total | 2/2 |");
        write_artifact(dir.path(), "c", "| Total | 2/2 |");

        let stats = analyze_outputs(dir.path()).unwrap().stats().unwrap();

        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 1.67);
        assert_eq!(stats.median, 2.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 2.0);
        assert_eq!(stats.std_dev, 0.58);
        assert_eq!(stats.out_of, Some(2.0));
        assert_eq!(
            stats.distribution,
            vec![("2/2".to_string(), 2), ("1/2".to_string(), 1)]
        );
    }

    #[test]
    fn report_lists_failed_submissions() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "a", "| Total | 2/2 |");
        write_artifact(
            dir.path(),
            "b",
            &artifact::render_error_artifact("b", "grading", "rate-limited", "429"),
        );

        let analysis = analyze_outputs(dir.path()).unwrap();
        let report = format_stats_report(&analysis, dir.path());

        assert!(report.contains("| Graded | 1 |"));
        assert!(report.contains("| Errors | 1 |"));
        assert!(report.contains("## Submissions with errors"));
        assert!(report.contains("- b"));
    }

    #[test]
    fn empty_directory_produces_an_empty_report() {
        let dir = tempdir().unwrap();
        let analysis = analyze_outputs(dir.path()).unwrap();
        let report = format_stats_report(&analysis, dir.path());
        assert!(report.contains("No graded feedback files found."));
    }
}
