//! Grade guardrails.
//!
//! The model is asked for a total score, and occasionally wanders outside the
//! allowed band. When the feedback's total is on the expected scale, the score
//! is clamped into bounds by rewriting the Total row in place; feedback on a
//! different scale is left untouched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)").unwrap());

// Total row in a markdown table: | **Total** | **2/2** | or | Total | 2/2 |
static TOTAL_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\|\s*.*?total.*?\|\s*)\*{0,2}\d+(?:\.\d+)?/\d+(?:\.\d+)?\*{0,2}(\s*\|)")
        .unwrap()
});

/// Allowed band for the total grade, on a specific scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeBounds {
    pub min: f64,
    pub max: f64,
    /// The scale the bounds apply to; totals on any other scale pass through.
    pub out_of: f64,
}

impl Default for GradeBounds {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 2.0,
            out_of: 2.0,
        }
    }
}

/// Clamp the feedback's total grade into `bounds`. Returns the feedback
/// unchanged when no total is found or the scale does not match.
pub fn apply_grade_guardrails(feedback: &str, bounds: &GradeBounds) -> String {
    let Some((score, out_of)) = parse_total_score(feedback) else {
        return feedback.to_string();
    };
    if out_of <= 0.0 || (out_of - bounds.out_of).abs() > 0.01 {
        return feedback.to_string();
    }

    let clamped = score.clamp(bounds.min, bounds.max);
    if clamped == score {
        return feedback.to_string();
    }
    replace_total(feedback, clamped, out_of)
}

/// Extract the total `(score, out_of)` from feedback text: prefer a line
/// mentioning "total", fall back to the last `x/y` anywhere in the text.
pub fn parse_total_score(text: &str) -> Option<(f64, f64)> {
    for line in text.lines() {
        if !line.to_lowercase().contains("total") {
            continue;
        }
        if let Some(caps) = SCORE.captures(line) {
            return score_from(&caps);
        }
    }
    let caps = SCORE.captures_iter(text).last()?;
    score_from(&caps)
}

fn score_from(caps: &Captures<'_>) -> Option<(f64, f64)> {
    let score: f64 = caps[1].parse().ok()?;
    let out_of: f64 = caps[2].parse().ok()?;
    Some((score, out_of))
}

fn replace_total(text: &str, new_score: f64, out_of: f64) -> String {
    TOTAL_ROW
        .replace(text, |caps: &Captures<'_>| {
            // Preserve bold style if present.
            let bold = caps[0].contains("**");
            if bold {
                format!("{}**{:.1}/{:.0}**{}", &caps[1], new_score, out_of, &caps[2])
            } else {
                format!("{}{:.1}/{:.0}{}", &caps[1], new_score, out_of, &caps[2])
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: GradeBounds = GradeBounds {
        min: 1.0,
        max: 2.0,
        out_of: 2.0,
    };

    #[test]
    fn clamps_a_total_below_the_floor() {
        let feedback = "Weak effort.\n\n| Criterion | Score |\n| Total | 0/2 |\n";
        let fixed = apply_grade_guardrails(feedback, &BOUNDS);
        assert!(fixed.contains("| Total | 1.0/2 |"));
    }

    #[test]
    fn preserves_bold_styling() {
        let feedback = "| **Total** | **3/2** |";
        let fixed = apply_grade_guardrails(feedback, &BOUNDS);
        assert_eq!(fixed, "| **Total** | **2.0/2** |");
    }

    #[test]
    fn leaves_in_range_totals_alone() {
        let feedback = "| Total | 1.5/2 |";
        assert_eq!(apply_grade_guardrails(feedback, &BOUNDS), feedback);
    }

    #[test]
    fn ignores_other_scales() {
        let feedback = "| Total | 7/10 |";
        assert_eq!(apply_grade_guardrails(feedback, &BOUNDS), feedback);
    }

    #[test]
    fn passes_through_feedback_without_a_total() {
        let feedback = "Nice work overall, no score requested.";
        assert_eq!(apply_grade_guardrails(feedback, &BOUNDS), feedback);
    }

    #[test]
    fn falls_back_to_the_last_score_in_the_text() {
        assert_eq!(
            parse_total_score("partial 3/5 then final 4/5"),
            Some((4.0, 5.0))
        );
    }
}
