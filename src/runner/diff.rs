//! Output comparison and mismatch analysis.
//!
//! Comparison is deliberately forgiving about whitespace: trailing blanks on
//! each line and trailing newlines are ignored, everything else is exact.
//! When outputs differ, [`analyze`] builds the artifact handed to humans: a
//! unified diff plus a positional per-line classification (modified, missing,
//! extra) and aggregate counts.

use serde::{Deserialize, Serialize};

/// How one line differs between expected and actual output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Both sides have the line, contents differ.
    Modified,
    /// Expected has the line, actual ends early.
    Missing,
    /// Actual has lines past the end of expected.
    Extra,
}

/// One differing line, positionally indexed (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDiff {
    pub line_number: usize,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub kind: DiffKind,
}

/// Aggregate counts over a mismatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub expected_lines: usize,
    pub actual_lines: usize,
    pub modified: usize,
    pub missing: usize,
    pub extra: usize,
}

/// Full analysis of one expected/actual mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MismatchAnalysis {
    pub unified_diff: String,
    pub line_differences: Vec<LineDiff>,
    pub summary: DiffSummary,
}

fn normalized_lines(text: &str) -> Vec<&str> {
    let trimmed = text.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.lines().map(str::trim_end).collect()
}

/// Whitespace-forgiving equality: trailing blanks per line and trailing
/// newlines are ignored.
pub fn outputs_match(expected: &str, actual: &str) -> bool {
    normalized_lines(expected) == normalized_lines(actual)
}

/// Analyze a mismatch between expected and actual output.
pub fn analyze(expected: &str, actual: &str) -> MismatchAnalysis {
    let expected_lines = normalized_lines(expected);
    let actual_lines = normalized_lines(actual);

    let mut line_differences = Vec::new();
    let mut summary = DiffSummary {
        expected_lines: expected_lines.len(),
        actual_lines: actual_lines.len(),
        ..Default::default()
    };

    let common = expected_lines.len().min(actual_lines.len());
    for i in 0..common {
        if expected_lines[i] != actual_lines[i] {
            summary.modified += 1;
            line_differences.push(LineDiff {
                line_number: i + 1,
                expected: Some(expected_lines[i].to_string()),
                actual: Some(actual_lines[i].to_string()),
                kind: DiffKind::Modified,
            });
        }
    }
    for (i, line) in expected_lines.iter().enumerate().skip(common) {
        summary.missing += 1;
        line_differences.push(LineDiff {
            line_number: i + 1,
            expected: Some(line.to_string()),
            actual: None,
            kind: DiffKind::Missing,
        });
    }
    for (i, line) in actual_lines.iter().enumerate().skip(common) {
        summary.extra += 1;
        line_differences.push(LineDiff {
            line_number: i + 1,
            expected: None,
            actual: Some(line.to_string()),
            kind: DiffKind::Extra,
        });
    }

    MismatchAnalysis {
        unified_diff: unified_diff(&expected_lines, &actual_lines),
        line_differences,
        summary,
    }
}

/// Minimal unified diff over line slices, one hunk, LCS-aligned.
fn unified_diff(expected: &[&str], actual: &[&str]) -> String {
    if expected == actual {
        return String::new();
    }

    // LCS table; outputs here are test-sized, quadratic is fine.
    let n = expected.len();
    let m = actual.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if expected[i] == actual[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::new();
    out.push_str("--- expected\n+++ actual\n");
    out.push_str(&format!("@@ -1,{} +1,{} @@\n", n, m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if expected[i] == actual[j] {
            out.push_str(&format!(" {}\n", expected[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push_str(&format!("-{}\n", expected[i]));
            i += 1;
        } else {
            out.push_str(&format!("+{}\n", actual[j]));
            j += 1;
        }
    }
    for line in &expected[i..] {
        out.push_str(&format!("-{}\n", line));
    }
    for line in &actual[j..] {
        out.push_str(&format!("+{}\n", line));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trailing_whitespace_is_forgiven() {
        assert!(outputs_match("1 2 3\n", "1 2 3"));
        assert!(outputs_match("a \nb\t\n\n", "a\nb"));
        assert!(!outputs_match("1 2 3", "1 2  3"));
        assert!(!outputs_match("a\nb", "a\n b"));
    }

    #[test]
    fn modified_lines_are_positional() {
        let analysis = analyze("1\n2\n3\n", "1\n5\n3\n");
        assert_eq!(analysis.summary.modified, 1);
        assert_eq!(analysis.line_differences.len(), 1);
        let d = &analysis.line_differences[0];
        assert_eq!(d.line_number, 2);
        assert_eq!(d.kind, DiffKind::Modified);
        assert_eq!(d.expected.as_deref(), Some("2"));
        assert_eq!(d.actual.as_deref(), Some("5"));
    }

    #[test]
    fn short_output_yields_missing_long_yields_extra() {
        let analysis = analyze("a\nb\nc\n", "a\n");
        assert_eq!(analysis.summary.missing, 2);
        assert!(analysis
            .line_differences
            .iter()
            .all(|d| d.kind == DiffKind::Missing || d.expected == d.actual));

        let analysis = analyze("a\n", "a\nb\nc\n");
        assert_eq!(analysis.summary.extra, 2);
        assert_eq!(analysis.line_differences[1].actual.as_deref(), Some("c"));
    }

    #[test]
    fn unified_diff_marks_both_sides() {
        let analysis = analyze("1\n2\n3\n", "1\n5\n3\n");
        assert!(analysis.unified_diff.contains("-2"));
        assert!(analysis.unified_diff.contains("+5"));
        assert!(analysis.unified_diff.contains(" 1"));
        assert!(analysis.unified_diff.contains(" 3"));
    }

    #[test]
    fn empty_vs_nonempty() {
        let analysis = analyze("", "x\n");
        assert_eq!(analysis.summary.extra, 1);
        assert_eq!(analysis.summary.expected_lines, 0);
    }

    proptest! {
        #[test]
        fn identical_outputs_have_no_differences(text in "[ -~\n]{0,200}") {
            prop_assert!(outputs_match(&text, &text));
            let analysis = analyze(&text, &text);
            prop_assert!(analysis.line_differences.is_empty());
            prop_assert!(analysis.unified_diff.is_empty());
        }

        #[test]
        fn counts_agree_with_classifications(
            a in "[a-c\n]{0,60}",
            b in "[a-c\n]{0,60}",
        ) {
            let analysis = analyze(&a, &b);
            let modified = analysis.line_differences.iter()
                .filter(|d| d.kind == DiffKind::Modified).count();
            let missing = analysis.line_differences.iter()
                .filter(|d| d.kind == DiffKind::Missing).count();
            let extra = analysis.line_differences.iter()
                .filter(|d| d.kind == DiffKind::Extra).count();
            prop_assert_eq!(analysis.summary.modified, modified);
            prop_assert_eq!(analysis.summary.missing, missing);
            prop_assert_eq!(analysis.summary.extra, extra);
            prop_assert_eq!(
                outputs_match(&a, &b),
                analysis.line_differences.is_empty()
            );
        }
    }
}
