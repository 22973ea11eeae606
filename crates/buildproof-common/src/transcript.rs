//! Line-oriented log transcripts and the matchers evaluated against them.
//!
//! Build output and container logs are both captured as a [`LogTranscript`]:
//! an ordered, immutable list of lines with terminal color codes removed.
//! Assertions are line-grained: a matcher is applied to each line on its
//! own, so tokens from adjacent lines can never combine into a false match.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BuildproofError, Result};

/// Predicate applied to a single transcript line.
#[derive(Debug, Clone)]
pub enum LineMatcher {
    /// The line contains the given text.
    Substring(String),
    /// The line, with surrounding whitespace trimmed, equals the given text.
    Exact(String),
    /// The line matches the regular expression.
    Pattern(Regex),
}

impl LineMatcher {
    /// Matches lines containing `text`.
    #[must_use]
    pub fn substring(text: impl Into<String>) -> Self {
        Self::Substring(text.into())
    }

    /// Matches lines equal to `text` after trimming.
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Matches lines against a regular expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not compile.
    pub fn pattern(expr: &str) -> Result<Self> {
        Regex::new(expr)
            .map(Self::Pattern)
            .map_err(|e| BuildproofError::Config {
                message: format!("invalid line pattern {expr:?}: {e}"),
            })
    }

    /// Tests a single line.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::Substring(text) => line.contains(text.as_str()),
            Self::Exact(text) => line.trim() == text,
            Self::Pattern(re) => re.is_match(line),
        }
    }
}

impl fmt::Display for LineMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Substring(text) => write!(f, "a line containing {text:?}"),
            Self::Exact(text) => write!(f, "a line equal to {text:?}"),
            Self::Pattern(re) => write!(f, "a line matching /{}/", re.as_str()),
        }
    }
}

/// Ordered, immutable sequence of captured output lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogTranscript {
    lines: Vec<String>,
}

impl LogTranscript {
    /// Splits raw output into lines, removing color escapes and `\r`.
    #[must_use]
    pub fn from_output(output: &str) -> Self {
        Self {
            lines: output
                .lines()
                .map(|line| strip_ansi(line.trim_end_matches('\r')))
                .collect(),
        }
    }

    /// Returns the captured lines in emission order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the index of the first line satisfying `matcher`.
    #[must_use]
    pub fn find_line(&self, matcher: &LineMatcher) -> Option<usize> {
        self.lines.iter().position(|line| matcher.matches(line))
    }

    /// Returns whether any line satisfies `matcher`.
    #[must_use]
    pub fn contains_line(&self, matcher: &LineMatcher) -> bool {
        self.find_line(matcher).is_some()
    }

    /// Returns whether no line satisfies `matcher`.
    #[must_use]
    pub fn excludes_line(&self, matcher: &LineMatcher) -> bool {
        !self.contains_line(matcher)
    }

    /// Returns whether `matchers` are satisfied by consecutive lines, in order.
    ///
    /// An empty sequence is trivially contained.
    #[must_use]
    pub fn contains_sequence(&self, matchers: &[LineMatcher]) -> bool {
        if matchers.is_empty() {
            return true;
        }
        self.lines.windows(matchers.len()).any(|window| {
            window
                .iter()
                .zip(matchers)
                .all(|(line, matcher)| matcher.matches(line))
        })
    }

    /// Asserts that some line satisfies `matcher`.
    ///
    /// # Errors
    ///
    /// Returns `LogAssertion` carrying the full transcript otherwise.
    pub fn expect_line(&self, matcher: &LineMatcher) -> Result<()> {
        if self.contains_line(matcher) {
            return Ok(());
        }
        Err(self.assertion_failure(format!("contain {matcher}")))
    }

    /// Asserts that no line satisfies `matcher`.
    ///
    /// # Errors
    ///
    /// Returns `LogAssertion` naming the offending line otherwise.
    pub fn expect_no_line(&self, matcher: &LineMatcher) -> Result<()> {
        match self.find_line(matcher) {
            None => Ok(()),
            Some(index) => Err(self.assertion_failure(format!(
                "not contain {matcher}, but line {} is {:?}",
                index + 1,
                self.lines[index]
            ))),
        }
    }

    /// Asserts that `matchers` are satisfied by consecutive lines, in order.
    ///
    /// # Errors
    ///
    /// Returns `LogAssertion` carrying the full transcript otherwise.
    pub fn expect_sequence(&self, matchers: &[LineMatcher]) -> Result<()> {
        if self.contains_sequence(matchers) {
            return Ok(());
        }
        let described: Vec<String> = matchers.iter().map(ToString::to_string).collect();
        Err(self.assertion_failure(format!("contain consecutive lines [{}]", described.join(", "))))
    }

    fn assertion_failure(&self, expectation: String) -> BuildproofError {
        BuildproofError::LogAssertion {
            expectation,
            transcript: self.to_string(),
        }
    }
}

impl fmt::Display for LogTranscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Terminal escape sequences: CSI (colors, cursor movement), OSC (titles,
/// hyperlinks) and two-byte escapes.
#[allow(clippy::expect_used)]
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\-_])")
        .expect("regex for terminal escapes")
});

fn strip_ansi(line: &str) -> String {
    ANSI_ESCAPE.replace_all(line, "").into_owned()
}
