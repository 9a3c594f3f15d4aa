use std::fmt;

use derive_more::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Severity {
    #[display("log")]
    Log,
    #[display("warning")]
    Warning,
    #[display("error")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub severity: Severity,
    pub text: String,
}

/// Collects what a script writes through `console`, in emission order.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    lines: Vec<TranscriptLine>,
}

impl DiagnosticSink {
    pub fn log(&mut self, text: String) {
        self.push(Severity::Log, text);
    }

    pub fn warn(&mut self, text: impl fmt::Display) {
        self.push(Severity::Warning, format!("Warning: {text}"));
    }

    pub fn error(&mut self, text: impl fmt::Display) {
        self.push(Severity::Error, format!("Error: {text}"));
    }

    fn push(&mut self, severity: Severity, text: String) {
        self.lines.push(TranscriptLine { severity, text });
    }

    pub fn into_lines(self) -> Vec<TranscriptLine> {
        self.lines
    }
}

/// How an evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Outcome {
    /// Every statement ran.
    #[display("completed")]
    Completed,
    /// An uncaught fault stopped evaluation.
    #[display("faulted")]
    Faulted,
    /// The source was rejected before anything ran.
    #[display("compile failed")]
    CompileFailed,
    /// The step budget or the deadline ran out.
    #[display("timed out")]
    TimedOut,
}

/// Result of running one script: the captured output lines and the outcome.
///
/// Displays as the lines joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
    outcome: Outcome,
}

impl Transcript {
    pub fn new(lines: Vec<TranscriptLine>, outcome: Outcome) -> Self {
        Self { lines, outcome }
    }

    pub fn compile_failed(message: impl fmt::Display) -> Self {
        let mut sink = DiagnosticSink::default();
        sink.error(message);
        Self::new(sink.into_lines(), Outcome::CompileFailed)
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.text.as_str())
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Completed
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            f.write_str(&line.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_prefixes_by_severity() {
        let mut sink = DiagnosticSink::default();
        sink.log("plain".to_string());
        sink.warn("careful");
        sink.error("broken");
        let texts: Vec<_> = sink.into_lines().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, ["plain", "Warning: careful", "Error: broken"]);
    }

    #[test]
    fn display_joins_lines_with_newlines() {
        let transcript = Transcript::new(
            vec![
                TranscriptLine {
                    severity: Severity::Log,
                    text: "a".into(),
                },
                TranscriptLine {
                    severity: Severity::Log,
                    text: "b".into(),
                },
            ],
            Outcome::Completed,
        );
        assert_eq!(transcript.to_string(), "a\nb");
        assert!(transcript.is_success());
    }

    #[test]
    fn empty_transcript_displays_as_empty_string() {
        let transcript = Transcript::new(Vec::new(), Outcome::Completed);
        assert_eq!(transcript.to_string(), "");
    }

    #[test]
    fn compile_failure_is_a_single_error_line() {
        let transcript = Transcript::compile_failed("Unexpected end of input");
        assert_eq!(transcript.to_string(), "Error: Unexpected end of input");
        assert_eq!(transcript.outcome(), Outcome::CompileFailed);
    }
}
