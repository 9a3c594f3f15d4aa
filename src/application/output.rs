use colored::Colorize;
use supports_color::Stream;

use crate::sandbox::{Severity, Transcript, TranscriptLine};

pub fn stdout_supports_color() -> bool {
    supports_color::on(Stream::Stdout).is_some()
}

pub fn print_transcript(transcript: &Transcript) {
    let color = stdout_supports_color();
    for line in transcript.lines() {
        println!("{}", render_line(line, color));
    }
}

fn render_line(line: &TranscriptLine, color: bool) -> String {
    if !color {
        return line.text.clone();
    }
    match line.severity {
        Severity::Log => line.text.clone(),
        Severity::Warning => line.text.yellow().to_string(),
        Severity::Error => line.text.red().to_string(),
    }
}
