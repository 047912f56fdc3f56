//! User-facing output for the push command

use crate::jsonmessage::{JsonMessage, PushResult};
use std::io::{self, Write};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
    start_time: Instant,
}

impl OutputManager {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Instant::now(),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Instant::now(),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.print_with_timestamp("INFO", message, "ℹ️");
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.print_with_timestamp("SUCCESS", message, "✅");
        }
    }

    pub fn warning(&self, message: &str) {
        self.print_with_timestamp("WARN", message, "⚠️");
    }

    pub fn error(&self, message: &str) {
        eprintln!("❌ {}", message);
    }

    pub fn section(&self, title: &str) {
        if self.quiet {
            return;
        }

        if self.verbose {
            let separator = "━".repeat(60);
            println!("\n{}", separator);
            println!("📋 {}", title);
            println!("{}", separator);
        } else {
            println!("\n📋 {}", title);
        }
    }

    pub fn detail(&self, detail: &str) {
        if self.verbose {
            println!("      📝 {}", detail);
        }
    }

    /// Render one progress message from the engine.
    pub fn message(&self, message: &JsonMessage) {
        if self.quiet {
            return;
        }
        if let Some(line) = Self::format_message(message) {
            println!("{}", line);
            let _ = io::stdout().flush();
        }
    }

    pub fn push_summary(&self, image: &str, result: Option<&PushResult>) {
        if self.quiet {
            if let Some(result) = result {
                println!("{}", result.digest);
            }
            return;
        }

        println!("\n📊 Push summary");
        println!("  • Image: {}", image);
        if let Some(result) = result {
            println!("  • Tag: {}", result.tag);
            println!("  • Digest: {}", result.digest);
            println!("  • Manifest size: {}", self.format_size(result.size.max(0) as u64));
        }
        println!("  • Elapsed: {}", self.elapsed_time());
    }

    /// `id: status progress`, skipping messages with nothing to show.
    pub fn format_message(message: &JsonMessage) -> Option<String> {
        let text = match (&message.status, &message.stream) {
            (Some(status), _) => status.trim_end().to_string(),
            (None, Some(stream)) => stream.trim_end().to_string(),
            (None, None) => return None,
        };
        if text.is_empty() {
            return None;
        }

        let mut line = match &message.id {
            Some(id) => format!("{}: {}", id, text),
            None => text,
        };
        if let Some(progress) = &message.progress_message {
            line.push(' ');
            line.push_str(progress);
        }
        Some(line)
    }

    fn print_with_timestamp(&self, level: &str, message: &str, emoji: &str) {
        if self.verbose {
            let timestamp = format!("[{:8.3}s]", self.start_time.elapsed().as_secs_f64());
            println!("{} {} {} {}", timestamp, emoji, level, message);
        } else {
            println!("{} {}", emoji, message);
        }
    }

    pub fn format_size(&self, size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }

    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m{:02}s", secs / 60, secs % 60)
        } else {
            format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    pub fn elapsed_time(&self) -> String {
        self.format_duration(self.start_time.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let message: JsonMessage = serde_json::from_str(
            r#"{"status":"Pushing","progress":"[==>   ] 512B/1kB","id":"a1b2c3"}"#,
        )
        .unwrap();
        assert_eq!(
            OutputManager::format_message(&message).as_deref(),
            Some("a1b2c3: Pushing [==>   ] 512B/1kB")
        );

        let aux_only: JsonMessage =
            serde_json::from_str(r#"{"progressDetail":{},"aux":{"Tag":"v1"}}"#).unwrap();
        assert_eq!(OutputManager::format_message(&aux_only), None);
    }

    #[test]
    fn test_format_size_and_duration() {
        let output = OutputManager::new_quiet();
        assert_eq!(output.format_size(528), "528 B");
        assert_eq!(output.format_size(1536), "1.5 KB");
        assert_eq!(output.format_duration(Duration::from_secs(75)), "1m15s");
        assert_eq!(output.format_duration(Duration::from_secs(3725)), "1h02m05s");
    }
}
