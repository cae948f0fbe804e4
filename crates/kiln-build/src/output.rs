//! Progress and command output of a running build

use crate::node::Node;
use std::io::Write;
use std::time::Duration;

/// Where build progress goes
pub enum OutputMode {
    /// Progress lines and command output on stderr
    Normal,
    /// Nothing but command output
    Quiet,
    /// Anything implementing `Write`, used by tests
    Writer(Box<dyn Write + Send>),
}

impl std::fmt::Debug for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Quiet => write!(f, "Quiet"),
            Self::Writer(_) => write!(f, "Writer"),
        }
    }
}

/// Prints progress lines. Callers serialize access, one line group at a time.
pub struct ProgressReporter {
    mode: OutputMode,
    verbose: bool,
}

impl ProgressReporter {
    pub fn new(mode: OutputMode, verbose: bool) -> Self {
        Self { mode, verbose }
    }

    /// `[ 42%] Compile src/app.c`, followed by the command line when verbose
    pub fn node_started(&mut self, started: usize, total: usize, node: &Node) {
        if matches!(self.mode, OutputMode::Quiet) {
            return;
        }
        let mut line = progress_line(started, total, &node.text);
        if self.verbose {
            line.push('\n');
            line.push_str(&node.command.cmd_line);
        }
        self.write_line(&line);
    }

    /// Diagnostics of a command, forwarded verbatim
    pub fn command_output(&mut self, output: &str) {
        if output.is_empty() {
            return;
        }
        let output = output.strip_suffix('\n').unwrap_or(output);
        self.write_line(output);
    }

    fn write_line(&mut self, line: &str) {
        let result = match &mut self.mode {
            OutputMode::Writer(writer) => writeln!(writer, "{}", line),
            OutputMode::Normal | OutputMode::Quiet => writeln!(std::io::stderr().lock(), "{}", line),
        };
        // Nowhere left to report a broken stderr
        let _ = result;
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("mode", &self.mode)
            .field("verbose", &self.verbose)
            .finish()
    }
}

pub fn progress_line(started: usize, total: usize, text: &str) -> String {
    let percent = if total == 0 {
        100
    } else {
        started.min(total) * 100 / total
    };
    format!("[{:>3}%] {}", percent, text)
}

/// `850ms`, `2.41s`, `1m05s`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
