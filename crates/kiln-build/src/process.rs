//! Subprocess execution for build commands
//!
//! Commands run through the platform shell with stderr merged into stdout,
//! so diagnostics keep their original interleaving. Output is captured up to
//! a cap. Long command lines are moved to a response file when the command
//! declares where its arguments start.

use crate::error::BuildError;
use crate::fs::remove_files;
use crate::toolchain::Command;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Exit code reported for a command stopped by an interrupt (Ctrl+C)
#[cfg(windows)]
pub const INTERRUPTED_EXIT_CODE: i32 = 0xC000013Au32 as i32;
#[cfg(not(windows))]
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Default output cap per command
pub const DEFAULT_OUTPUT_CAP: usize = 4 * 1024 * 1024;

/// Command lines longer than this are spilled to a response file
#[cfg(windows)]
pub const RSP_THRESHOLD: usize = 4096;
#[cfg(not(windows))]
pub const RSP_THRESHOLD: usize = 32768;

const DELETE_ATTEMPTS: usize = 10;
const DELETE_DELAY: Duration = Duration::from_millis(50);

/// Result of running one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// False when the process could not be launched at all
    pub started: bool,
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub output: Vec<u8>,
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.started && self.exit_code == 0
    }

    pub fn interrupted(&self) -> bool {
        self.started && self.exit_code == INTERRUPTED_EXIT_CODE
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    rsp_dir: PathBuf,
    output_cap: usize,
    rsp_threshold: usize,
}

impl ProcessRunner {
    /// Runner writing response files to `rsp_dir`
    pub fn new(rsp_dir: impl Into<PathBuf>) -> Self {
        Self {
            rsp_dir: rsp_dir.into(),
            output_cap: DEFAULT_OUTPUT_CAP,
            rsp_threshold: RSP_THRESHOLD,
        }
    }

    pub fn with_output_cap(mut self, cap: usize) -> Self {
        self.output_cap = cap;
        self
    }

    pub fn with_rsp_threshold(mut self, threshold: usize) -> Self {
        self.rsp_threshold = threshold;
        self
    }

    /// Run `command`, optionally from `work_dir`.
    ///
    /// Never fails: a launch failure is logged and reported with
    /// `started == false`.
    pub fn run(&self, command: &Command, work_dir: Option<&Path>) -> ProcessOutput {
        let (cmd_line, rsp_file) = match self.prepare(command) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Failed to prepare command: {}", e);
                return ProcessOutput::default();
            }
        };

        let result = self.spawn(&cmd_line, command, work_dir);

        if let Some(rsp_file) = rsp_file {
            for failure in remove_files(&[rsp_file], DELETE_ATTEMPTS, DELETE_DELAY) {
                debug!("Failed to delete response file: {}", failure);
            }
        }

        match result {
            Ok(output) => output,
            Err(e) => {
                error!("{}", e);
                ProcessOutput::default()
            }
        }
    }

    /// Final command line, plus the response file to delete afterwards
    fn prepare(&self, command: &Command) -> Result<(String, Option<PathBuf>), BuildError> {
        let cmd_line = &command.cmd_line;
        let offset = match command.rsp_offset {
            Some(offset) if cmd_line.len() > self.rsp_threshold && cmd_line.is_char_boundary(offset) => {
                offset
            }
            _ => return Ok((cmd_line.clone(), None)),
        };

        let (prefix, args) = cmd_line.split_at(offset);
        let content = args.trim_start().replace('\\', "/");

        std::fs::create_dir_all(&self.rsp_dir).map_err(|e| BuildError::io(&self.rsp_dir, e))?;
        let file = tempfile::Builder::new()
            .prefix("kiln-")
            .suffix(".rsp")
            .tempfile_in(&self.rsp_dir)
            .map_err(|e| BuildError::io(&self.rsp_dir, e))?;
        let (mut file, path) = file.into_parts();
        file.write_all(content.as_bytes())
            .map_err(|e| BuildError::io(&*path, e))?;
        drop(file);

        let path = path
            .keep()
            .map_err(|e| BuildError::io(&self.rsp_dir, e.error))?;
        debug!(rsp = %path.display(), len = cmd_line.len(), "Using response file");

        Ok((format!("{} \"@{}\"", prefix, path.display()), Some(path)))
    }

    fn spawn(
        &self,
        cmd_line: &str,
        command: &Command,
        work_dir: Option<&Path>,
    ) -> Result<ProcessOutput, BuildError> {
        let mut process = shell_command(cmd_line);
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for (key, value) in &command.env {
            process.env(key, value);
        }
        if let Some(dir) = work_dir {
            process.current_dir(dir);
        }

        let mut child = process
            .spawn()
            .map_err(|e| BuildError::launch(cmd_line, e))?;

        let mut output = Vec::new();
        let mut truncated = false;
        if let Some(mut stdout) = child.stdout.take() {
            let mut buf = [0u8; 8192];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let room = self.output_cap.saturating_sub(output.len());
                        if n > room {
                            truncated = true;
                        }
                        output.extend_from_slice(&buf[..n.min(room)]);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("Failed to read command output: {}", e);
                        break;
                    }
                }
            }
        }
        if truncated {
            warn!(cap = self.output_cap, "Truncated command output");
        }

        let status = child.wait().map_err(|e| BuildError::launch(cmd_line, e))?;

        Ok(ProcessOutput {
            started: true,
            exit_code: exit_code(status),
            output,
            truncated,
        })
    }
}

#[cfg(not(windows))]
fn shell_command(cmd_line: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c").arg(format!("exec 2>&1; {}", cmd_line));
    cmd
}

#[cfg(windows)]
fn shell_command(cmd_line: &str) -> std::process::Command {
    use std::os::windows::process::CommandExt;

    let mut cmd = std::process::Command::new("cmd");
    cmd.raw_arg(format!("/S /C \"{} 2>&1\"", cmd_line));
    cmd
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_both_streams_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let result = runner.run(&Command::new("echo out; echo err >&2; exit 3"), None);

        assert!(result.started);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.output_lossy(), "out\nerr\n");
        assert!(!result.success());
    }

    #[test]
    fn test_output_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path()).with_output_cap(4);
        let result = runner.run(&Command::new("echo 0123456789"), None);

        assert!(result.success());
        assert!(result.truncated);
        assert_eq!(result.output, b"0123");
    }

    #[test]
    fn test_interrupt_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let result = runner.run(&Command::new("kill -INT $$"), None);
        assert!(result.interrupted());
    }

    #[test]
    fn test_env_and_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let runner = ProcessRunner::new(dir.path());
        let command = Command::new("ls; echo $KILN_TEST_VALUE").with_env("KILN_TEST_VALUE", "42");

        let result = runner.run(&command, Some(dir.path()));
        assert_eq!(result.output_lossy(), "marker\n42\n");
    }

    #[test]
    fn test_long_command_uses_response_file() {
        let dir = tempfile::tempdir().unwrap();
        let rsp_dir = dir.path().join("Misc");
        let runner = ProcessRunner::new(&rsp_dir).with_rsp_threshold(16);

        // The inner shell receives `@<file>` as $0 and prints the file
        let mut command = Command::new("sh -c 'cat \"${0#@}\"'");
        command.rsp_offset = Some(command.cmd_line.len());
        command.cmd_line.push_str(" a\\b.o c.o d.o e.o");
        let result = runner.run(&command, None);

        assert!(result.success(), "{}", result.output_lossy());
        assert_eq!(result.output_lossy(), "a/b.o c.o d.o e.o");
        assert_eq!(std::fs::read_dir(&rsp_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_shell_program_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let result = runner.run(&Command::new("kiln-no-such-program-xyz"), None);
        assert!(result.started);
        assert_eq!(result.exit_code, 127);
    }
}
