//! Check command execution and output parsing.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use super::PollError;

/// Longest slice of raw output quoted back in a parse error.
const MAX_OUTPUT_EXCERPT: usize = 64;

/// Executes a sensor's check command.
///
/// Implementations must bound execution by `timeout` and return the
/// command's standard output on success.
#[async_trait::async_trait]
pub trait CheckRunner: Send + Sync + 'static {
    /// Run `command` (executable followed by arguments).
    async fn run(&self, command: &[String], timeout: Duration) -> Result<String, PollError>;
}

/// Runs checks as child processes.
///
/// The child is killed if it outlives its timeout. A non-zero exit status is
/// an error even when the command printed something.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

#[async_trait::async_trait]
impl CheckRunner for CommandRunner {
    async fn run(&self, command: &[String], limit: Duration) -> Result<String, PollError> {
        let Some((program, args)) = command.split_first() else {
            return Err(PollError::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PollError::Spawn {
                command: program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| PollError::Timeout(limit))?
            .map_err(|source| PollError::Spawn {
                command: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PollError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse check output into a reading.
///
/// The output must be exactly one numeric token, optionally surrounded by
/// whitespace, that parses as a finite `f64`.
///
/// # Examples
///
/// ```
/// use sensorium::poller::parse_reading;
///
/// assert_eq!(parse_reading(" 42.5\n").unwrap(), 42.5);
/// assert!(parse_reading("OK").is_err());
/// ```
pub fn parse_reading(output: &str) -> Result<f64, PollError> {
    let invalid = |reason: &str| PollError::Parse {
        output: excerpt(output),
        reason: reason.to_string(),
    };

    let mut tokens = output.split_whitespace();
    let token = match (tokens.next(), tokens.next()) {
        (Some(token), None) => token,
        (None, _) => return Err(invalid("no output")),
        (Some(_), Some(_)) => return Err(invalid("expected a single value")),
    };

    let value: f64 = token.parse().map_err(|e: std::num::ParseFloatError| invalid(&e.to_string()))?;
    if !value.is_finite() {
        return Err(invalid("value is not finite"));
    }
    Ok(value)
}

fn excerpt(output: &str) -> String {
    match output.char_indices().nth(MAX_OUTPUT_EXCERPT) {
        Some((idx, _)) => format!("{}...", &output[..idx]),
        None => output.to_string(),
    }
}
