//! Process management utilities

use std::process::Command;
use thiserror::Error;

/// Failures running an external tool
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} produced non UTF-8 output")]
    InvalidUtf8 { program: String },
}

/// Run a program to completion and return its stdout.
///
/// A non-zero exit status is an error carrying the trimmed stderr.
pub fn run_capture(program: &str, args: &[&str]) -> Result<String, ProcessError> {
    tracing::debug!(program, ?args, "running external tool");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ProcessError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|_| ProcessError::InvalidUtf8 {
        program: program.to_string(),
    })
}

/// Check whether a program can be found and started
pub fn is_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
