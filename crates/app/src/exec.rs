//! Blocking execution of outbound commands (`mosquitto_pub`, `curl`, …).
//!
//! Connector actions are synchronous, so adapters run their one-shot
//! commands to completion on the calling thread. Arguments are passed as an
//! argv vector; nothing goes through a shell unless the caller asks for one.

use std::process::{Command, ExitStatus};

/// Failure to run an outbound command.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The program could not be launched.
    #[error("failed to run {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and reported a failure.
    #[error("{program} exited with {status}: {stderr}")]
    Status {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Run `program` with `args` and return its standard output.
///
/// # Errors
///
/// Returns [`ExecError::Spawn`] if the program cannot start and
/// [`ExecError::Status`] if it exits unsuccessfully.
pub fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<String, ExecError> {
    let output = Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .output()
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExecError::Status {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run `script` through `shell -c`.
///
/// # Errors
///
/// Same as [`run`].
pub fn run_script(shell: &str, script: &str) -> Result<String, ExecError> {
    run(shell, &["-c", script])
}

/// Quote `arg` for inclusion in a POSIX shell command line.
#[must_use]
pub fn quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
