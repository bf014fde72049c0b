//! External process execution.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{TransferError, TransferResult};

/// Runs a program to completion and reports its exit code.
pub trait ProcessRunner {
    fn run(&self, program: &Path, args: &[String], working_dir: &Path) -> TransferResult<i32>;
}

/// Runs processes on the local machine, inheriting stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String], working_dir: &Path) -> TransferResult<i32> {
        debug!(program = %program.display(), cwd = %working_dir.display(), "spawning process");
        let status = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .status()
            .map_err(|source| TransferError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        // Killed by a signal: no exit code.
        Ok(status.code().unwrap_or(-1))
    }
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for &T {
    fn run(&self, program: &Path, args: &[String], working_dir: &Path) -> TransferResult<i32> {
        (**self).run(program, args, working_dir)
    }
}
