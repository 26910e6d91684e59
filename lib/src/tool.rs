// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::{fmt, thread};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::{BundlerConfig, DmgConfig};

/// A command line for an external tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), cwd: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// The bundler invocation for one target triple, run from `app_dir`.
    pub fn bundler(
        config: &BundlerConfig,
        app_dir: &Utf8Path,
        triple: &str,
    ) -> Self {
        Self::new(&config.program)
            .args(config.args_for(triple))
            .current_dir(app_dir)
    }

    /// The `create-dmg` invocation building `destination` from `app_bundle`.
    pub fn create_dmg(
        config: &DmgConfig,
        app_name: &str,
        app_bundle: &Utf8Path,
        destination: &Utf8Path,
    ) -> Self {
        let pair = |(a, b): (u32, u32)| [a.to_string(), b.to_string()];
        Self::new(&config.program)
            .args(["--volname", app_name])
            .args(["--volicon", config.icon.as_str()])
            .args(["--background", config.background.as_str()])
            .arg("--window-pos")
            .args(pair(config.window_pos))
            .arg("--window-size")
            .args(pair(config.window_size))
            .args(["--icon-size".to_owned(), config.icon_size.to_string()])
            .args(["--icon", app_name])
            .args(pair(config.icon_pos))
            .args(["--hide-extension", app_name])
            .arg("--app-drop-link")
            .args(pair(config.app_drop_link))
            .arg(destination.as_str())
            .arg(app_bundle.as_str())
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ExternalToolError {
    #[error("cannot find `{program}` on PATH")]
    NotFound {
        program: String,
        #[source]
        error: which::Error,
    },

    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        error: io::Error,
    },

    #[error("`{command}` failed with {status}: {}", .stderr.trim())]
    Failed { command: String, status: ExitStatus, stderr: String },
}

/// Runs external tools.
pub trait ToolRunner {
    /// Runs `command` to completion.
    ///
    /// Returns an error if the tool could not be started or exited
    /// unsuccessfully.
    fn run(
        &self,
        log: &slog::Logger,
        command: &ExternalCommand,
    ) -> Result<(), ExternalToolError>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for &T {
    fn run(
        &self,
        log: &slog::Logger,
        command: &ExternalCommand,
    ) -> Result<(), ExternalToolError> {
        (**self).run(log, command)
    }
}

/// Runs tools as child processes, waiting for each to exit.
///
/// Programs are looked up on `PATH` before spawning. On Windows the lookup
/// honors `PATHEXT`, so `pnpm` finds a `pnpm.cmd` shim. The tool's stdout and
/// stderr are forwarded line by line to the log at info level while it runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(
        &self,
        log: &slog::Logger,
        command: &ExternalCommand,
    ) -> Result<(), ExternalToolError> {
        let log = log.new(slog::o!(
            "component" => "SystemToolRunner",
            "program" => command.program.clone(),
        ));
        let spawn_error = |error| ExternalToolError::Spawn {
            command: command.to_string(),
            error,
        };

        let cwd = match &command.cwd {
            Some(cwd) => cwd.clone().into_std_path_buf(),
            None => std::env::current_dir().map_err(spawn_error)?,
        };
        let program = resolve_program(
            &command.program,
            std::env::var_os("PATH").as_deref(),
            &cwd,
        )?;
        slog::info!(log, "running {}", command; "path" => %program.display());

        let mut child = Command::new(&program)
            .args(&command.args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stderr = thread::scope(|s| {
            let handle = s.spawn(|| forward_lines(&log, stderr, "stderr"));
            forward_lines(&log, stdout, "stdout");
            handle.join().unwrap_or_default()
        });
        let status = child.wait().map_err(spawn_error)?;

        if !status.success() {
            return Err(ExternalToolError::Failed {
                command: command.to_string(),
                status,
                stderr,
            });
        }
        Ok(())
    }
}

/// Finds the executable `program` names, searching `search_path` and
/// resolving relative paths against `cwd`.
fn resolve_program(
    program: &str,
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Result<PathBuf, ExternalToolError> {
    which::which_in(program, search_path, cwd).map_err(|error| {
        ExternalToolError::NotFound { program: program.to_owned(), error }
    })
}

/// Logs every line read from `reader` and returns them joined.
fn forward_lines<R: Read>(
    log: &slog::Logger,
    reader: Option<R>,
    stream: &'static str,
) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                slog::info!(log, "{}", line; "stream" => stream);
                collected.push_str(line);
                collected.push('\n');
            }
        }
    }
    collected
}
