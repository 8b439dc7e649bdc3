use crate::command::{CommandFactory, CommandIo, ExecutableCommand, ExitCode};
use crate::error::ShellError;
use crate::interpreter::Factory;
use crate::session::Session;
use anyhow::Result;
use log::debug;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

/// Command that is not a builtin.
pub struct ExternalCommand {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(name: String, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            name,
            program,
            args,
        }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        session: &Session,
        name: &str,
        args: &[String],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_paths = session.env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(
            OsStr::new(&search_paths),
            &session.env.current_dir,
            Path::new(name),
        )?;
        Some(Box::new(ExternalCommand::new(
            name.to_string(),
            program,
            args.to_vec(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        let stdout = io.stdout.stdio()?;
        let stderr = io.stderr.stdio()?;
        let capture_stdout = stdout.is_none();
        let capture_stderr = stderr.is_none();

        // Anything a built-in left buffered must precede the child's output.
        io.stdout.flush()?;
        io.stderr.flush()?;

        debug!("spawning {} {:?}", self.program.display(), self.args);
        let child = std::process::Command::new(&self.program)
            .args(&self.args)
            .envs(session.env.vars.iter())
            .current_dir(&session.env.current_dir)
            .stdin(Stdio::inherit())
            .stdout(stdout.unwrap_or_else(Stdio::piped))
            .stderr(stderr.unwrap_or_else(Stdio::piped))
            .spawn()
            .map_err(|e| ShellError::Spawn(format!("{}: {}", self.name, e)))?;

        let exit_status = if capture_stdout || capture_stderr {
            let output = child.wait_with_output()?;
            if capture_stdout {
                io.stdout.write_all(&output.stdout)?;
            }
            if capture_stderr {
                io.stderr.write_all(&output.stderr)?;
            }
            output.status
        } else {
            let mut child = child;
            child.wait()?
        };

        let code = match exit_status.code() {
            Some(x) => x,
            None => terminated_by_signal(exit_status),
        };
        debug!("{} exited with {}", self.name, code);
        if code != 0 {
            writeln!(io.stderr, "{}: exit status {}", self.name, code)?;
        }
        Ok(code)
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names an executable file.
/// - Relative with a directory component (e.g., `bin/sh`, `./foo`): resolved
///   against `cwd`.
/// - Single path component: search each directory in `search_paths` (PATH)
///   and return the first executable match.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, cwd: &Path, path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if path.is_absolute() {
        return find_by_path(path);
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(single), None) if !path.starts_with(".") => {
            find_in_path(search_paths, cwd, single.as_os_str())
        }
        _ => find_by_path(&cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cwd: &Path, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .find_map(|dir| find_by_path(&cwd.join(dir).join(cmd)))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    if is_executable(path) {
        Some(path.to_path_buf())
    } else {
        None
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
