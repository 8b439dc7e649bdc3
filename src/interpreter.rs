use crate::command::{CommandFactory, CommandIo, ExitCode};
use crate::config::PromptConfig;
use crate::error::ShellError;
use crate::expand::expand_word;
use crate::io_adapters::Sink;
use crate::lexer;
use crate::redirect::{self, ResolvedCommand};
use crate::session::Session;
use log::{debug, warn};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: built-ins and `ExternalCommand`.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// What the shell should do after a line was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line; carries the status of the line just run.
    Continue(ExitCode),
    /// `exit` was run: terminate with this status.
    Exit(ExitCode),
}

/// Line-oriented shell: tokenizes, resolves redirections and dispatches
/// each input line to a built-in or an external program.
///
/// Commands are looked up in a list of [`CommandFactory`] objects, built
/// once; the first one that recognizes the name wins. See [`Default`] for
/// the factories included out of the box.
///
/// Example
/// ```
/// use mysh::Interpreter;
/// use mysh::io_adapters::{MemWriter, Sink};
///
/// let out = MemWriter::new();
/// let mut sh = Interpreter::default().with_streams(Sink::Memory(out.clone()), Sink::Stderr);
/// sh.execute_line("echo 'hello   world'");
/// assert_eq!(out.contents(), "hello   world\n");
/// ```
pub struct Interpreter {
    session: Session,
    commands: Vec<Box<dyn CommandFactory>>,
    stdout: Sink,
    stderr: Sink,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(session: Session, commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            session,
            commands,
            stdout: Sink::Stdout,
            stderr: Sink::Stderr,
        }
    }

    /// Replace the streams used when a line does not redirect them.
    pub fn with_streams(mut self, stdout: Sink, stderr: Sink) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Handle one raw input line to completion.
    ///
    /// Blank lines are ignored. Every other line is recorded in the history
    /// before it runs, whatever happens next. All failures are reported on
    /// the line's error sink; none of them stops the shell.
    pub fn execute_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        let tokens = lexer::split_into_tokens(line);
        if tokens.is_empty() {
            return Flow::Continue(0);
        }
        debug!("tokens: {tokens:?}");

        if let Err(e) = self.session.record(line) {
            warn!("history append failed: {e}");
            let _ = writeln!(self.stderr, "failed to save history: {e}");
        }

        let status = match redirect::resolve(tokens, &self.session.env) {
            Ok(resolved) => self.dispatch(resolved),
            Err(e) => {
                let _ = writeln!(self.stderr, "{e}");
                2
            }
        };

        match self.session.take_exit_request() {
            Some(code) => Flow::Exit(code),
            None => Flow::Continue(status),
        }
    }

    /// Runs a resolved line. The redirection files it owns are closed when
    /// this returns, on every path.
    fn dispatch(&mut self, resolved: ResolvedCommand) -> ExitCode {
        let ResolvedCommand {
            args,
            stdout,
            stderr,
        } = resolved;

        let mut io = match self.command_io(stdout, stderr) {
            Ok(io) => io,
            Err(e) => {
                let _ = writeln!(self.stderr, "{e}");
                return 1;
            }
        };

        let mut words = args.iter().map(|arg| expand_word(arg, &self.session.env));
        let Some(name) = words.next() else {
            return 0;
        };
        let args: Vec<String> = words.collect();
        debug!("dispatching {name} {args:?}");

        let status = match self.run_with(&name, &args, &mut io) {
            Ok(code) => code,
            Err(e) => {
                let _ = writeln!(io.stderr, "{e}");
                1
            }
        };
        let _ = io.stdout.flush();
        let _ = io.stderr.flush();
        status
    }

    fn command_io(
        &self,
        stdout: Option<std::fs::File>,
        stderr: Option<std::fs::File>,
    ) -> std::io::Result<CommandIo> {
        Ok(CommandIo {
            stdout: match stdout {
                Some(file) => Sink::File(file),
                None => self.stdout.try_clone()?,
            },
            stderr: match stderr {
                Some(file) => Sink::File(file),
                None => self.stderr.try_clone()?,
            },
        })
    }

    fn run_with(
        &mut self,
        name: &str,
        args: &[String],
        io: &mut CommandIo,
    ) -> anyhow::Result<ExitCode> {
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.session, name, args) {
                return cmd.execute(io, &mut self.session);
            }
        }
        Err(ShellError::CommandNotFound(name.to_string()).into())
    }

    /// Run a single command invocation by name with arguments, on the
    /// interpreter's own streams.
    ///
    /// Returns the command's exit code or an error if the command cannot be created
    /// or fails to execute.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let mut io = self.command_io(None, None)?;
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.run_with(name, &args, &mut io)
    }

    /// Read-Eval-Print Loop over the terminal until `exit` or end of input.
    ///
    /// Returns the status the shell should exit with.
    pub fn repl(&mut self, prompts: &PromptConfig) -> rustyline::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;

        loop {
            let prompt = prompts.render(self.session.identity());
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Flow::Exit(code) = self.execute_line(&line) {
                        return Ok(code);
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(0),
                Err(err) => return Err(err),
            }
        }
    }
}

/// The built-ins followed by the external command launcher.
pub fn default_commands() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::*;
    use crate::external::ExternalCommand;
    vec![
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<Cat>::default()),
        Box::new(Factory::<Type>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Login>::default()),
        Box::new(Factory::<Logout>::default()),
        Box::new(Factory::<AddUser>::default()),
        Box::new(Factory::<History>::default()),
        Box::new(Factory::<Ls>::default()),
        Box::new(Factory::<ExternalCommand>::default()),
    ]
}

impl Default for Interpreter {
    /// An interpreter over the process environment with in-memory users and
    /// history and every built-in.
    fn default() -> Self {
        Self::new(Session::in_memory(), default_commands())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::io_adapters::MemWriter;
    use crate::error::StoreError;
    use crate::store::{HistoryEntry, HistoryStore, MemoryHistoryStore, MemoryUserStore};
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    struct Shell {
        sh: Interpreter,
        out: MemWriter,
        err: MemWriter,
    }

    impl Shell {
        fn in_dir(dir: &Path) -> Self {
            Self::with_history(dir, Box::new(MemoryHistoryStore::new()))
        }

        fn with_history(dir: &Path, history: Box<dyn HistoryStore>) -> Self {
            let mut vars = HashMap::new();
            vars.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
            let env = Environment {
                vars,
                current_dir: fs::canonicalize(dir).expect("canonicalize"),
            };
            let session = Session::new(env, Box::new(MemoryUserStore::new()), history);
            let (out, err) = (MemWriter::new(), MemWriter::new());
            let sh = Interpreter::new(session, default_commands())
                .with_streams(Sink::Memory(out.clone()), Sink::Memory(err.clone()));
            Shell { sh, out, err }
        }

        fn line(&mut self, line: &str) -> Flow {
            self.sh.execute_line(line)
        }

        fn take_out(&self) -> String {
            let s = self.out.contents();
            self.out.clear();
            s
        }

        fn take_err(&self) -> String {
            let s = self.err.contents();
            self.err.clear();
            s
        }
    }

    /// History store whose disk is always full.
    struct FullDisk;

    impl HistoryStore for FullDisk {
        fn append(&mut self, _identity: &str, _command: &str) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "history.json".to_string(),
                reason: std::io::Error::other("no space left"),
            })
        }

        fn query(&self, _identity: &str) -> Result<Vec<HistoryEntry>, StoreError> {
            Ok(Vec::new())
        }

        fn clear(&mut self, _identity: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn shell() -> (tempfile::TempDir, Shell) {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = Shell::in_dir(dir.path());
        (dir, shell)
    }

    #[test]
    fn blank_lines_do_nothing() {
        let (_dir, mut sh) = shell();
        assert_eq!(sh.line(""), Flow::Continue(0));
        assert_eq!(sh.line("  \t "), Flow::Continue(0));
        assert!(sh.sh.session().history().unwrap().is_empty());
        assert_eq!(sh.take_out(), "");
    }

    #[test]
    fn echo_quoting_rules() {
        let (_dir, mut sh) = shell();
        sh.sh.session_mut().env.set_var("WHO", "world");
        sh.line("echo 'hello $WHO' \"hello $WHO\" $WHO");
        assert_eq!(sh.take_out(), "hello $WHO hello world world\n");
        sh.line("echo \"hi $NOPE_VAR_XYZ\"");
        assert_eq!(sh.take_out(), "hi \n");
    }

    #[test]
    fn quoted_operator_is_an_argument() {
        let (dir, mut sh) = shell();
        sh.line("echo a '>' b");
        assert_eq!(sh.take_out(), "a > b\n");
        assert!(!dir.path().join("b").exists());
    }

    #[test]
    fn output_redirection_truncates_and_appends() -> anyhow::Result<()> {
        let (dir, mut sh) = shell();
        let file = dir.path().join("out.txt");

        sh.line("echo a > out.txt");
        assert_eq!(fs::read_to_string(&file)?, "a\n");
        sh.line("cat out.txt");
        assert_eq!(sh.take_out(), "a\n");

        sh.line("echo b >> out.txt");
        assert_eq!(fs::read_to_string(&file)?, "a\nb\n");

        sh.line("echo b 1> out.txt");
        assert_eq!(fs::read_to_string(&file)?, "b\n");
        assert_eq!(sh.take_out(), "");
        Ok(())
    }

    #[test]
    fn error_redirection_leaves_output_inherited() -> anyhow::Result<()> {
        let (dir, mut sh) = shell();
        sh.line("echo foo 2> err.txt");
        assert_eq!(sh.take_out(), "foo\n");
        assert_eq!(fs::read_to_string(dir.path().join("err.txt"))?, "");

        sh.line("cat missing.txt 2>> err.txt");
        assert_eq!(sh.take_out(), "");
        assert_eq!(sh.take_err(), "");
        assert!(fs::read_to_string(dir.path().join("err.txt"))?.starts_with("cat: missing.txt: "));
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn failing_external_command_writes_nothing_to_stdout() -> anyhow::Result<()> {
        let (dir, mut sh) = shell();
        let status = sh.line("sh -c 'echo bad >&2; exit 3' 2> err.txt");
        assert_eq!(status, Flow::Continue(3));
        assert_eq!(sh.take_out(), "");
        assert_eq!(sh.take_err(), "");
        assert_eq!(
            fs::read_to_string(dir.path().join("err.txt"))?,
            "bad\nsh: exit status 3\n"
        );
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn external_command_runs_in_session_directory() -> anyhow::Result<()> {
        let (dir, mut sh) = shell();
        fs::create_dir(dir.path().join("sub"))?;
        sh.line("cd sub");
        sh.line("sh -c pwd > where.txt");
        let expected = fs::canonicalize(dir.path().join("sub"))?;
        assert_eq!(
            fs::read_to_string(dir.path().join("sub/where.txt"))?,
            format!("{}\n", expected.display())
        );
        Ok(())
    }

    #[test]
    fn unknown_command_is_reported() {
        let (_dir, mut sh) = shell();
        assert_eq!(sh.line("no_such_command_xyz arg"), Flow::Continue(1));
        assert_eq!(sh.take_err(), "no_such_command_xyz: command not found\n");
    }

    #[test]
    fn missing_redirection_target_runs_nothing() {
        let (_dir, mut sh) = shell();
        assert_eq!(sh.line("echo hi >"), Flow::Continue(2));
        assert_eq!(sh.take_out(), "");
        assert_eq!(
            sh.take_err(),
            "syntax error: no file specified for output redirection\n"
        );
    }

    #[test]
    fn unopenable_target_runs_nothing() {
        let (_dir, mut sh) = shell();
        sh.line("echo hi > no/such/dir/file");
        assert_eq!(sh.take_out(), "");
        assert!(sh.take_err().starts_with("error opening file: no/such/dir/file"));
    }

    #[test]
    fn doubled_output_redirection_last_wins() -> anyhow::Result<()> {
        let (dir, mut sh) = shell();
        sh.line("echo x > first.txt > second.txt");
        assert_eq!(fs::read_to_string(dir.path().join("first.txt"))?, "");
        assert_eq!(fs::read_to_string(dir.path().join("second.txt"))?, "x\n");
        Ok(())
    }

    #[test]
    fn redirections_only_line_creates_file() {
        let (dir, mut sh) = shell();
        assert_eq!(sh.line("> empty.txt"), Flow::Continue(0));
        assert!(dir.path().join("empty.txt").exists());
    }

    #[test]
    fn exit_flow() {
        let (_dir, mut sh) = shell();
        assert!(matches!(sh.line("exit abc"), Flow::Continue(_)));
        assert_eq!(sh.take_err(), "exit: invalid status code\n");
        assert!(matches!(sh.line("exit 1 2"), Flow::Continue(_)));
        assert_eq!(sh.take_err(), "exit: too many arguments\n");
        assert_eq!(sh.take_out(), "");
        assert_eq!(sh.line("exit 5"), Flow::Exit(5));
        assert_eq!(sh.take_out(), "exit status 5\n");
        assert_eq!(sh.line("exit"), Flow::Exit(0));
    }

    #[test]
    fn exit_validation_error_goes_to_redirected_error_sink() -> anyhow::Result<()> {
        let (dir, mut sh) = shell();
        assert!(matches!(sh.line("exit x 2> err.txt"), Flow::Continue(_)));
        assert_eq!(sh.take_err(), "");
        assert_eq!(
            fs::read_to_string(dir.path().join("err.txt"))?,
            "exit: invalid status code\n"
        );
        Ok(())
    }

    #[test]
    fn authenticated_history_ordering() {
        let (_dir, mut sh) = shell();
        sh.line("adduser alice pw");
        sh.line("login alice pw");
        sh.take_out();
        sh.line("echo b");
        sh.line("echo a");
        sh.line("echo b");
        sh.line("pwd");
        sh.take_out();

        sh.line("history");
        assert_eq!(
            sh.take_out(),
            "| echo b | 2 |\n| echo a | 1 |\n| pwd | 1 |\n"
        );

        sh.line("history clean");
        sh.line("history");
        assert_eq!(sh.take_out(), "empty command history\n");
    }

    #[test]
    fn anonymous_history_survives_login_and_logout() {
        let (_dir, mut sh) = shell();
        sh.line("echo one");
        sh.line("adduser bob");
        sh.line("login bob");
        sh.line("logout");
        sh.take_out();
        sh.line("history");
        assert_eq!(
            sh.take_out(),
            "| adduser bob | 1 |\n| echo one | 1 |\n| login bob | 1 |\n"
        );
    }

    #[test]
    fn history_records_lines_that_fail() {
        let (_dir, mut sh) = shell();
        sh.line("echo >");
        sh.line("history");
        assert_eq!(sh.take_out(), "| echo > | 1 |\n");
    }

    #[test]
    fn cd_changes_relative_resolution() -> anyhow::Result<()> {
        let (dir, mut sh) = shell();
        fs::create_dir(dir.path().join("sub"))?;
        sh.line("cd sub");
        sh.line("echo inside > f.txt");
        assert_eq!(fs::read_to_string(dir.path().join("sub/f.txt"))?, "inside\n");
        sh.line("ls");
        assert_eq!(sh.take_out(), "f.txt\n");
        Ok(())
    }

    #[test]
    fn run_uses_interpreter_streams() -> anyhow::Result<()> {
        let (_dir, mut sh) = shell();
        assert_eq!(sh.sh.run("echo", &["plain", "args"])?, 0);
        assert_eq!(sh.take_out(), "plain args\n");
        assert!(sh.sh.run("no_such_command_xyz", &[]).is_err());
        Ok(())
    }

    #[test]
    fn history_save_failure_is_reported_and_line_still_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sh = Shell::with_history(dir.path(), Box::new(FullDisk));
        sh.sh.session_mut().login("alice");

        assert_eq!(sh.line("echo still runs"), Flow::Continue(0));
        assert_eq!(sh.take_out(), "still runs\n");
        assert_eq!(
            sh.take_err(),
            "failed to save history: history.json: no space left\n"
        );
    }
}
