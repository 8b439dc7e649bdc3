use crate::command::{CommandFactory, CommandIo, ExecutableCommand, ExitCode};
use crate::error::ShellError;
use crate::external::find_command_path;
use crate::interpreter::Factory;
use crate::session::Session;
use crate::store::{Creation, Verification};
use anyhow::Result;
use log::info;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Names of all commands implemented inside the shell.
pub const BUILTIN_NAMES: [&str; 11] = [
    "exit", "echo", "cat", "type", "pwd", "cd", "login", "logout", "adduser", "history", "ls",
];

/// Built-in commands known to the shell at compile time.
///
/// Arguments are validated by [`BuiltinCommand::from_args`] before anything
/// runs; a rejected argument list never reaches `execute`.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Builds the command from its (already expanded) arguments.
    fn from_args(args: &[String]) -> Result<Self, ShellError>;

    /// Executes the command using the provided sinks and session.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        match T::execute(*self, io, session) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(io.stderr, "{e}")?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    error: ShellError,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, io: &mut CommandIo, _session: &mut Session) -> Result<ExitCode> {
        writeln!(io.stderr, "{}", self.error)?;
        Ok(2)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _session: &Session,
        name: &str,
        args: &[String],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(args) {
                Ok(cmd) => Box::new(cmd),
                Err(error) => Box::new(InvalidArgs { error }),
            })
        } else {
            None
        }
    }
}

fn invalid(message: impl Into<String>) -> ShellError {
    ShellError::Validation(message.into())
}

/// Splits `USER [PASSWORD]`; a missing password is the empty password.
fn credentials(command: &str, args: &[String]) -> Result<(String, String), ShellError> {
    match args {
        [user] => Ok((user.clone(), String::new())),
        [user, password] => Ok((user.clone(), password.clone())),
        _ => Err(invalid(format!("{command}: invalid arguments"))),
    }
}

/// Leave the shell with status 0, or with the given status.
pub struct Exit {
    pub code: ExitCode,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        match args {
            [] => Ok(Exit { code: 0 }),
            [code] => code
                .parse()
                .map(|code| Exit { code })
                .map_err(|_| invalid("exit: invalid status code")),
            _ => Err(invalid("exit: too many arguments")),
        }
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        writeln!(io.stdout, "exit status {}", self.code)?;
        session.request_exit(self.code);
        Ok(self.code)
    }
}

/// Write the arguments separated by spaces, then a newline.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        Ok(Echo {
            args: args.to_vec(),
        })
    }

    fn execute(self, io: &mut CommandIo, _session: &mut Session) -> Result<ExitCode> {
        writeln!(io.stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

/// Print file(s) to the output sink.
pub struct Cat {
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        if args.is_empty() {
            return Err(invalid("cat: missing file argument"));
        }
        Ok(Cat {
            files: args.to_vec(),
        })
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        let mut status = 0;
        for fname in self.files {
            match fs::File::open(session.env.resolve(&fname)) {
                Ok(mut f) => {
                    std::io::copy(&mut f, &mut io.stdout)?;
                }
                Err(e) => {
                    writeln!(io.stderr, "cat: {fname}: {e}")?;
                    status = 1;
                }
            }
        }
        Ok(status)
    }
}

/// Tell whether each name is a built-in or which program it runs.
pub struct Type {
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        if args.is_empty() {
            return Err(invalid("type: missing argument"));
        }
        Ok(Type {
            names: args.to_vec(),
        })
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        let search_paths = session.env.get_var("PATH").unwrap_or_default();
        let mut status = 0;
        for name in self.names {
            if BUILTIN_NAMES.contains(&name.as_str()) {
                writeln!(io.stdout, "{name} is a shell builtin")?;
                continue;
            }
            match find_command_path(
                OsStr::new(&search_paths),
                &session.env.current_dir,
                Path::new(&name),
            ) {
                Some(path) => writeln!(io.stdout, "{name} is {}", path.display())?,
                None => {
                    writeln!(io.stderr, "{}", ShellError::CommandNotFound(name))?;
                    status = 1;
                }
            }
        }
        Ok(status)
    }
}

/// Print the current working directory.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn from_args(_args: &[String]) -> Result<Self, ShellError> {
        Ok(Pwd {})
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        writeln!(io.stdout, "{}", session.env.current_dir.display())?;
        Ok(0)
    }
}

/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        match args {
            [] => Ok(Cd { target: None }),
            [target] => Ok(Cd {
                target: Some(target.clone()),
            }),
            _ => Err(invalid("cd: too many arguments")),
        }
    }

    fn execute(self, _io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        let home = session.env.home_dir();
        let target = match self.target.as_deref() {
            None | Some("") | Some("~") => {
                home.ok_or_else(|| ShellError::Lookup("cd: HOME not set".into()))?
            }
            Some(t) => match (t.strip_prefix("~/"), home) {
                (Some(rest), Some(home)) => home.join(rest),
                _ => PathBuf::from(t),
            },
        };

        let new_dir = session.env.resolve(&target);
        let canonical = fs::canonicalize(&new_dir)
            .map_err(|e| ShellError::Io(format!("cd: {}: {}", target.display(), e)))?;
        if !canonical.is_dir() {
            return Err(ShellError::Io(format!("cd: {}: Not a directory", target.display())).into());
        }
        session.env.current_dir = canonical;
        Ok(0)
    }
}

/// Authenticate the session as USER.
pub struct Login {
    pub username: String,
    pub password: String,
}

impl BuiltinCommand for Login {
    fn name() -> &'static str {
        "login"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        let (username, password) = credentials("login", args)?;
        Ok(Login { username, password })
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        match session.users().verify(&self.username, &self.password)? {
            Verification::Success => {
                session.login(self.username);
                writeln!(io.stdout, "login successful")?;
                Ok(0)
            }
            Verification::NotFound => {
                info!("login failed for {}: no such user", self.username);
                Err(ShellError::Auth("login: user not found".into()).into())
            }
            Verification::Mismatch => {
                info!("login failed for {}: wrong password", self.username);
                Err(ShellError::Auth("login: incorrect password".into()).into())
            }
        }
    }
}

/// End the authenticated session.
pub struct Logout {}

impl BuiltinCommand for Logout {
    fn name() -> &'static str {
        "logout"
    }

    fn from_args(_args: &[String]) -> Result<Self, ShellError> {
        Ok(Logout {})
    }

    fn execute(self, _io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        session.logout();
        Ok(0)
    }
}

/// Register a new user.
pub struct AddUser {
    pub username: String,
    pub password: String,
}

impl BuiltinCommand for AddUser {
    fn name() -> &'static str {
        "adduser"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        let (username, password) = credentials("adduser", args)?;
        Ok(AddUser { username, password })
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        match session.users_mut().create(&self.username, &self.password)? {
            Creation::Created => {
                info!("created user {}", self.username);
                writeln!(io.stdout, "user created successfully")?;
                Ok(0)
            }
            Creation::AlreadyExists => {
                Err(invalid("duplicate user exists with this username").into())
            }
        }
    }
}

/// Show the most frequent command lines, or forget them with `history clean`.
pub struct History {
    pub clean: bool,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        match args {
            [] => Ok(History { clean: false }),
            [sub] if sub == "clean" => Ok(History { clean: true }),
            _ => Err(invalid("history: usage: history [clean]")),
        }
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        if self.clean {
            session.clear_history()?;
            return Ok(0);
        }

        let entries = session.history()?;
        let mut shown = entries.iter().filter(|e| e.command != Self::name()).peekable();
        if shown.peek().is_none() {
            writeln!(io.stdout, "empty command history")?;
        }
        for entry in shown {
            writeln!(io.stdout, "| {} | {} |", entry.command, entry.count)?;
        }
        Ok(0)
    }
}

/// List the entries of a directory (the working directory by default).
pub struct Ls {
    pub dir: Option<String>,
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn from_args(args: &[String]) -> Result<Self, ShellError> {
        match args {
            [] => Ok(Ls { dir: None }),
            [dir] => Ok(Ls {
                dir: Some(dir.clone()),
            }),
            _ => Err(invalid("ls: too many arguments")),
        }
    }

    fn execute(self, io: &mut CommandIo, session: &mut Session) -> Result<ExitCode> {
        let shown = self.dir.as_deref().unwrap_or(".");
        let path = session.env.resolve(shown);
        let listing_error = |e: std::io::Error| ShellError::Io(format!("ls: {shown}: {e}"));

        let mut names = Vec::new();
        for entry in fs::read_dir(&path).map_err(listing_error)? {
            let entry = entry.map_err(listing_error)?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        writeln!(io.stdout, "{}", names.join(" "))?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::io_adapters::{MemWriter, Sink};
    use crate::store::{MemoryHistoryStore, MemoryUserStore};
    use std::collections::HashMap;

    struct Harness {
        session: Session,
        out: MemWriter,
        err: MemWriter,
    }

    impl Harness {
        fn new(dir: &Path) -> Self {
            let env = Environment {
                vars: HashMap::new(),
                current_dir: dir.to_path_buf(),
            };
            Harness {
                session: Session::new(
                    env,
                    Box::new(MemoryUserStore::new()),
                    Box::new(MemoryHistoryStore::new()),
                ),
                out: MemWriter::new(),
                err: MemWriter::new(),
            }
        }

        /// Runs one built-in through its factory, as the dispatcher would.
        fn run<T: BuiltinCommand + 'static>(&mut self, args: &[&str]) -> ExitCode {
            self.out.clear();
            self.err.clear();
            let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            let cmd = Factory::<T>::default()
                .try_create(&self.session, T::name(), &args)
                .expect("factory recognizes its own name");
            let mut io = CommandIo {
                stdout: Sink::Memory(self.out.clone()),
                stderr: Sink::Memory(self.err.clone()),
            };
            cmd.execute(&mut io, &mut self.session).expect("sinks accept writes")
        }
    }

    fn temp_harness() -> (tempfile::TempDir, Harness) {
        let dir = tempfile::tempdir().expect("tempdir");
        let canonical = fs::canonicalize(dir.path()).expect("canonicalize");
        let harness = Harness::new(&canonical);
        (dir, harness)
    }

    #[test]
    fn test_factory_ignores_other_names() {
        let session = Session::in_memory();
        assert!(Factory::<Echo>::default().try_create(&session, "cat", &[]).is_none());
    }

    #[test]
    fn test_exit_codes() {
        let (_dir, mut h) = temp_harness();
        assert_eq!(h.run::<Exit>(&[]), 0);
        assert_eq!(h.out.contents(), "exit status 0\n");
        assert_eq!(h.session.take_exit_request(), Some(0));
        assert_eq!(h.run::<Exit>(&["7"]), 7);
        assert_eq!(h.out.contents(), "exit status 7\n");
        assert_eq!(h.session.take_exit_request(), Some(7));
    }

    #[test]
    fn test_exit_rejects_bad_arguments_without_exiting() {
        let (_dir, mut h) = temp_harness();
        assert_ne!(h.run::<Exit>(&["abc"]), 0);
        assert_eq!(h.err.contents(), "exit: invalid status code\n");
        assert_eq!(h.out.contents(), "");
        assert_eq!(h.session.take_exit_request(), None);

        assert_ne!(h.run::<Exit>(&["1", "2"]), 0);
        assert_eq!(h.err.contents(), "exit: too many arguments\n");
        assert_eq!(h.session.take_exit_request(), None);
    }

    #[test]
    fn test_echo_joins_arguments() {
        let (_dir, mut h) = temp_harness();
        assert_eq!(h.run::<Echo>(&["hello", "big world"]), 0);
        assert_eq!(h.out.contents(), "hello big world\n");
        h.run::<Echo>(&[]);
        assert_eq!(h.out.contents(), "\n");
    }

    #[test]
    fn test_cat_reads_files_and_reports_missing_ones() -> anyhow::Result<()> {
        let (dir, mut h) = temp_harness();
        fs::write(dir.path().join("a.txt"), "hello\nworld\n")?;
        let code = h.run::<Cat>(&["a.txt", "missing.txt", "a.txt"]);
        assert_eq!(code, 1);
        assert_eq!(h.out.contents(), "hello\nworld\nhello\nworld\n");
        assert!(h.err.contents().starts_with("cat: missing.txt: "));
        Ok(())
    }

    #[test]
    fn test_cat_requires_a_file() {
        let (_dir, mut h) = temp_harness();
        assert_ne!(h.run::<Cat>(&[]), 0);
        assert_eq!(h.err.contents(), "cat: missing file argument\n");
    }

    #[test]
    fn test_type_builtin_and_unknown() {
        let (_dir, mut h) = temp_harness();
        h.session.env.set_var("PATH", "/nonexistent-dir");
        let code = h.run::<Type>(&["echo", "no_such_cmd_xyz"]);
        assert_eq!(code, 1);
        assert_eq!(h.out.contents(), "echo is a shell builtin\n");
        assert_eq!(h.err.contents(), "no_such_cmd_xyz: command not found\n");

        assert_ne!(h.run::<Type>(&[]), 0);
        assert_eq!(h.err.contents(), "type: missing argument\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_type_finds_program_on_path() {
        let (_dir, mut h) = temp_harness();
        h.session.env.set_var("PATH", "/bin");
        assert_eq!(h.run::<Type>(&["sh"]), 0);
        assert_eq!(h.out.contents(), "sh is /bin/sh\n");
    }

    #[test]
    fn test_pwd_prints_session_dir() {
        let (dir, mut h) = temp_harness();
        assert_eq!(h.run::<Pwd>(&[]), 0);
        let expected = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(h.out.contents(), format!("{}\n", expected.display()));
    }

    #[test]
    fn test_cd_relative_absolute_and_home() -> anyhow::Result<()> {
        let (dir, mut h) = temp_harness();
        let root = fs::canonicalize(dir.path())?;
        fs::create_dir_all(root.join("sub/inner"))?;

        assert_eq!(h.run::<Cd>(&["sub"]), 0);
        assert_eq!(h.session.env.current_dir, root.join("sub"));
        assert_eq!(h.run::<Cd>(&["inner/.."]), 0);
        assert_eq!(h.session.env.current_dir, root.join("sub"));

        h.session.env.set_var("HOME", root.join("sub/inner").to_string_lossy());
        assert_eq!(h.run::<Cd>(&[]), 0);
        assert_eq!(h.session.env.current_dir, root.join("sub/inner"));

        let absolute = root.to_string_lossy().to_string();
        assert_eq!(h.run::<Cd>(&[absolute.as_str()]), 0);
        assert_eq!(h.session.env.current_dir, root);
        Ok(())
    }

    #[test]
    fn test_cd_failures_keep_directory() -> anyhow::Result<()> {
        let (dir, mut h) = temp_harness();
        let before = h.session.env.current_dir.clone();
        fs::write(dir.path().join("file.txt"), "")?;

        assert_eq!(h.run::<Cd>(&["does-not-exist"]), 1);
        assert!(h.err.contents().starts_with("cd: does-not-exist: "));
        assert_eq!(h.run::<Cd>(&["file.txt"]), 1);
        assert_eq!(h.err.contents(), "cd: file.txt: Not a directory\n");

        h.session.env.set_var("HOME", "");
        assert_eq!(h.run::<Cd>(&[]), 1);
        assert_eq!(h.err.contents(), "cd: HOME not set\n");
        assert_eq!(h.session.env.current_dir, before);
        Ok(())
    }

    #[test]
    fn test_adduser_and_login() {
        let (_dir, mut h) = temp_harness();
        assert_eq!(h.run::<AddUser>(&["alice", "pw"]), 0);
        assert_eq!(h.out.contents(), "user created successfully\n");
        assert_eq!(h.run::<AddUser>(&["alice", "other"]), 1);
        assert_eq!(h.err.contents(), "duplicate user exists with this username\n");

        assert_eq!(h.run::<Login>(&["alice", "bad"]), 1);
        assert_eq!(h.err.contents(), "login: incorrect password\n");
        assert_eq!(h.run::<Login>(&["bob"]), 1);
        assert_eq!(h.err.contents(), "login: user not found\n");
        assert_eq!(h.session.identity(), None);

        assert_eq!(h.run::<Login>(&["alice", "pw"]), 0);
        assert_eq!(h.out.contents(), "login successful\n");
        assert_eq!(h.session.identity(), Some("alice"));

        assert_eq!(h.run::<Logout>(&[]), 0);
        assert_eq!(h.session.identity(), None);
    }

    #[test]
    fn test_login_without_password_uses_empty_password() {
        let (_dir, mut h) = temp_harness();
        h.run::<AddUser>(&["guest"]);
        assert_eq!(h.run::<Login>(&["guest"]), 0);
        assert_eq!(h.session.identity(), Some("guest"));
    }

    #[test]
    fn test_credential_argument_count() {
        let (_dir, mut h) = temp_harness();
        assert_ne!(h.run::<Login>(&[]), 0);
        assert_eq!(h.err.contents(), "login: invalid arguments\n");
        assert_ne!(h.run::<AddUser>(&["a", "b", "c"]), 0);
        assert_eq!(h.err.contents(), "adduser: invalid arguments\n");
    }

    #[test]
    fn test_history_display_and_clean() -> anyhow::Result<()> {
        let (_dir, mut h) = temp_harness();
        for line in ["echo b", "echo a", "history", "echo b", "ls"] {
            h.session.record(line)?;
        }
        h.run::<History>(&[]);
        assert_eq!(
            h.out.contents(),
            "| echo b | 2 |\n| echo a | 1 |\n| ls | 1 |\n"
        );

        h.run::<History>(&["clean"]);
        h.session.record("history")?;
        h.run::<History>(&[]);
        assert_eq!(h.out.contents(), "empty command history\n");
        Ok(())
    }

    #[test]
    fn test_history_rejects_unknown_subcommand() {
        let (_dir, mut h) = temp_harness();
        assert_ne!(h.run::<History>(&["purge"]), 0);
        assert_eq!(h.err.contents(), "history: usage: history [clean]\n");
    }

    #[test]
    fn test_ls_lists_sorted_names() -> anyhow::Result<()> {
        let (dir, mut h) = temp_harness();
        fs::write(dir.path().join("b.txt"), "")?;
        fs::write(dir.path().join("a.txt"), "")?;
        fs::create_dir(dir.path().join("c"))?;
        assert_eq!(h.run::<Ls>(&[]), 0);
        assert_eq!(h.out.contents(), "a.txt b.txt c\n");

        fs::write(dir.path().join("c/inner"), "")?;
        assert_eq!(h.run::<Ls>(&["c"]), 0);
        assert_eq!(h.out.contents(), "inner\n");

        assert_eq!(h.run::<Ls>(&["nope"]), 1);
        assert!(h.err.contents().starts_with("ls: nope: "));
        Ok(())
    }

    #[test]
    fn test_every_builtin_name_is_dispatched() {
        let session = Session::in_memory();
        let factories = crate::interpreter::default_commands();
        for name in BUILTIN_NAMES {
            let args = if name == "cat" || name == "type" || name == "login" || name == "adduser" {
                vec!["x".to_string()]
            } else {
                Vec::new()
            };
            let found = factories
                .iter()
                .filter_map(|f| f.try_create(&session, name, &args))
                .count();
            assert!(found >= 1, "no factory for {name}");
        }
    }
}
