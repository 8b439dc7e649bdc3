use crate::command::ExitCode;
use crate::config::{Backend, Config};
use crate::env::Environment;
use crate::error::StoreError;
use crate::store::history::rank;
use crate::store::{
    CredentialStore, HistoryEntry, HistoryStore, JsonHistoryStore, JsonUserStore,
    MemoryHistoryStore, MemoryUserStore,
};
use log::info;

/// State that outlives a single input line.
///
/// Everything a command may read or change between lines is kept here and
/// handed to commands explicitly.
pub struct Session {
    /// Variables and working directory.
    pub env: Environment,
    identity: Option<String>,
    /// Lines entered while nobody is logged in.
    fallback_history: Vec<String>,
    users: Box<dyn CredentialStore>,
    history: Box<dyn HistoryStore>,
    exit_request: Option<ExitCode>,
}

impl Session {
    pub fn new(
        env: Environment,
        users: Box<dyn CredentialStore>,
        history: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            env,
            identity: None,
            fallback_history: Vec::new(),
            users,
            history,
            exit_request: None,
        }
    }

    /// A session over the process environment whose users and history are
    /// forgotten on exit.
    pub fn in_memory() -> Self {
        Self::new(
            Environment::new(),
            Box::new(MemoryUserStore::new()),
            Box::new(MemoryHistoryStore::new()),
        )
    }

    /// A session with the stores selected by `config`.
    pub fn open(config: &Config, env: Environment) -> Result<Self, StoreError> {
        match config.storage.backend {
            Backend::Memory => Ok(Self::new(
                env,
                Box::new(MemoryUserStore::new()),
                Box::new(MemoryHistoryStore::new()),
            )),
            Backend::File => {
                let dir = config.data_dir(&env);
                info!("using data directory {}", dir.display());
                let users = JsonUserStore::open(dir.join("users.json"))?;
                let history = JsonHistoryStore::open(dir.join("history.json"))?;
                Ok(Self::new(env, Box::new(users), Box::new(history)))
            }
        }
    }

    /// The logged-in user, if any.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn login(&mut self, username: impl Into<String>) {
        let username = username.into();
        info!("session authenticated as {username}");
        self.identity = Some(username);
    }

    pub fn logout(&mut self) -> Option<String> {
        let previous = self.identity.take();
        if let Some(name) = &previous {
            info!("{name} logged out");
        }
        previous
    }

    pub fn users(&self) -> &dyn CredentialStore {
        self.users.as_ref()
    }

    pub fn users_mut(&mut self) -> &mut dyn CredentialStore {
        self.users.as_mut()
    }

    /// Adds one accepted input line to the history of whoever is logged in,
    /// or to the session list when nobody is.
    pub fn record(&mut self, line: &str) -> Result<(), StoreError> {
        match &self.identity {
            Some(user) => self.history.append(user, line),
            None => {
                self.fallback_history.push(line.to_string());
                Ok(())
            }
        }
    }

    /// History of the current identity, or of the session when anonymous.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        match &self.identity {
            Some(user) => self.history.query(user),
            None => Ok(rank(self.fallback_history.iter().map(String::as_str))),
        }
    }

    pub fn clear_history(&mut self) -> Result<(), StoreError> {
        match &self.identity {
            Some(user) => self.history.clear(user),
            None => {
                self.fallback_history.clear();
                Ok(())
            }
        }
    }

    /// Asks the shell to terminate once the current line is done.
    pub fn request_exit(&mut self, code: ExitCode) {
        self.exit_request = Some(code);
    }

    pub fn take_exit_request(&mut self) -> Option<ExitCode> {
        self.exit_request.take()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::in_memory()
    }
}
