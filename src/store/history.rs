use super::{load_json, set_aside_if_corrupt, update_json};
use crate::error::StoreError;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// One distinct command line and how many times it was entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub command: String,
    pub count: usize,
}

/// Groups identical command lines, most frequent first, ties in lexical
/// order.
pub fn rank<'a>(commands: impl IntoIterator<Item = &'a str>) -> Vec<HistoryEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for command in commands {
        *counts.entry(command).or_default() += 1;
    }
    let mut entries: Vec<HistoryEntry> = counts
        .into_iter()
        .map(|(command, count)| HistoryEntry {
            command: command.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.command.cmp(&b.command)));
    entries
}

/// Per-identity record of entered command lines.
pub trait HistoryStore {
    fn append(&mut self, identity: &str, command: &str) -> Result<(), StoreError>;
    /// Entries ordered as by [`rank`].
    fn query(&self, identity: &str) -> Result<Vec<HistoryEntry>, StoreError>;
    fn clear(&mut self, identity: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    lines: Lines,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&mut self, identity: &str, command: &str) -> Result<(), StoreError> {
        self.lines
            .entry(identity.to_string())
            .or_default()
            .push(command.to_string());
        Ok(())
    }

    fn query(&self, identity: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(match self.lines.get(identity) {
            Some(lines) => rank(lines.iter().map(String::as_str)),
            None => Vec::new(),
        })
    }

    fn clear(&mut self, identity: &str) -> Result<(), StoreError> {
        self.lines.remove(identity);
        Ok(())
    }
}

type Lines = BTreeMap<String, Vec<String>>;

/// History persisted as a JSON object `{ identity: [line, ...] }`.
///
/// Nothing is cached: every call reads the file, and every change is a
/// read-modify-write, so shells sharing a data directory do not overwrite
/// each other's lines.
#[derive(Debug)]
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    /// Opens the store at `path`. A missing file is an empty store; a
    /// malformed one is moved aside with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        set_aside_if_corrupt::<Lines>(&path)?;
        Ok(Self { path })
    }
}

impl HistoryStore for JsonHistoryStore {
    fn append(&mut self, identity: &str, command: &str) -> Result<(), StoreError> {
        update_json(&self.path, |lines: &mut Lines| {
            lines
                .entry(identity.to_string())
                .or_default()
                .push(command.to_string());
            Ok(())
        })
    }

    fn query(&self, identity: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let lines: Lines = load_json(&self.path)?;
        MemoryHistoryStore { lines }.query(identity)
    }

    fn clear(&mut self, identity: &str) -> Result<(), StoreError> {
        update_json(&self.path, |lines: &mut Lines| {
            lines.remove(identity);
            Ok(())
        })
    }
}
