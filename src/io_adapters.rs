use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Result as IoResult, Write};
use std::process::Stdio;
use std::rc::Rc;

/// Destination of a command's output or error text.
///
/// Built-ins write through [`Write`]; external commands get a [`Stdio`]
/// handle from [`Sink::stdio`]. Handlers never touch the process streams
/// directly, so redirection is invisible to them.
pub enum Sink {
    /// The shell's own standard output.
    Stdout,
    /// The shell's own standard error.
    Stderr,
    /// A redirection target opened for this command.
    File(File),
    /// In-process capture, used when the shell itself is embedded or tested.
    Memory(MemWriter),
}

impl Sink {
    /// Another handle to the same destination.
    pub fn try_clone(&self) -> IoResult<Sink> {
        Ok(match self {
            Sink::Stdout => Sink::Stdout,
            Sink::Stderr => Sink::Stderr,
            Sink::File(f) => Sink::File(f.try_clone()?),
            Sink::Memory(m) => Sink::Memory(m.clone()),
        })
    }

    /// Handle for a child process.
    ///
    /// `None` means the destination lives inside this process: the child's
    /// stream must be piped and its bytes copied here with `write`.
    pub fn stdio(&self) -> IoResult<Option<Stdio>> {
        Ok(match self {
            Sink::Stdout | Sink::Stderr => Some(Stdio::inherit()),
            Sink::File(f) => Some(Stdio::from(f.try_clone()?)),
            Sink::Memory(_) => None,
        })
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        match self {
            Sink::Stdout => io::stdout().write(buf),
            Sink::Stderr => io::stderr().write(buf),
            Sink::File(f) => f.write(buf),
            Sink::Memory(m) => m.write(buf),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            Sink::Stdout => io::stdout().flush(),
            Sink::Stderr => io::stderr().flush(),
            Sink::File(f) => f.flush(),
            Sink::Memory(m) => m.flush(),
        }
    }
}

/// Memory-backed writer for capturing command output.
///
/// Clones share one buffer, so a caller can keep a handle and read what a
/// command wrote after it finished.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.buf.borrow_mut().clear();
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}
