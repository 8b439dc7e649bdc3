//! Extraction of `>`, `>>`, `1>`, `1>>`, `2>` and `2>>` from a token list.

use crate::env::Environment;
use crate::error::ShellError;
use crate::expand::expand_word;
use log::debug;
use std::fs::{File, OpenOptions};

/// Which of the command's streams a redirection replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Output,
    Error,
}

/// How the target file is opened. Both forms create a missing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

/// One operator together with the (still unexpanded) target token after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub stream: Stream,
    pub mode: WriteMode,
    pub target: String,
}

/// Recognizes a redirection operator token.
///
/// Quoted tokens such as `'>'` keep their quotes at this stage and are
/// therefore never operators.
pub fn parse_operator(token: &str) -> Option<(Stream, WriteMode)> {
    match token {
        ">" | "1>" => Some((Stream::Output, WriteMode::Truncate)),
        ">>" | "1>>" => Some((Stream::Output, WriteMode::Append)),
        "2>" => Some((Stream::Error, WriteMode::Truncate)),
        "2>>" => Some((Stream::Error, WriteMode::Append)),
        _ => None,
    }
}

/// Residual arguments of a line plus the streams its redirections opened.
///
/// The files are closed when this value is dropped, whichever way the
/// command's handling ends.
#[derive(Debug)]
pub struct ResolvedCommand {
    pub args: Vec<String>,
    pub stdout: Option<File>,
    pub stderr: Option<File>,
}

/// Separates redirections from ordinary arguments without touching the
/// filesystem.
pub fn split_redirections(
    tokens: Vec<String>,
) -> Result<(Vec<String>, Vec<Redirection>), ShellError> {
    let mut args = Vec::with_capacity(tokens.len());
    let mut redirections = Vec::new();
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        let Some((stream, mode)) = parse_operator(&token) else {
            args.push(token);
            continue;
        };
        let Some(target) = tokens.next() else {
            let which = match stream {
                Stream::Output => "output",
                Stream::Error => "error",
            };
            return Err(ShellError::Syntax(format!(
                "no file specified for {which} redirection"
            )));
        };
        redirections.push(Redirection {
            stream,
            mode,
            target,
        });
    }

    Ok((args, redirections))
}

/// Extracts redirections from `tokens` and opens their targets.
///
/// Targets are opened left to right and resolved against the session
/// working directory. When one stream is redirected more than once, every
/// target is still created (or truncated) and the last one receives the
/// output. On any error nothing stays open.
pub fn resolve(tokens: Vec<String>, env: &Environment) -> Result<ResolvedCommand, ShellError> {
    let (args, redirections) = split_redirections(tokens)?;
    let mut resolved = ResolvedCommand {
        args,
        stdout: None,
        stderr: None,
    };

    for redirection in redirections {
        let file = open_target(&redirection, env)?;
        match redirection.stream {
            Stream::Output => resolved.stdout = Some(file),
            Stream::Error => resolved.stderr = Some(file),
        }
    }

    Ok(resolved)
}

fn open_target(redirection: &Redirection, env: &Environment) -> Result<File, ShellError> {
    let name = expand_word(&redirection.target, env);
    let path = env.resolve(&name);
    debug!("redirecting {:?} ({:?}) to {}", redirection.stream, redirection.mode, path.display());

    let mut options = OpenOptions::new();
    options.create(true);
    match redirection.mode {
        WriteMode::Truncate => options.write(true).truncate(true),
        WriteMode::Append => options.append(true),
    };
    options
        .open(&path)
        .map_err(|e| ShellError::Io(format!("error opening file: {name}: {e}")))
}
