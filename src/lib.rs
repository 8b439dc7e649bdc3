//! An interactive command shell with quoting, variable interpolation,
//! output/error redirection, a handful of built-ins and per-user history.
//!
//! Each input line goes through the same stages: [`lexer`] splits it into
//! tokens, [`redirect`] takes out the redirection operators and opens their
//! targets, [`expand`] strips quotes and substitutes `$NAME` references, and
//! finally the [`Interpreter`] dispatches the first word to a built-in or to
//! a program found on `PATH`.
//!
//! State that survives between lines (variables, working directory, the
//! logged-in user, history) is held by [`Session`]. Users and history are
//! kept behind the traits in [`store`], so they can live in memory or in
//! JSON files.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod expand;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod logging;
pub mod redirect;
pub mod session;
pub mod store;

/// The line dispatcher and REPL.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{Flow, Interpreter, default_commands};
pub use session::Session;
