//! Lexical analysis of one input line into argument tokens.
//!
//! Quote characters are kept in the produced tokens so that consumers can
//! tell literal (`'...'`), interpolated (`"..."`) and bare words apart; see
//! [`crate::expand`] for the second pass that strips them.

/// Characters a backslash may escape inside double quotes.
const DOUBLE_QUOTE_ESCAPABLE: [char; 5] = ['$', '\'', '"', '\\', 'n'];

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    in_single: bool,
    in_double: bool,
    escape: bool,
    buffer: String,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            in_single: false,
            in_double: false,
            escape: false,
            buffer: String::new(),
        }
    }

    /// Single pass over the input. Never fails: an unterminated quote simply
    /// ends with the rest of the line in the last token.
    fn make_tokens(&mut self) -> Vec<String> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            if self.escape {
                self.handle_escaped(ch);
                continue;
            }
            match ch {
                '\\' => self.handle_backslash(),
                '\'' if !self.in_double => self.handle_single_quote(&mut out),
                '"' if !self.in_single => self.handle_double_quote(&mut out),
                ' ' | '\t' if !self.in_single && !self.in_double => self.flush(&mut out),
                c => self.buffer.push(c),
            }
        }

        if self.escape {
            self.buffer.push('\\');
        }
        self.flush(&mut out);
        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn handle_escaped(&mut self, ch: char) {
        if !DOUBLE_QUOTE_ESCAPABLE.contains(&ch) {
            self.buffer.push('\\');
        }
        self.buffer.push(ch);
        self.escape = false;
    }

    fn handle_backslash(&mut self) {
        if self.in_double {
            self.escape = true;
        } else {
            self.buffer.push('\\');
        }
    }

    fn handle_single_quote(&mut self, out: &mut Vec<String>) {
        if self.in_single {
            self.in_single = false;
            self.buffer.push('\'');
            self.emit(out);
        } else {
            self.in_single = true;
            self.flush(out);
            self.buffer.push('\'');
        }
    }

    fn handle_double_quote(&mut self, out: &mut Vec<String>) {
        self.in_double = !self.in_double;
        self.buffer.push('"');
        if !self.in_double {
            self.emit(out);
        }
    }

    /// Ends the current token if there is one.
    fn flush(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() {
            self.emit(out);
        }
    }

    fn emit(&mut self, out: &mut Vec<String>) {
        out.push(std::mem::take(&mut self.buffer));
    }
}

/// Splits a raw input line into its ordered argument tokens.
///
/// An empty or whitespace-only line yields no tokens.
pub fn split_into_tokens(line: &str) -> Vec<String> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}
