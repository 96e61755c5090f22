//! Shell command tokenizer and segmenter
//!
//! This is not a full POSIX shell grammar. The lexer understands enough of
//! it to find every program a command line would start:
//!
//! - single quotes, double quotes and backslash escapes
//! - control operators (`&&`, `||`, `|`, `|&`, `&`, `;`, newline, `(`, `)`)
//!   even when they are not surrounded by whitespace
//! - redirections, with an optional file-descriptor prefix (`2>&1`)
//! - command substitutions (`$(...)`, backticks, `<(...)`, `>(...)`), whose
//!   bodies are lexed recursively
//! - heredoc bodies, which are data; only an unquoted delimiter leaves their
//!   substitutions live
//! - wrappers such as `env`, `timeout` or `xargs`, whose wrapped program is
//!   a command in its own right
//!
//! Anything the lexer cannot resolve is a [`ParseError`], and callers treat
//! that as a reason to block.

use crate::gate::{CommandSegment, InvokedCommand, ParseError};
use tracing::debug;

/// Words skipped when looking for a command name
const SHELL_KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "for", "while", "until", "do", "done", "case", "esac",
    "in", "function", "!", "{", "}", "(", ")",
];

/// Control operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    And,
    Or,
    Pipe,
    PipeAll,
    Background,
    Semicolon,
    Newline,
    OpenParen,
    CloseParen,
}

impl Operator {
    /// Operators that delimit a [`CommandSegment`]
    fn is_chain(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Semicolon | Self::Newline)
    }
}

/// A shell word after quote removal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Word {
    pub text: String,
    /// Bodies of command substitutions found inside the word
    pub substitutions: Vec<String>,
    /// Length of `text` when quoting first appeared in the word
    pub quoted_at: Option<usize>,
}

impl Word {
    fn mark_quoted(&mut self) {
        if self.quoted_at.is_none() {
            self.quoted_at = Some(self.text.len());
        }
    }

    /// `NAME=value` or `NAME+=value` where NAME is an unquoted identifier
    pub fn is_assignment(&self) -> bool {
        let eq = match self.text.find('=') {
            Some(eq) => eq,
            None => return false,
        };
        if self.quoted_at.is_some_and(|at| at <= eq) {
            return false;
        }
        let name = &self.text[..eq];
        is_identifier(name.strip_suffix('+').unwrap_or(name))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Programs that run another program named in their arguments
struct Wrapper {
    name: &'static str,
    /// Options that consume the following word
    options_with_value: &'static [&'static str],
    /// Options whose value is itself a command line
    command_line_options: &'static [&'static str],
    /// Operands between the options and the wrapped program
    leading_operands: usize,
}

impl Wrapper {
    /// Command line attached to its option, as in `-Scmd` or `--split-string=cmd`
    fn inline_command_line<'w>(&self, word: &'w str) -> Option<&'w str> {
        self.command_line_options.iter().find_map(|option| {
            let rest = word.strip_prefix(option)?;
            if option.starts_with("--") {
                rest.strip_prefix('=')
            } else {
                Some(rest).filter(|rest| !rest.is_empty())
            }
        })
    }
}

const WRAPPERS: &[Wrapper] = &[
    Wrapper {
        name: "env",
        options_with_value: &["-u", "--unset", "-C", "--chdir"],
        command_line_options: &["-S", "--split-string"],
        leading_operands: 0,
    },
    Wrapper {
        name: "time",
        options_with_value: &["-f", "--format", "-o", "--output"],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "timeout",
        options_with_value: &["-s", "--signal", "-k", "--kill-after"],
        command_line_options: &[],
        leading_operands: 1,
    },
    Wrapper {
        name: "xargs",
        options_with_value: &[
            "-a", "--arg-file", "-d", "--delimiter", "-E", "-I", "-L", "-n", "--max-args", "-P",
            "--max-procs", "-s", "--max-chars",
        ],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "nice",
        options_with_value: &["-n", "--adjustment"],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "nohup",
        options_with_value: &[],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "stdbuf",
        options_with_value: &["-i", "-o", "-e", "--input", "--output", "--error"],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "command",
        options_with_value: &[],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "builtin",
        options_with_value: &[],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "exec",
        options_with_value: &["-a"],
        command_line_options: &[],
        leading_operands: 0,
    },
    Wrapper {
        name: "sudo",
        options_with_value: &[
            "-u", "--user", "-g", "--group", "-C", "--close-from", "-D", "--chdir", "-h", "--host",
            "-p", "--prompt", "-U", "--other-user", "-r", "--role", "-t", "--type", "-T",
            "--command-timeout",
        ],
        command_line_options: &[],
        leading_operands: 0,
    },
];

/// Position of a word inside one simple command
#[derive(Clone, Copy)]
enum Slot {
    /// The next plain word names a program
    Program,
    /// Inside a wrapper's own options and operands
    Wrapper {
        wrapper: &'static Wrapper,
        operands: usize,
        /// The next word is an option value; `true` if it is a command line
        value: Option<bool>,
        options_done: bool,
    },
    /// Everything else is an argument
    Arguments,
}

enum Role<'w> {
    Program,
    /// A wrapper option value that is itself a command line
    CommandLine(&'w str),
    Other,
}

impl Slot {
    fn classify<'w>(&mut self, word: &'w Word) -> Role<'w> {
        let text = word.text.as_str();
        match *self {
            Slot::Program => {
                if is_keyword(text) || text.starts_with('-') || word.is_assignment() {
                    return Role::Other;
                }
                let name = InvokedCommand::from_word(text);
                *self = match WRAPPERS.iter().find(|wrapper| name == wrapper.name) {
                    Some(wrapper) => Slot::Wrapper {
                        wrapper,
                        operands: wrapper.leading_operands,
                        value: None,
                        options_done: false,
                    },
                    None => Slot::Arguments,
                };
                Role::Program
            }
            Slot::Wrapper {
                wrapper,
                operands,
                value,
                options_done,
            } => {
                if let Some(is_command_line) = value {
                    *self = Slot::Wrapper {
                        wrapper,
                        operands,
                        value: None,
                        options_done,
                    };
                    return if is_command_line {
                        Role::CommandLine(text)
                    } else {
                        Role::Other
                    };
                }

                if !options_done && text.starts_with('-') && text.len() > 1 {
                    let value = if wrapper.command_line_options.contains(&text) {
                        Some(true)
                    } else if wrapper.options_with_value.contains(&text) {
                        Some(false)
                    } else {
                        None
                    };
                    *self = Slot::Wrapper {
                        wrapper,
                        operands,
                        value,
                        options_done: text == "--",
                    };
                    return match wrapper.inline_command_line(text) {
                        Some(line) => Role::CommandLine(line),
                        None => Role::Other,
                    };
                }

                if word.is_assignment() {
                    return Role::Other;
                }
                if operands > 0 {
                    *self = Slot::Wrapper {
                        wrapper,
                        operands: operands - 1,
                        value,
                        options_done,
                    };
                    return Role::Other;
                }

                *self = Slot::Program;
                self.classify(word)
            }
            Slot::Arguments => Role::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word(Word),
    Operator(Operator),
    Redirect(String),
}

/// A token with its byte span in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Default)]
struct WordBuf {
    word: Word,
    start: Option<usize>,
}

impl WordBuf {
    fn begin(&mut self, offset: usize) {
        if self.start.is_none() {
            self.start = Some(offset);
        }
    }

    fn started(&self) -> bool {
        self.start.is_some()
    }

    fn is_fd_number(&self, quoted: bool) -> bool {
        !quoted
            && !self.word.text.is_empty()
            && self.word.substitutions.is_empty()
            && self.word.text.chars().all(|c| c.is_ascii_digit())
    }

    fn flush(&mut self, end: usize, tokens: &mut Vec<Token>) {
        if let Some(start) = self.start.take() {
            tokens.push(Token {
                kind: TokenKind::Word(std::mem::take(&mut self.word)),
                start,
                end,
            });
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.src.len())
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        let mut buf = WordBuf::default();
        // set when the current word contains quoted text, which rules out "2>" fd prefixes
        let mut quoted = false;
        let mut heredoc_from = 0;

        while let Some(c) = self.peek(0) {
            match c {
                ' ' | '\t' | '\r' => {
                    buf.flush(self.offset(), &mut tokens);
                    quoted = false;
                    self.pos += 1;
                }
                '\n' => {
                    buf.flush(self.offset(), &mut tokens);
                    quoted = false;
                    let start = self.offset();
                    self.pos += 1;

                    // heredoc bodies start on the line after their redirection
                    let pending = pending_heredocs(&tokens, heredoc_from);
                    for (index, delimiter, strip_tabs) in pending {
                        let body = self.heredoc_body(&delimiter, strip_tabs);
                        if let TokenKind::Word(word) = &mut tokens[index].kind {
                            // an unquoted delimiter leaves substitutions live
                            if word.quoted_at.is_none() {
                                word.substitutions.extend(heredoc_substitutions(&body)?);
                            }
                        }
                    }
                    tokens.push(Token {
                        kind: TokenKind::Operator(Operator::Newline),
                        start,
                        end: self.offset(),
                    });
                    heredoc_from = tokens.len();
                }
                '\\' => match self.peek(1) {
                    None => return Err(ParseError::TrailingEscape),
                    Some('\n') => self.pos += 2,
                    Some(escaped) => {
                        buf.begin(self.offset());
                        buf.word.mark_quoted();
                        buf.word.text.push(escaped);
                        quoted = true;
                        self.pos += 2;
                    }
                },
                '\'' => {
                    buf.begin(self.offset());
                    buf.word.mark_quoted();
                    quoted = true;
                    self.pos += 1;
                    self.read_single_quoted(&mut buf.word)?;
                }
                '"' => {
                    buf.begin(self.offset());
                    buf.word.mark_quoted();
                    quoted = true;
                    self.pos += 1;
                    self.read_double_quoted(&mut buf.word)?;
                }
                '`' => {
                    buf.begin(self.offset());
                    self.pos += 1;
                    self.read_backtick(&mut buf.word)?;
                }
                '$' => {
                    buf.begin(self.offset());
                    self.read_dollar(&mut buf.word)?;
                }
                '#' if !buf.started() => {
                    while let Some(next) = self.peek(0) {
                        if next == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '&' | '|' | ';' | '(' | ')' => {
                    buf.flush(self.offset(), &mut tokens);
                    quoted = false;
                    self.read_control(&mut tokens);
                }
                '<' | '>' if self.peek(1) == Some('(') => {
                    buf.begin(self.offset());
                    self.pos += 2;
                    let body = self.read_paren_body()?;
                    buf.word.text.push(c);
                    buf.word.text.push('(');
                    buf.word.text.push_str(&body);
                    buf.word.text.push(')');
                    buf.word.substitutions.push(body);
                }
                '<' | '>' => {
                    let mut start = self.offset();
                    let mut op = String::new();
                    if buf.is_fd_number(quoted) {
                        start = buf.start.take().unwrap_or(start);
                        op = std::mem::take(&mut buf.word).text;
                    } else {
                        buf.flush(start, &mut tokens);
                    }
                    quoted = false;
                    op.push_str(self.read_redirect());
                    tokens.push(Token {
                        kind: TokenKind::Redirect(op),
                        start,
                        end: self.offset(),
                    });
                }
                _ => {
                    buf.begin(self.offset());
                    buf.word.text.push(c);
                    self.pos += 1;
                }
            }
        }

        buf.flush(self.src.len(), &mut tokens);
        Ok(tokens)
    }

    fn push_operator(&mut self, op: Operator, len: usize, tokens: &mut Vec<Token>) {
        let start = self.offset();
        self.pos += len;
        tokens.push(Token {
            kind: TokenKind::Operator(op),
            start,
            end: self.offset(),
        });
    }

    fn read_control(&mut self, tokens: &mut Vec<Token>) {
        let next = self.peek(1);
        match (self.peek(0), next) {
            (Some('&'), Some('&')) => self.push_operator(Operator::And, 2, tokens),
            (Some('&'), Some('>')) => {
                let start = self.offset();
                self.pos += 1;
                let mut op = String::from("&");
                op.push_str(self.read_redirect());
                tokens.push(Token {
                    kind: TokenKind::Redirect(op),
                    start,
                    end: self.offset(),
                });
            }
            (Some('&'), _) => self.push_operator(Operator::Background, 1, tokens),
            (Some('|'), Some('|')) => self.push_operator(Operator::Or, 2, tokens),
            (Some('|'), Some('&')) => self.push_operator(Operator::PipeAll, 2, tokens),
            (Some('|'), _) => self.push_operator(Operator::Pipe, 1, tokens),
            // `;;` ends a case arm
            (Some(';'), Some(';')) => self.push_operator(Operator::Semicolon, 2, tokens),
            (Some(';'), _) => self.push_operator(Operator::Semicolon, 1, tokens),
            (Some('('), _) => self.push_operator(Operator::OpenParen, 1, tokens),
            _ => self.push_operator(Operator::CloseParen, 1, tokens),
        }
    }

    /// Consume a redirection operator starting at `<` or `>`
    fn read_redirect(&mut self) -> &'static str {
        let first = self.peek(0);
        let second = self.peek(1);
        let third = self.peek(2);
        let (op, len) = match (first, second, third) {
            (Some('>'), Some('>'), _) => (">>", 2),
            (Some('>'), Some('&'), _) => (">&", 2),
            (Some('>'), Some('|'), _) => (">|", 2),
            (Some('>'), _, _) => (">", 1),
            (Some('<'), Some('<'), Some('<')) => ("<<<", 3),
            (Some('<'), Some('<'), Some('-')) => ("<<-", 3),
            (Some('<'), Some('<'), _) => ("<<", 2),
            (Some('<'), Some('&'), _) => ("<&", 2),
            (Some('<'), Some('>'), _) => ("<>", 2),
            _ => ("<", 1),
        };
        self.pos += len;
        op
    }

    fn read_single_quoted(&mut self, word: &mut Word) -> Result<(), ParseError> {
        loop {
            match self.peek(0) {
                None => return Err(ParseError::UnterminatedQuote('\'')),
                Some('\'') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(c) => {
                    word.text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn read_double_quoted(&mut self, word: &mut Word) -> Result<(), ParseError> {
        loop {
            match self.peek(0) {
                None => return Err(ParseError::UnterminatedQuote('"')),
                Some('"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some('\\') => match self.peek(1) {
                    None => return Err(ParseError::UnterminatedQuote('"')),
                    Some('\n') => self.pos += 2,
                    Some(c @ ('$' | '`' | '"' | '\\')) => {
                        word.text.push(c);
                        self.pos += 2;
                    }
                    Some(_) => {
                        word.text.push('\\');
                        self.pos += 1;
                    }
                },
                Some('`') => {
                    self.pos += 1;
                    self.read_backtick(word)?;
                }
                Some('$') => self.read_dollar(word)?,
                Some(c) => {
                    word.text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    /// Read a backtick substitution; the opening backtick is already consumed
    fn read_backtick(&mut self, word: &mut Word) -> Result<(), ParseError> {
        let mut body = String::new();
        loop {
            match self.peek(0) {
                None => return Err(ParseError::UnterminatedSubstitution),
                Some('`') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    match self.peek(1) {
                        None => return Err(ParseError::UnterminatedSubstitution),
                        Some(c @ ('`' | '\\' | '$')) => body.push(c),
                        Some(c) => {
                            body.push('\\');
                            body.push(c);
                        }
                    }
                    self.pos += 2;
                }
                Some(c) => {
                    body.push(c);
                    self.pos += 1;
                }
            }
        }
        word.text.push('`');
        word.text.push_str(&body);
        word.text.push('`');
        word.substitutions.push(body);
        Ok(())
    }

    /// Read `$(...)`, `$((...))`, `${...}` or a plain `$`
    fn read_dollar(&mut self, word: &mut Word) -> Result<(), ParseError> {
        match (self.peek(1), self.peek(2)) {
            (Some('('), Some('(')) => {
                self.pos += 3;
                let body = self.read_arithmetic()?;
                word.text.push_str("$((");
                word.text.push_str(&body);
                word.text.push_str("))");
            }
            (Some('('), _) => {
                self.pos += 2;
                let body = self.read_paren_body()?;
                word.text.push_str("$(");
                word.text.push_str(&body);
                word.text.push(')');
                word.substitutions.push(body);
            }
            (Some('{'), _) => {
                self.pos += 2;
                let mut depth = 1usize;
                let mut body = String::new();
                loop {
                    match self.peek(0) {
                        None => return Err(ParseError::UnterminatedExpansion),
                        Some('{') => depth += 1,
                        Some('}') => {
                            depth -= 1;
                            if depth == 0 {
                                self.pos += 1;
                                break;
                            }
                        }
                        Some(_) => {}
                    }
                    if let Some(c) = self.peek(0) {
                        body.push(c);
                    }
                    self.pos += 1;
                }
                word.text.push_str("${");
                word.text.push_str(&body);
                word.text.push('}');
            }
            _ => {
                word.text.push('$');
                self.pos += 1;
            }
        }
        Ok(())
    }

    /// Body of `$((...))`; the opening `$((` is already consumed
    fn read_arithmetic(&mut self) -> Result<String, ParseError> {
        let mut depth = 0usize;
        let mut body = String::new();
        loop {
            match self.peek(0) {
                None => return Err(ParseError::UnterminatedSubstitution),
                Some(')') if depth == 0 => {
                    if self.peek(1) != Some(')') {
                        return Err(ParseError::UnterminatedSubstitution);
                    }
                    self.pos += 2;
                    return Ok(body);
                }
                Some(c) => {
                    match c {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        _ => {}
                    }
                    body.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    /// Raw body up to the matching `)`; the opening paren is already consumed.
    ///
    /// Heredoc bodies inside are copied verbatim, so their quotes and
    /// parentheses do not count.
    fn read_paren_body(&mut self) -> Result<String, ParseError> {
        let mut depth = 1usize;
        let mut body = String::new();
        let mut in_single = false;
        let mut in_double = false;
        let mut heredocs: Vec<(String, bool)> = Vec::new();

        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if in_single {
                if c == '\'' {
                    in_single = false;
                }
                body.push(c);
                continue;
            }
            match c {
                '\\' => {
                    body.push(c);
                    if let Some(next) = self.peek(0) {
                        body.push(next);
                        self.pos += 1;
                    }
                    continue;
                }
                '"' => in_double = !in_double,
                '\'' if !in_double => in_single = true,
                '(' if !in_double => depth += 1,
                ')' if !in_double => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(body);
                    }
                }
                '<' if !in_double && self.peek(0) == Some('<') => {
                    body.push_str("<<");
                    self.pos += 1;
                    if self.peek(0) == Some('<') {
                        // here-string
                        body.push('<');
                        self.pos += 1;
                        continue;
                    }
                    let strip_tabs = self.peek(0) == Some('-');
                    if strip_tabs {
                        body.push('-');
                        self.pos += 1;
                    }
                    while let Some(blank @ (' ' | '\t')) = self.peek(0) {
                        body.push(blank);
                        self.pos += 1;
                    }
                    let delimiter = self.read_raw_word(&mut body);
                    if !delimiter.is_empty() {
                        heredocs.push((delimiter, strip_tabs));
                    }
                    continue;
                }
                '\n' if !in_double && !heredocs.is_empty() => {
                    body.push('\n');
                    for (delimiter, strip_tabs) in heredocs.drain(..) {
                        let raw = self.heredoc_body(&delimiter, strip_tabs);
                        body.push_str(&raw);
                    }
                    continue;
                }
                _ => {}
            }
            body.push(c);
        }

        Err(ParseError::UnterminatedSubstitution)
    }

    /// Copy one word to `raw` and return it with quotes removed
    fn read_raw_word(&mut self, raw: &mut String) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek(0) {
            match c {
                ' ' | '\t' | '\n' | ';' | '|' | '&' | '(' | ')' | '<' | '>' => break,
                '\'' | '"' => {
                    raw.push(c);
                    self.pos += 1;
                    while let Some(q) = self.peek(0) {
                        raw.push(q);
                        self.pos += 1;
                        if q == c {
                            break;
                        }
                        word.push(q);
                    }
                }
                '\\' => {
                    raw.push(c);
                    self.pos += 1;
                    if let Some(escaped) = self.peek(0) {
                        raw.push(escaped);
                        word.push(escaped);
                        self.pos += 1;
                    }
                }
                _ => {
                    raw.push(c);
                    word.push(c);
                    self.pos += 1;
                }
            }
        }
        word
    }

    /// Consume heredoc lines through the delimiter line and return them raw
    fn heredoc_body(&mut self, delimiter: &str, strip_tabs: bool) -> String {
        let mut raw = String::new();
        while self.peek(0).is_some() {
            let mut line = String::new();
            while let Some(c) = self.peek(0) {
                self.pos += 1;
                raw.push(c);
                if c == '\n' {
                    break;
                }
                line.push(c);
            }
            let line = if strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line.as_str()
            };
            if line == delimiter {
                break;
            }
        }
        raw
    }
}

/// Heredoc redirections in `tokens[from..]` as (delimiter token index,
/// delimiter, strip leading tabs)
fn pending_heredocs(tokens: &[Token], from: usize) -> Vec<(usize, String, bool)> {
    tokens[from..]
        .windows(2)
        .enumerate()
        .filter_map(|(offset, pair)| match (&pair[0].kind, &pair[1].kind) {
            (TokenKind::Redirect(op), TokenKind::Word(word))
                if (op.ends_with("<<") || op.ends_with("<<-")) && !op.ends_with("<<<") =>
            {
                Some((from + offset + 1, word.text.clone(), op.ends_with('-')))
            }
            _ => None,
        })
        .collect()
}

/// Command substitutions the shell expands inside an unquoted heredoc body
fn heredoc_substitutions(body: &str) -> Result<Vec<String>, ParseError> {
    let mut lexer = Lexer::new(body);
    let mut word = Word::default();
    while let Some(c) = lexer.peek(0) {
        match c {
            '\\' => lexer.pos += 2,
            '$' => lexer.read_dollar(&mut word)?,
            '`' => {
                lexer.pos += 1;
                lexer.read_backtick(&mut word)?;
            }
            _ => lexer.pos += 1,
        }
    }
    Ok(word.substitutions)
}

/// Lex a command string into words, operators and redirections
pub(crate) fn tokenize(command: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(command).run()
}

/// All words of a command string after quote removal, ignoring operators
pub fn split_words(command: &str) -> Result<Vec<String>, ParseError> {
    Ok(tokenize(command)?
        .into_iter()
        .filter_map(|token| match token.kind {
            TokenKind::Word(word) => Some(word.text),
            _ => None,
        })
        .collect())
}

/// Split a compound command on top-level `&&`, `||`, `;` and newlines.
///
/// Segments keep their original text so validators can re-read exact
/// arguments. Operators inside parentheses or quotes do not split. If the
/// command cannot be lexed at all, the whole trimmed string is returned as
/// one segment.
pub fn split_segments(command: &str) -> Vec<CommandSegment> {
    let mut segments = Vec::new();
    let mut push = |text: &str| {
        let text = text.trim();
        if !text.is_empty() {
            segments.push(CommandSegment::new(text));
        }
    };

    match tokenize(command) {
        Ok(tokens) => {
            let mut depth = 0usize;
            let mut segment_start = 0;
            for token in &tokens {
                match token.kind {
                    TokenKind::Operator(Operator::OpenParen) => depth += 1,
                    TokenKind::Operator(Operator::CloseParen) => depth = depth.saturating_sub(1),
                    TokenKind::Operator(op) if op.is_chain() && depth == 0 => {
                        push(&command[segment_start..token.start]);
                        segment_start = token.end;
                    }
                    _ => {}
                }
            }
            push(&command[segment_start..]);
        }
        Err(_) => push(command),
    }

    segments
}

/// Extract the base names of all invoked programs, left to right.
///
/// Fails closed: a command that cannot be lexed yields an empty list.
pub fn extract_commands(command: &str) -> Vec<InvokedCommand> {
    match try_extract_commands(command) {
        Ok(commands) => commands,
        Err(e) => {
            debug!(error = %e, "command could not be tokenized");
            Vec::new()
        }
    }
}

/// Like [`extract_commands`] but reports why lexing failed
pub fn try_extract_commands(command: &str) -> Result<Vec<InvokedCommand>, ParseError> {
    let mut commands = Vec::new();
    collect_commands(&tokenize(command)?, &mut commands)?;
    Ok(commands)
}

fn is_keyword(word: &str) -> bool {
    SHELL_KEYWORDS.contains(&word)
}

fn collect_commands(tokens: &[Token], out: &mut Vec<InvokedCommand>) -> Result<(), ParseError> {
    let mut slot = Slot::Program;
    let mut redirect_target = false;
    let mut for_header = false;

    for token in tokens {
        let word = match &token.kind {
            TokenKind::Operator(_) => {
                slot = Slot::Program;
                redirect_target = false;
                for_header = false;
                continue;
            }
            TokenKind::Redirect(_) => {
                redirect_target = true;
                continue;
            }
            TokenKind::Word(word) => word,
        };

        let text = word.text.as_str();
        if std::mem::take(&mut redirect_target) {
            // target of a redirection, never a command
        } else if for_header {
            if text == "do" {
                for_header = false;
            }
        } else if matches!(slot, Slot::Program) && is_keyword(text) {
            for_header = text == "for";
        } else {
            match slot.classify(word) {
                Role::Program => out.push(InvokedCommand::from_word(text)),
                Role::CommandLine(line) => collect_commands(&tokenize(line)?, out)?,
                Role::Other => {}
            }
        }

        for body in &word.substitutions {
            collect_commands(&tokenize(body)?, out)?;
        }
    }

    Ok(())
}

/// Split a command string into simple commands, descending into
/// substitutions and wrapper command lines. Redirections and their targets
/// are dropped.
pub(crate) fn simple_commands(command: &str) -> Result<Vec<Vec<Word>>, ParseError> {
    let mut commands = Vec::new();
    collect_simple_commands(&tokenize(command)?, &mut commands)?;
    Ok(commands)
}

fn collect_simple_commands(tokens: &[Token], out: &mut Vec<Vec<Word>>) -> Result<(), ParseError> {
    let mut argv: Vec<Word> = Vec::new();
    let mut redirect_target = false;

    for token in tokens {
        match &token.kind {
            TokenKind::Operator(_) => {
                finish_simple_command(std::mem::take(&mut argv), out)?;
                redirect_target = false;
            }
            TokenKind::Redirect(_) => redirect_target = true,
            TokenKind::Word(word) => {
                for body in &word.substitutions {
                    collect_simple_commands(&tokenize(body)?, out)?;
                }
                if !std::mem::take(&mut redirect_target) {
                    argv.push(word.clone());
                }
            }
        }
    }

    finish_simple_command(argv, out)
}

fn finish_simple_command(argv: Vec<Word>, out: &mut Vec<Vec<Word>>) -> Result<(), ParseError> {
    if argv.is_empty() {
        return Ok(());
    }

    let mut slot = Slot::Program;
    for word in &argv {
        if let Role::CommandLine(line) = slot.classify(word) {
            collect_simple_commands(&tokenize(line)?, out)?;
        }
    }
    out.push(argv);
    Ok(())
}

/// Indices of the program words in one simple command: the program and,
/// behind wrappers such as `timeout` or `env`, every program it runs
fn program_positions(argv: &[Word]) -> Vec<usize> {
    let mut slot = Slot::Program;
    argv.iter()
        .enumerate()
        .filter(|(_, word)| matches!(slot.classify(word), Role::Program))
        .map(|(index, _)| index)
        .collect()
}

/// Locate every invocation in `segment` of a program whose basename is one
/// of `names`, in order. Each argv starts at the program word as written.
///
/// When nothing matches, every word of the segment is returned as a single
/// argv so the caller still inspects all arguments.
pub fn command_argvs(segment: &str, names: &[&str]) -> Result<Vec<Vec<String>>, ParseError> {
    let commands = simple_commands(segment)?;
    let mut found = Vec::new();

    for argv in &commands {
        for index in program_positions(argv) {
            let program = InvokedCommand::from_word(&argv[index].text);
            if names.contains(&program.name()) {
                found.push(argv[index..].iter().map(|word| word.text.clone()).collect());
            }
        }
    }

    if found.is_empty() {
        let words: Vec<String> = commands
            .into_iter()
            .flatten()
            .map(|word| word.text)
            .collect();
        if !words.is_empty() {
            found.push(words);
        }
    }

    Ok(found)
}
