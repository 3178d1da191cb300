//! Tokenizer for Forthic source code.
//!
//! Converts Forthic source into a stream of positioned [`Token`]s. The
//! tokenizer is a hand-rolled state machine: after skipping separators the
//! lead character selects a transition (comment, definition, memo, array or
//! module delimiter, quoted string, dot-symbol, or plain word).
//!
//! Positions are character offsets, offset by the reference location so that
//! tokens produced from nested `run` calls still point into the original
//! source.

use crate::errors::{CodeLocation, ForthicError};

/// Token kinds recognized by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    String,
    Comment,
    StartArray,
    EndArray,
    StartModule,
    EndModule,
    StartDef,
    EndDef,
    StartMemo,
    Word,
    DotSymbol,
    Eos,
}

/// A token with its kind, lexeme, and source location.
///
/// For `StartDef`/`StartMemo` the lexeme is the definition name; for
/// `StartModule` it is the module name (empty for the app module); for
/// `DotSymbol` it is the symbol text with the leading `.` stripped.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenType,
    pub text: String,
    pub location: CodeLocation,
}

impl Token {
    pub fn new(kind: TokenType, text: impl Into<String>, location: CodeLocation) -> Self {
        Self {
            kind,
            text: text.into(),
            location,
        }
    }
}

/// A string value that remembers where it came from.
///
/// Pushed for STRING and DOT_SYMBOL tokens; decays to a plain string when
/// popped from the stack (the interpreter records the location into its
/// last-string-location slot at that point).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedString {
    string: String,
    location: CodeLocation,
}

impl PositionedString {
    pub fn new(string: impl Into<String>, location: CodeLocation) -> Self {
        Self {
            string: string.into(),
            location,
        }
    }

    pub fn value(&self) -> &str {
        &self.string
    }

    pub fn location(&self) -> &CodeLocation {
        &self.location
    }

    pub fn into_parts(self) -> (String, CodeLocation) {
        (self.string, self.location)
    }
}

impl std::fmt::Display for PositionedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.string)
    }
}

/// Span of string content gathered so far, for streaming consumers.
#[derive(Debug, Clone, Copy)]
struct StringDelta {
    start: usize,
    end: usize,
}

/// Tokenizer state machine.
pub struct Tokenizer {
    reference_location: CodeLocation,
    line: usize,
    column: usize,
    input: String,
    chars: Vec<char>,
    input_pos: usize,

    // Current token bookkeeping
    token_start_pos: usize,
    token_line: usize,
    token_column: usize,
    token_text: String,

    string_delta: Option<StringDelta>,
    streaming: bool,
}

const WORD_TERMINATORS: [char; 6] = [';', '[', ']', '{', '}', '#'];

impl Tokenizer {
    /// Create a tokenizer over complete input. Reaching end-of-input inside
    /// a quoted string is an error.
    pub fn new(input: impl Into<String>, reference_location: Option<CodeLocation>) -> Self {
        Self::build(input.into(), reference_location, false)
    }

    /// Create a tokenizer tolerant of incomplete input: `next_token` returns
    /// `Ok(None)` instead of an unterminated-string error when the input
    /// ends inside a quoted string.
    pub fn streaming(input: impl Into<String>, reference_location: Option<CodeLocation>) -> Self {
        Self::build(input.into(), reference_location, true)
    }

    fn build(input: String, reference_location: Option<CodeLocation>, streaming: bool) -> Self {
        let reference_location = reference_location.unwrap_or_default();
        let line = reference_location.line;
        let column = reference_location.column;
        let input = unescape(&input);
        let chars: Vec<char> = input.chars().collect();

        Self {
            reference_location,
            line,
            column,
            input,
            chars,
            input_pos: 0,
            token_start_pos: 0,
            token_line: 0,
            token_column: 0,
            token_text: String::new(),
            string_delta: None,
            streaming,
        }
    }

    /// Produce the next token. Returns an `Eos` token indefinitely once the
    /// input is exhausted; returns `Ok(None)` only in streaming mode when
    /// the input ends inside a quoted string.
    pub fn next_token(&mut self) -> Result<Option<Token>, ForthicError> {
        self.token_text.clear();
        self.from_start()
    }

    /// The full (entity-unescaped) input string.
    pub fn input_string(&self) -> &str {
        &self.input
    }

    /// Location of the token currently being (or last) gathered.
    pub fn token_location(&self) -> CodeLocation {
        CodeLocation {
            source: self.reference_location.source.clone(),
            line: self.token_line,
            column: self.token_column,
            start_pos: self.token_start_pos,
            end_pos: Some(self.token_start_pos + self.token_text.chars().count()),
        }
    }

    /// Content of the string being gathered, for streaming consumers that
    /// want partial progress before the closing delimiter arrives.
    pub fn string_delta(&self) -> String {
        match self.string_delta {
            Some(delta) => self.chars[delta.start..delta.end].iter().collect(),
            None => String::new(),
        }
    }

    // ---- helpers ----

    fn note_start_token(&mut self) {
        self.token_start_pos = self.input_pos + self.reference_location.start_pos;
        self.token_line = self.line;
        self.token_column = self.column;
    }

    fn is_whitespace(ch: char) -> bool {
        matches!(ch, ' ' | '\t' | '\n' | '\r' | '(' | ')' | ',')
    }

    fn is_quote(ch: char) -> bool {
        matches!(ch, '"' | '\'' | '^')
    }

    fn is_triple_quote(&self, index: usize, ch: char) -> bool {
        if !Self::is_quote(ch) || index + 2 >= self.chars.len() {
            return false;
        }
        self.chars[index + 1] == ch && self.chars[index + 2] == ch
    }

    fn is_start_memo(&self, index: usize) -> bool {
        index + 1 < self.chars.len() && self.chars[index] == '@' && self.chars[index + 1] == ':'
    }

    fn advance(&mut self, num_chars: isize) -> Result<(), ForthicError> {
        if num_chars >= 0 {
            for _ in 0..num_chars {
                if self.chars.get(self.input_pos) == Some(&'\n') {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
                self.input_pos += 1;
            }
        } else {
            for _ in 0..(-num_chars) {
                self.input_pos = self.input_pos.checked_sub(1).ok_or_else(|| {
                    ForthicError::InvalidInputPosition {
                        forthic: self.input.clone(),
                        location: Some(self.token_location()),
                        cause: None,
                    }
                })?;
                if self.chars.get(self.input_pos) == Some(&'\n') {
                    self.line = self.line.saturating_sub(1);
                    self.column = 1;
                } else {
                    self.column = self.column.saturating_sub(1);
                }
            }
        }
        Ok(())
    }

    fn invalid_word_name(&self, note: impl Into<String>) -> ForthicError {
        ForthicError::InvalidWordName {
            forthic: self.input.clone(),
            note: Some(note.into()),
            location: Some(self.token_location()),
            cause: None,
        }
    }

    fn token(&self, kind: TokenType) -> Token {
        Token::new(kind, self.token_text.clone(), self.token_location())
    }

    // ---- state transitions ----

    fn from_start(&mut self) -> Result<Option<Token>, ForthicError> {
        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            self.note_start_token();
            self.advance(1)?;

            if Self::is_whitespace(ch) {
                continue;
            } else if ch == '#' {
                return self.gather_comment().map(Some);
            } else if ch == ':' {
                return self.start_definition(TokenType::StartDef).map(Some);
            } else if self.is_start_memo(self.input_pos - 1) {
                self.advance(1)?; // skip the ':' of '@:'
                return self.start_definition(TokenType::StartMemo).map(Some);
            } else if ch == ';' {
                self.token_text.push(ch);
                return Ok(Some(self.token(TokenType::EndDef)));
            } else if ch == '[' {
                self.token_text.push(ch);
                return Ok(Some(self.token(TokenType::StartArray)));
            } else if ch == ']' {
                self.token_text.push(ch);
                return Ok(Some(self.token(TokenType::EndArray)));
            } else if ch == '{' {
                return self.gather_module_name().map(Some);
            } else if ch == '}' {
                self.token_text.push(ch);
                return Ok(Some(self.token(TokenType::EndModule)));
            } else if self.is_triple_quote(self.input_pos - 1, ch) {
                self.advance(2)?; // skip 2nd and 3rd quote chars
                return self.gather_triple_quote_string(ch);
            } else if Self::is_quote(ch) {
                return self.gather_string(ch);
            } else if ch == '.' {
                self.advance(-1)?;
                return self.gather_dot_symbol().map(Some);
            } else {
                self.advance(-1)?;
                return self.gather_word().map(Some);
            }
        }

        Ok(Some(self.token(TokenType::Eos)))
    }

    fn gather_comment(&mut self) -> Result<Token, ForthicError> {
        self.note_start_token();
        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            if ch == '\n' {
                break;
            }
            self.token_text.push(ch);
            self.advance(1)?;
        }
        Ok(self.token(TokenType::Comment))
    }

    fn start_definition(&mut self, kind: TokenType) -> Result<Token, ForthicError> {
        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            self.advance(1)?;

            if Self::is_whitespace(ch) {
                continue;
            } else if Self::is_quote(ch) {
                return Err(self.invalid_word_name("Definition names can't have quotes in them"));
            } else {
                self.advance(-1)?;
                return self.gather_definition_name(kind);
            }
        }
        Err(self.invalid_word_name("Input ended before a definition name"))
    }

    fn gather_definition_name(&mut self, kind: TokenType) -> Result<Token, ForthicError> {
        self.note_start_token();
        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            self.advance(1)?;

            if Self::is_whitespace(ch) {
                break;
            }
            if Self::is_quote(ch) {
                return Err(self.invalid_word_name("Definition names can't have quotes in them"));
            }
            if matches!(ch, ';' | '[' | ']' | '{' | '}') {
                return Err(
                    self.invalid_word_name(format!("Definition names can't have '{}' in them", ch))
                );
            }
            self.token_text.push(ch);
        }
        Ok(self.token(kind))
    }

    fn gather_module_name(&mut self) -> Result<Token, ForthicError> {
        self.note_start_token();
        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            self.advance(1)?;

            if Self::is_whitespace(ch) {
                break;
            } else if ch == '}' {
                self.advance(-1)?;
                break;
            } else {
                self.token_text.push(ch);
            }
        }
        Ok(self.token(TokenType::StartModule))
    }

    fn gather_triple_quote_string(&mut self, delim: char) -> Result<Option<Token>, ForthicError> {
        self.note_start_token();
        self.string_delta = Some(StringDelta {
            start: self.input_pos,
            end: self.input_pos,
        });

        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];

            if ch == delim && self.is_triple_quote(self.input_pos, ch) {
                // Greedy rule: a triple quote followed by a fourth quote
                // consumes one literal quote into the content and keeps
                // scanning for a later close.
                if self.input_pos + 3 < self.chars.len() && self.chars[self.input_pos + 3] == delim
                {
                    self.advance(1)?;
                    self.token_text.push(delim);
                    if let Some(ref mut delta) = self.string_delta {
                        delta.end = self.input_pos;
                    }
                    continue;
                }

                self.advance(3)?;
                self.string_delta = None;
                return Ok(Some(self.token(TokenType::String)));
            }

            self.advance(1)?;
            self.token_text.push(ch);
            if let Some(ref mut delta) = self.string_delta {
                delta.end = self.input_pos;
            }
        }

        if self.streaming {
            return Ok(None);
        }
        Err(ForthicError::UnterminatedString {
            forthic: self.input.clone(),
            location: Some(self.token_location()),
            cause: None,
        })
    }

    fn gather_string(&mut self, delim: char) -> Result<Option<Token>, ForthicError> {
        self.note_start_token();
        self.string_delta = Some(StringDelta {
            start: self.input_pos,
            end: self.input_pos,
        });

        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            self.advance(1)?;

            if ch == delim {
                self.string_delta = None;
                return Ok(Some(self.token(TokenType::String)));
            }
            self.token_text.push(ch);
            if let Some(ref mut delta) = self.string_delta {
                delta.end = self.input_pos;
            }
        }

        if self.streaming {
            return Ok(None);
        }
        Err(ForthicError::UnterminatedString {
            forthic: self.input.clone(),
            location: Some(self.token_location()),
            cause: None,
        })
    }

    fn gather_word(&mut self) -> Result<Token, ForthicError> {
        self.note_start_token();
        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            self.advance(1)?;

            if Self::is_whitespace(ch) {
                break;
            }

            // A '[' inside a token containing 'T' is a zoned datetime with
            // bracketed IANA timezone; consume the bracketed name into the
            // token so the literal chain sees it whole.
            if ch == '[' && self.token_text.contains('T') {
                self.token_text.push(ch);
                while self.input_pos < self.chars.len() {
                    let bracket_ch = self.chars[self.input_pos];
                    self.advance(1)?;
                    self.token_text.push(bracket_ch);
                    if bracket_ch == ']' {
                        break;
                    }
                }
            } else if WORD_TERMINATORS.contains(&ch) {
                self.advance(-1)?;
                break;
            } else {
                self.token_text.push(ch);
            }
        }
        Ok(self.token(TokenType::Word))
    }

    fn gather_dot_symbol(&mut self) -> Result<Token, ForthicError> {
        self.note_start_token();
        let mut full_text = String::new();

        while self.input_pos < self.chars.len() {
            let ch = self.chars[self.input_pos];
            self.advance(1)?;

            if Self::is_whitespace(ch) {
                break;
            }
            if WORD_TERMINATORS.contains(&ch) {
                self.advance(-1)?;
                break;
            }
            full_text.push(ch);
            self.token_text.push(ch);
        }

        // A lone '.' is an ordinary word.
        if full_text.chars().count() < 2 {
            return Ok(Token::new(TokenType::Word, full_text, self.token_location()));
        }

        let symbol: String = full_text.chars().skip(1).collect();
        Ok(Token::new(TokenType::DotSymbol, symbol, self.token_location()))
    }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">")
}
