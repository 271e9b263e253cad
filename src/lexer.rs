use thiserror::Error;

use crate::token::Token;

const SPACES_PER_INDENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerState {
    LineBegin,
    TokenStart,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Unknown escape sequence '\\{character}' at position {position}")]
    UnknownEscape { character: char, position: usize },
    #[error("Number literal '{literal}' is out of range at position {position}")]
    NumberOverflow { literal: String, position: usize },
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
}

pub type LexResult<T> = Result<T, LexError>;

/// Pull-based tokenizer with explicit block-structure tokens.
///
/// One logical indent is two leading spaces. The lexer tracks the indent
/// level declared by the current line (`target_indent`) against the level
/// already reported to the consumer (`current_indent`) and emits one
/// `Indent`/`Dedent` per step until the two agree; only then does it scan
/// real content. Blank and comment-only lines produce no tokens at all.
/// At end of input an unfinished line is closed with `Newline`, every open
/// indent level with `Dedent`, and the stream then stays at `Eof`.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    state: LexerState,
    target_indent: usize,
    current_indent: usize,
    pending: Vec<Token>,
    current: Token,
}

impl<'a> Lexer<'a> {
    /// Builds a lexer and scans the first token, so `current_token` is
    /// meaningful immediately.
    pub fn new(input: &'a str) -> LexResult<Self> {
        let mut lexer = Self {
            input,
            pos: 0,
            state: LexerState::LineBegin,
            target_indent: 0,
            current_indent: 0,
            pending: Vec::new(),
            current: Token::Eof,
        };
        lexer.current = lexer.scan_token()?;
        Ok(lexer)
    }

    /// Last emitted token, without advancing.
    pub fn current_token(&self) -> &Token {
        &self.current
    }

    /// Advances the stream one token and returns it. Once `Eof` has been
    /// emitted every further call returns `Eof`.
    pub fn next_token(&mut self) -> LexResult<&Token> {
        if self.current != Token::Eof {
            self.current = self.scan_token()?;
        }
        Ok(&self.current)
    }

    fn scan_token(&mut self) -> LexResult<Token> {
        loop {
            if let Some(token) = self.pending.pop() {
                return Ok(token);
            }

            match self.state {
                LexerState::LineBegin => {
                    let spaces = self.consume_spaces();
                    match self.peek_char() {
                        None => {
                            if self.current_indent > 0 {
                                self.current_indent -= 1;
                                return Ok(Token::Dedent);
                            }
                            return Ok(Token::Eof);
                        }
                        // A blank line declares nothing and emits nothing.
                        Some('\n') => {
                            self.consume_char();
                        }
                        Some('#') => {
                            self.skip_comment();
                        }
                        Some(_) => {
                            self.target_indent = spaces / SPACES_PER_INDENT;
                            while self.current_indent < self.target_indent {
                                self.current_indent += 1;
                                self.pending.push(Token::Indent);
                            }
                            while self.current_indent > self.target_indent {
                                self.current_indent -= 1;
                                self.pending.push(Token::Dedent);
                            }
                            self.state = LexerState::TokenStart;
                        }
                    }
                }
                LexerState::TokenStart => {
                    self.consume_spaces();
                    match self.peek_char() {
                        // Unfinished last line: re-inject its newline before
                        // the closing dedents.
                        None => {
                            self.state = LexerState::LineBegin;
                            self.target_indent = 0;
                            return Ok(Token::Newline);
                        }
                        Some('\n') => {
                            self.consume_char();
                            self.state = LexerState::LineBegin;
                            self.target_indent = 0;
                            return Ok(Token::Newline);
                        }
                        // The structural newline of this line still fires.
                        Some('#') => {
                            self.skip_comment();
                        }
                        Some(ch) => return self.read_token(ch),
                    }
                }
            }
        }
    }

    fn read_token(&mut self, ch: char) -> LexResult<Token> {
        let position = self.pos;

        if ch.is_ascii_digit() {
            return self.read_number(position);
        }
        if ch == '_' || ch.is_ascii_alphabetic() {
            return Ok(self.read_word(position));
        }
        if ch == '\'' || ch == '"' {
            return self.read_string(position, ch);
        }

        self.consume_char();
        let token = match (ch, self.peek_char()) {
            ('=', Some('=')) => {
                self.consume_char();
                Token::Eq
            }
            ('!', Some('=')) => {
                self.consume_char();
                Token::NotEq
            }
            ('<', Some('=')) => {
                self.consume_char();
                Token::LessOrEq
            }
            ('>', Some('=')) => {
                self.consume_char();
                Token::GreaterOrEq
            }
            _ if ch.is_ascii_punctuation() => Token::Char(ch),
            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    position,
                });
            }
        };
        Ok(token)
    }

    fn read_number(&mut self, position: usize) -> LexResult<Token> {
        self.consume_while(|c| c.is_ascii_digit());
        let literal = &self.input[position..self.pos];
        let value = literal.parse::<i64>().map_err(|_| LexError::NumberOverflow {
            literal: literal.to_string(),
            position,
        })?;
        Ok(Token::Number(value))
    }

    fn read_word(&mut self, position: usize) -> Token {
        self.consume_while(|c| c == '_' || c.is_ascii_alphanumeric());
        let word = &self.input[position..self.pos];
        match word {
            "class" => Token::Class,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "def" => Token::Def,
            "print" => Token::Print,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "None" => Token::None,
            "True" => Token::True,
            "False" => Token::False,
            _ => Token::Id(word.to_string()),
        }
    }

    fn read_string(&mut self, position: usize, quote: char) -> LexResult<Token> {
        self.consume_char();
        let mut text = String::new();
        loop {
            match self.consume_char() {
                None => return Err(LexError::UnterminatedString { position }),
                Some(ch) if ch == quote => break,
                Some('\\') => {
                    let escape_position = self.pos;
                    match self.consume_char() {
                        None => return Err(LexError::UnterminatedString { position }),
                        Some('\'') => text.push('\''),
                        Some('"') => text.push('"'),
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => {
                            return Err(LexError::UnknownEscape {
                                character: other,
                                position: escape_position,
                            });
                        }
                    }
                }
                Some(ch) => text.push(ch),
            }
        }
        Ok(Token::String(text))
    }

    fn skip_comment(&mut self) {
        self.consume_while(|c| c != '\n');
    }

    fn consume_spaces(&mut self) -> usize {
        self.consume_while(|c| c == ' ')
    }

    fn consume_while<P>(&mut self, keep: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

/// Drives a fresh lexer over the whole input, returning every token up to
/// and including `Eof`.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input)?;
    let mut tokens = vec![lexer.current_token().clone()];
    while tokens.last() != Some(&Token::Eof) {
        tokens.push(lexer.next_token()?.clone());
    }
    Ok(tokens)
}
