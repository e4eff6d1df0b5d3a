// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{iter::Peekable, str::Chars};

/// A single line lexer for master files
///
/// The zones written by this crate never span lines, so parenthesized groups are rejected
/// instead of being joined.
pub(crate) struct Lexer<'a> {
    txt: Peekable<Chars<'a>>,
    state: State,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer over one line, without its line terminator
    pub(crate) fn new(txt: &'a str) -> Self {
        Lexer {
            txt: txt.chars().peekable(),
            state: State::StartLine,
        }
    }

    /// Return the next Token in the line, `None` at the end
    pub(crate) fn next_token(&mut self) -> Result<Option<Token>, String> {
        loop {
            let Some(ch) = self.txt.peek().copied() else {
                return Ok(None);
            };

            match self.state {
                State::StartLine => {
                    self.state = State::RestOfLine;
                    if ch.is_whitespace() {
                        self.skip_whitespace();
                        // a blank-led line only counts when something follows it
                        return match self.txt.peek() {
                            None | Some(';') => Ok(None),
                            Some(_) => Ok(Some(Token::Blank)),
                        };
                    }
                }
                State::RestOfLine => match ch {
                    ';' => return Ok(None),
                    '(' | ')' => return Err("multi-line records are not supported".to_string()),
                    '"' => {
                        self.txt.next();
                        return self.quoted().map(|s| Some(Token::Quoted(s)));
                    }
                    ch if ch.is_whitespace() => self.skip_whitespace(),
                    _ => return Ok(Some(self.char_data())),
                },
            }
        }
    }

    /// All remaining tokens of the line
    pub(crate) fn tokens(mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while self.txt.next_if(|ch| ch.is_whitespace()).is_some() {}
    }

    fn char_data(&mut self) -> Token {
        let mut data = String::new();
        while let Some(ch) = self
            .txt
            .next_if(|ch| !ch.is_whitespace() && !matches!(ch, ';' | '"' | '(' | ')'))
        {
            data.push(ch);
        }

        match data.as_str() {
            "@" => Token::At,
            s if s.eq_ignore_ascii_case("$ORIGIN") => Token::Origin,
            s if s.eq_ignore_ascii_case("$TTL") => Token::Ttl,
            _ => Token::CharData(data),
        }
    }

    /// Reads a character-string after its opening quote, resolving `\X` and `\DDD` escapes
    fn quoted(&mut self) -> Result<String, String> {
        let mut bytes = Vec::new();
        loop {
            match self.txt.next() {
                None => return Err("unterminated quoted string".to_string()),
                Some('"') => break,
                Some('\\') => match self.txt.next() {
                    None => return Err("dangling escape in quoted string".to_string()),
                    Some(d) if d.is_ascii_digit() => {
                        let mut code = d.to_digit(10).unwrap_or_default();
                        for _ in 0..2 {
                            let digit = self
                                .txt
                                .next()
                                .and_then(|d| d.to_digit(10))
                                .ok_or_else(|| "bad \\DDD escape".to_string())?;
                            code = code * 10 + digit;
                        }
                        let byte = u8::try_from(code)
                            .map_err(|_| format!("escape \\{code} out of range"))?;
                        bytes.push(byte);
                    }
                    Some(ch) => push_char(&mut bytes, ch),
                },
                Some(ch) => push_char(&mut bytes, ch),
            }
        }

        String::from_utf8(bytes).map_err(|_| "quoted string is not valid UTF-8".to_string())
    }
}

fn push_char(bytes: &mut Vec<u8>, ch: char) {
    let mut buf = [0; 4];
    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum State {
    StartLine,
    RestOfLine,
}

/// Tokens emitted from each Lexer pass
#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) enum Token {
    /// only if the first part of the line
    Blank,
    /// Unquoted data
    CharData(String),
    /// Quoted character-string, escapes resolved
    Quoted(String),
    /// @
    At,
    /// $ORIGIN
    Origin,
    /// $TTL
    Ttl,
}
