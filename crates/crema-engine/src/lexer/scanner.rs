// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The scanner that produces tokens from module source text.

use super::{Span, Token, TokenKind};

/// A scanner that tokenizes module source code.
pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    saw_newline: bool,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            current_pos: 0,
            saw_newline: false,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.saw_newline = false;
        self.skip_whitespace_and_comments();

        let start = self.current_pos;
        let newline_before = self.saw_newline;

        let Some((_, ch)) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::new(start, start), newline_before);
        };

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,

            '.' => match self.peek() {
                Some(d) if d.is_ascii_digit() => self.scan_number('.'),
                _ => TokenKind::Dot,
            },
            '*' => self.scan_star(),
            '<' => self.select('=', TokenKind::LessThanEqual, TokenKind::LessThan),
            '>' => self.select('=', TokenKind::GreaterThanEqual, TokenKind::GreaterThan),
            '=' => self.scan_equal(),
            '!' => self.scan_bang(),
            '&' => self.select('&', TokenKind::AmpersandAmpersand, TokenKind::Invalid),
            '|' => self.select('|', TokenKind::PipePipe, TokenKind::Invalid),
            '?' => self.select('?', TokenKind::QuestionQuestion, TokenKind::Question),

            '"' | '\'' => self.scan_string(ch),
            '0'..='9' => self.scan_number(ch),
            _ if is_id_start(ch) => self.scan_identifier(ch),

            _ => TokenKind::Invalid,
        };

        Token::new(kind, Span::new(start, self.current_pos), newline_before)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    /// Consumes `next` if present and returns `matched`, otherwise `single`.
    fn select(&mut self, next: char, matched: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            matched
        } else {
            single
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some('\n' | '\r' | '\u{2028}' | '\u{2029}') => {
                    self.saw_newline = true;
                    self.advance();
                }
                Some(ch) if ch.is_whitespace() || ch == '\u{feff}' => {
                    self.advance();
                }
                Some('/') => match self.peek_next() {
                    Some('/') => {
                        self.advance();
                        self.advance();
                        while let Some(ch) = self.peek() {
                            if ch == '\n' || ch == '\r' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => {
                        self.advance();
                        self.advance();
                        let mut prev = ' ';
                        while let Some((_, ch)) = self.advance() {
                            if ch == '\n' || ch == '\r' {
                                self.saw_newline = true;
                            }
                            if prev == '*' && ch == '/' {
                                break;
                            }
                            prev = ch;
                        }
                    }
                    _ => break,
                },
                _ => break,
            }
        }
    }

    fn scan_star(&mut self) -> TokenKind {
        self.select('*', TokenKind::StarStar, TokenKind::Star)
    }

    fn scan_equal(&mut self) -> TokenKind {
        if self.peek() != Some('=') {
            return TokenKind::Equal;
        }
        self.advance();
        self.select('=', TokenKind::StrictEqual, TokenKind::EqualEqual)
    }

    fn scan_bang(&mut self) -> TokenKind {
        if self.peek() != Some('=') {
            return TokenKind::Bang;
        }
        self.advance();
        self.select('=', TokenKind::StrictNotEqual, TokenKind::NotEqual)
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();

        loop {
            match self.advance() {
                None | Some((_, '\n')) => return TokenKind::Invalid,
                Some((_, ch)) if ch == quote => break,
                Some((_, '\\')) => {
                    let Some((_, escaped)) = self.advance() else {
                        return TokenKind::Invalid;
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        'b' => value.push('\u{8}'),
                        'f' => value.push('\u{c}'),
                        'v' => value.push('\u{b}'),
                        '0' => value.push('\0'),
                        'x' => match self.scan_hex_escape(2) {
                            Some(ch) => value.push(ch),
                            None => return TokenKind::Invalid,
                        },
                        'u' => match self.scan_hex_escape(4) {
                            Some(ch) => value.push(ch),
                            None => return TokenKind::Invalid,
                        },
                        // Line continuation
                        '\n' => {}
                        '\r' => {
                            if self.peek() == Some('\n') {
                                self.advance();
                            }
                        }
                        _ => value.push(escaped),
                    }
                }
                Some((_, ch)) => value.push(ch),
            }
        }

        TokenKind::String(value)
    }

    fn scan_hex_escape(&mut self, digits: usize) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let (_, ch) = self.advance()?;
            code = code * 16 + ch.to_digit(16)?;
        }
        char::from_u32(code)
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        if first == '0' {
            match self.peek() {
                Some('x' | 'X') => return self.scan_radix_number(16),
                Some('o' | 'O') => return self.scan_radix_number(8),
                Some('b' | 'B') => return self.scan_radix_number(2),
                _ => {}
            }
        }

        let mut value = String::from(first);
        let mut seen_dot = first == '.';
        if seen_dot {
            value.insert(0, '0');
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                value.push(ch);
            } else if ch == '_' {
                // numeric separator
            } else if ch == '.' && !seen_dot {
                seen_dot = true;
                value.push('.');
            } else {
                break;
            }
            self.advance();
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            value.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                value.push(sign);
                self.advance();
            }
            while let Some(ch) = self.peek() {
                if !ch.is_ascii_digit() {
                    break;
                }
                value.push(ch);
                self.advance();
            }
        }

        match value.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Invalid,
        }
    }

    fn scan_radix_number(&mut self, radix: u32) -> TokenKind {
        self.advance(); // consume the radix marker
        let mut value = String::new();

        while let Some(ch) = self.peek() {
            if ch.is_digit(radix) {
                value.push(ch);
            } else if ch != '_' {
                break;
            }
            self.advance();
        }

        match u64::from_str_radix(&value, radix) {
            Ok(n) => TokenKind::Number(n as f64),
            Err(_) => TokenKind::Invalid,
        }
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::from(first);

        while let Some(ch) = self.peek() {
            if !is_id_continue(ch) {
                break;
            }
            name.push(ch);
            self.advance();
        }

        TokenKind::from_word(&name).unwrap_or(TokenKind::Identifier(name))
    }
}

/// Checks if a character can start an identifier.
fn is_id_start(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

/// Checks if a character can continue an identifier.
fn is_id_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_continue(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let token = scanner.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn test_import_line() {
        assert_eq!(
            kinds("import a from 'answer';"),
            vec![
                TokenKind::Import,
                TokenKind::Identifier("a".into()),
                TokenKind::Identifier("from".into()),
                TokenKind::String("answer".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let mut scanner = Scanner::new("42 3.14 0xff 0b1010 .5 1e3 1_000");
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 42.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 3.14));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 255.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 10.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 0.5));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 1000.0));
        assert!(matches!(scanner.next_token().kind, TokenKind::Number(n) if n == 1000.0));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb" '\x41B' 'it\'s'"#),
            vec![
                TokenKind::String("a\nb".into()),
                TokenKind::String("AB".into()),
                TokenKind::String("it's".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_invalid() {
        assert_eq!(kinds("'abc"), vec![TokenKind::Invalid]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("=== !== == != ** ?? && || <= >="),
            vec![
                TokenKind::StrictEqual,
                TokenKind::StrictNotEqual,
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::StarStar,
                TokenKind::QuestionQuestion,
                TokenKind::AmpersandAmpersand,
                TokenKind::PipePipe,
                TokenKind::LessThanEqual,
                TokenKind::GreaterThanEqual,
            ]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let mut scanner = Scanner::new("1 /* a\nb */ 2 // c\n3 4");
        let one = scanner.next_token();
        let two = scanner.next_token();
        let three = scanner.next_token();
        let four = scanner.next_token();
        assert!(!one.newline_before);
        assert!(two.newline_before);
        assert!(three.newline_before);
        assert!(!four.newline_before);
        assert!(matches!(four.kind, TokenKind::Number(n) if n == 4.0));
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("const $x export default for"),
            vec![
                TokenKind::Const,
                TokenKind::Identifier("$x".into()),
                TokenKind::Export,
                TokenKind::Default,
                TokenKind::For,
            ]
        );
    }
}
