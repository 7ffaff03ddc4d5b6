use crate::ast::Position;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
    /// Identifiers and keywords alike; the parser tells them apart.
    Identifier(String),
    /// Digits without underscores or suffix; radix prefixes are kept.
    Integer(String),
    Long(String),
    Float(String),
    Double(String),
    Char(char),
    String(String),
    Punct(char),
    /// `...`
    Ellipsis,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) position: Position,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LexError {
    pub(crate) position: Position,
    pub(crate) message: String,
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        chars: text.chars().collect(),
        index: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        lexer.skip_trivia()?;
        let position = lexer.position();
        let Some(ch) = lexer.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                position,
            });
            return Ok(tokens);
        };
        let kind = if is_identifier_start(ch) {
            TokenKind::Identifier(lexer.identifier())
        } else if ch.is_ascii_digit()
            || (ch == '.' && lexer.peek_at(1).is_some_and(|next| next.is_ascii_digit()))
        {
            lexer.number()?
        } else if ch == '"' {
            lexer.bump();
            TokenKind::String(lexer.quoted('"')?)
        } else if ch == '\'' {
            lexer.bump();
            let value = lexer.quoted('\'')?;
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(single), None) => TokenKind::Char(single),
                _ => return Err(lexer.error(position, "invalid character literal")),
            }
        } else if ch == '.' && lexer.peek_at(1) == Some('.') && lexer.peek_at(2) == Some('.') {
            lexer.bump();
            lexer.bump();
            lexer.bump();
            TokenKind::Ellipsis
        } else if "(){}[];,.@=<>?:&|^!~+-*/%".contains(ch) {
            lexer.bump();
            TokenKind::Punct(ch)
        } else {
            return Err(lexer.error(position, &format!("unexpected character '{ch}'")));
        };
        tokens.push(Token { kind, position });
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn error(&self, position: Position, message: &str) -> LexError {
        LexError {
            position,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.index += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(ch), _) if ch.is_whitespace() || ch == '\u{feff}' => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return Err(self.error(start, "unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if !is_identifier_part(ch) {
                break;
            }
            text.push(ch);
            self.bump();
        }
        text
    }

    fn number(&mut self) -> Result<TokenKind, LexError> {
        let start = self.position();
        let mut text = String::new();
        let is_radix = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'b' | 'B'));
        if is_radix {
            text.push('0');
            self.bump();
            let is_binary = matches!(self.bump(), Some('b' | 'B'));
            text.push(if is_binary { 'b' } else { 'x' });
            let is_digit = |ch: char| {
                if is_binary {
                    matches!(ch, '0' | '1')
                } else {
                    ch.is_ascii_hexdigit()
                }
            };
            while let Some(ch) = self.peek() {
                if is_digit(ch) {
                    text.push(ch);
                } else if ch != '_' {
                    break;
                }
                self.bump();
            }
            if text.len() == 2 || self.peek().is_some_and(|ch| ch.is_ascii_hexdigit()) {
                return Err(self.error(start, "malformed number literal"));
            }
            return Ok(match self.peek() {
                Some('l' | 'L') => {
                    self.bump();
                    TokenKind::Long(text)
                }
                _ => TokenKind::Integer(text),
            });
        }

        let mut is_floating = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
            } else if ch == '.' && !is_floating && self.peek_at(1) != Some('.') {
                is_floating = true;
                text.push(ch);
            } else if matches!(ch, 'e' | 'E') {
                is_floating = true;
                text.push('e');
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.bump();
                }
                continue;
            } else if ch != '_' {
                break;
            }
            self.bump();
        }
        let kind = match self.peek() {
            Some('l' | 'L') if !is_floating => {
                self.bump();
                TokenKind::Long(text)
            }
            Some('f' | 'F') => {
                self.bump();
                TokenKind::Float(text)
            }
            Some('d' | 'D') => {
                self.bump();
                TokenKind::Double(text)
            }
            _ if is_floating => TokenKind::Double(text),
            _ => TokenKind::Integer(text),
        };
        Ok(kind)
    }

    fn quoted(&mut self, quote: char) -> Result<String, LexError> {
        let start = self.position();
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(start, "unterminated literal")),
                Some(ch) if ch == quote => return Ok(value),
                Some('\\') => value.push(self.escape(start)?),
                Some(ch) => value.push(ch),
            }
        }
    }

    fn escape(&mut self, start: Position) -> Result<char, LexError> {
        let ch = self
            .bump()
            .ok_or_else(|| self.error(start, "unterminated escape"))?;
        let escaped = match ch {
            'n' => '\n',
            't' => '\t',
            'b' => '\u{8}',
            'r' => '\r',
            'f' => '\u{c}',
            's' => ' ',
            '0'..='7' => {
                let mut code = ch.to_digit(8).unwrap_or(0);
                while let Some(digit) = self.peek().and_then(|next| next.to_digit(8)) {
                    if code * 8 + digit > 0o377 {
                        break;
                    }
                    code = code * 8 + digit;
                    self.bump();
                }
                char::from_u32(code).unwrap_or('\u{fffd}')
            }
            'u' => {
                while self.peek() == Some('u') {
                    self.bump();
                }
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = self
                        .bump()
                        .and_then(|digit| digit.to_digit(16))
                        .ok_or_else(|| self.error(start, "malformed unicode escape"))?;
                    code = code * 16 + digit;
                }
                char::from_u32(code).unwrap_or('\u{fffd}')
            }
            '"' | '\'' | '\\' => ch,
            other => return Err(self.error(start, &format!("invalid escape '\\{other}'"))),
        };
        Ok(escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text)
            .expect("tokens")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn skips_comments_and_tracks_positions() {
        let tokens = tokenize("// header\n/* block\n */ class A").expect("tokens");

        assert_eq!(tokens[0].kind, TokenKind::Identifier("class".to_string()));
        assert_eq!(tokens[0].position, Position::new(3, 5));
        assert_eq!(tokens[1].position, Position::new(3, 11));
    }

    #[test]
    fn classifies_number_literals() {
        assert_eq!(
            kinds("10 0x7fff_ffffL 1.5 2f 3e10 0b101 .5d"),
            vec![
                TokenKind::Integer("10".to_string()),
                TokenKind::Long("0x7fffffff".to_string()),
                TokenKind::Double("1.5".to_string()),
                TokenKind::Float("2".to_string()),
                TokenKind::Double("3e10".to_string()),
                TokenKind::Integer("0b101".to_string()),
                TokenKind::Double(".5".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn decodes_string_and_char_escapes() {
        assert_eq!(
            kinds(r#""a\"bA" '\n'"#),
            vec![
                TokenKind::String("a\"bA".to_string()),
                TokenKind::Char('\n'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn recognises_ellipsis_and_annotation_sign() {
        assert_eq!(
            kinds("String @A ... args"),
            vec![
                TokenKind::Identifier("String".to_string()),
                TokenKind::Punct('@'),
                TokenKind::Identifier("A".to_string()),
                TokenKind::Ellipsis,
                TokenKind::Identifier("args".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_string() {
        let error = tokenize("\"open").expect_err("unterminated");
        assert_eq!(error.position, Position::new(1, 2));
    }

    #[test]
    fn binary_literals_take_only_binary_digits() {
        assert_eq!(
            kinds("0b1_0L"),
            vec![TokenKind::Long("0b10".to_string()), TokenKind::Eof]
        );
        assert!(tokenize("0b102").is_err());
        assert!(tokenize("0b1f").is_err());
        assert!(tokenize("0b").is_err());
    }
}
