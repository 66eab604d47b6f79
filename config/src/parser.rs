use reflex_error::{Error, Result};

use crate::value::{Node, Value};

/// Parses configuration text into a tree.
pub fn parse(text: &str) -> Result<Node> {
    let tokens = Lexer::new(text).run()?;
    let mut parser = Parser {
        tokens,
        position: 0,
    };
    let root = parser.parse_pairs(true)?;
    Ok(root)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Quoted(String),
    Int(i64),
    Float(f64),
    LBrace,
    RBrace,
    Equals,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
}

struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Lexer {
            input: text.as_bytes(),
            position: 0,
            line: 1,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&byte) = self.input.get(self.position) {
            match byte {
                b'\n' => {
                    self.line += 1;
                    self.position += 1;
                }
                b' ' | b'\t' | b'\r' | b',' => self.position += 1,
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment()?,
                b'{' => {
                    tokens.push(self.token(TokenKind::LBrace));
                    self.position += 1;
                }
                b'}' => {
                    tokens.push(self.token(TokenKind::RBrace));
                    self.position += 1;
                }
                b'=' => {
                    tokens.push(self.token(TokenKind::Equals));
                    self.position += 1;
                }
                b'"' => {
                    let token = self.quoted_string()?;
                    tokens.push(token);
                }
                _ => {
                    let token = self.bare_word()?;
                    tokens.push(token);
                }
            }
        }
        Ok(tokens)
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.position + ahead).copied()
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            line: self.line,
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&byte) = self.input.get(self.position) {
            if byte == b'\n' {
                break;
            }
            self.position += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let start_line = self.line;
        self.position += 2;
        loop {
            match self.input.get(self.position) {
                Some(b'*') if self.peek(1) == Some(b'/') => {
                    self.position += 2;
                    return Ok(());
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.position += 1;
                }
                Some(_) => self.position += 1,
                None => {
                    return Err(Error::initialisation(format!(
                        "line {start_line}: unterminated block comment"
                    )))
                }
            }
        }
    }

    fn quoted_string(&mut self) -> Result<Token> {
        let start_line = self.line;
        self.position += 1;
        let mut text = String::new();
        loop {
            match self.input.get(self.position) {
                Some(b'"') => {
                    self.position += 1;
                    return Ok(Token {
                        kind: TokenKind::Quoted(text),
                        line: start_line,
                    });
                }
                Some(b'\\') => {
                    let escaped = self.peek(1).ok_or_else(|| {
                        Error::initialisation(format!(
                            "line {start_line}: unterminated string escape"
                        ))
                    })?;
                    text.push(match escaped {
                        b'n' => '\n',
                        b't' => '\t',
                        b'"' => '"',
                        b'\\' => '\\',
                        other => other as char,
                    });
                    self.position += 2;
                }
                Some(b'\n') => {
                    return Err(Error::initialisation(format!(
                        "line {start_line}: unterminated string"
                    )))
                }
                Some(_) => {
                    // copy one whole UTF-8 sequence
                    let ch_start = self.position;
                    let mut ch_end = ch_start + 1;
                    while ch_end < self.input.len() && (self.input[ch_end] & 0xC0) == 0x80 {
                        ch_end += 1;
                    }
                    text.push_str(
                        std::str::from_utf8(&self.input[ch_start..ch_end])
                            .expect("input slice is valid utf-8"),
                    );
                    self.position = ch_end;
                }
                None => {
                    return Err(Error::initialisation(format!(
                        "line {start_line}: unterminated string"
                    )))
                }
            }
        }
    }

    fn bare_word(&mut self) -> Result<Token> {
        let start = self.position;
        while let Some(&byte) = self.input.get(self.position) {
            if byte.is_ascii_whitespace() || matches!(byte, b'{' | b'}' | b'=' | b'"' | b',') {
                break;
            }
            self.position += 1;
        }
        if start == self.position {
            return Err(Error::initialisation(format!(
                "line {}: unexpected character {:?}",
                self.line, self.input[start] as char
            )));
        }
        let word = std::str::from_utf8(&self.input[start..self.position])
            .expect("input slice is valid utf-8");
        let kind = if let Ok(v) = word.parse::<i64>() {
            TokenKind::Int(v)
        } else if let Ok(v) = word.parse::<f64>() {
            TokenKind::Float(v)
        } else {
            TokenKind::Ident(word.to_owned())
        };
        Ok(self.token(kind))
    }
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.position + ahead).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Parses `key = value` pairs until `}` (or end of input at top level).
    fn parse_pairs(&mut self, top_level: bool) -> Result<Node> {
        let mut node = Node::new();
        loop {
            match self.peek().map(|t| t.kind.clone()) {
                None => {
                    if top_level {
                        return Ok(node);
                    }
                    return Err(Error::initialisation("unexpected end of input, missing }"));
                }
                Some(TokenKind::RBrace) => {
                    if top_level {
                        let line = self.peek().map(|t| t.line).unwrap_or(0);
                        return Err(Error::initialisation(format!(
                            "line {line}: unbalanced }}"
                        )));
                    }
                    return Ok(node);
                }
                Some(_) => {
                    let (key, line) = self.parse_key()?;
                    self.expect_equals(&key, line)?;
                    let value = self.parse_value()?;
                    node.insert(key, value);
                }
            }
        }
    }

    fn parse_key(&mut self) -> Result<(String, usize)> {
        let token = self.next().expect("peeked token exists");
        match token.kind {
            TokenKind::Ident(name) => Ok((name, token.line)),
            TokenKind::Quoted(name) => Ok((name, token.line)),
            other => Err(Error::initialisation(format!(
                "line {}: expected a key, found {:?}",
                token.line, other
            ))),
        }
    }

    fn expect_equals(&mut self, key: &str, line: usize) -> Result<()> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Equals,
                ..
            }) => Ok(()),
            _ => Err(Error::initialisation(format!(
                "line {line}: expected = after key {key}"
            ))),
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        let token = self.next().ok_or_else(|| {
            Error::initialisation("unexpected end of input, expected a value")
        })?;
        match token.kind {
            TokenKind::Ident(s) => Ok(Value::Str(s)),
            TokenKind::Quoted(s) => Ok(Value::Str(s)),
            TokenKind::Int(v) => Ok(Value::Int(v)),
            TokenKind::Float(v) => Ok(Value::Float(v)),
            TokenKind::LBrace => self.parse_block(token.line),
            other => Err(Error::initialisation(format!(
                "line {}: expected a value, found {:?}",
                token.line, other
            ))),
        }
    }

    /// A `{` opens either a nested node (first token is a key followed by
    /// `=`) or an array of scalars.
    fn parse_block(&mut self, line: usize) -> Result<Value> {
        match (self.peek_kind(0), self.peek_kind(1)) {
            (Some(TokenKind::RBrace), _) => {
                self.next();
                Ok(Value::Node(Node::new()))
            }
            (Some(TokenKind::Ident(_)) | Some(TokenKind::Quoted(_)), Some(TokenKind::Equals)) => {
                let node = self.parse_pairs(false)?;
                self.next(); // consume }
                Ok(Value::Node(node))
            }
            _ => self.parse_array(line),
        }
    }

    fn parse_array(&mut self, line: usize) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            let token = self.next().ok_or_else(|| {
                Error::initialisation(format!("line {line}: unterminated array"))
            })?;
            match token.kind {
                TokenKind::RBrace => return Ok(Value::Array(items)),
                TokenKind::Ident(s) => items.push(Value::Str(s)),
                TokenKind::Quoted(s) => items.push(Value::Str(s)),
                TokenKind::Int(v) => items.push(Value::Int(v)),
                TokenKind::Float(v) => items.push(Value::Float(v)),
                TokenKind::LBrace => items.push(self.parse_array(token.line)?),
                TokenKind::Equals => {
                    return Err(Error::initialisation(format!(
                        "line {}: unexpected = inside array",
                        token.line
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_sections() {
        let text = r#"
            Functions = {
                GainGam = {
                    Class = GainGam
                    Gain = 2.0
                    InputSignals = {
                        sigX = { DataSource = DDB1 Type = int32 }
                    }
                }
            }
        "#;
        let root = parse(text).expect("parse");
        assert_eq!(
            root.at("Functions/GainGam/Class").and_then(Value::as_str),
            Some("GainGam")
        );
        assert_eq!(
            root.at("Functions/GainGam/Gain").and_then(Value::as_f64),
            Some(2.0)
        );
        assert_eq!(
            root.at("Functions/GainGam/InputSignals/sigX/Type")
                .and_then(Value::as_str),
            Some("int32")
        );
    }

    #[test]
    fn parses_arrays_and_singletons() {
        let root = parse("Functions = { GamA GamB }\nSolo = GamC\nNums = { 1 2 3 }")
            .expect("parse");
        assert_eq!(
            root.get("Functions").unwrap().as_str_list(),
            Some(vec!["GamA", "GamB"])
        );
        assert_eq!(root.get("Solo").unwrap().as_str_list(), Some(vec!["GamC"]));
        assert_eq!(
            root.get("Nums").unwrap().as_array().unwrap(),
            &[Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn comments_and_commas_are_skipped() {
        let text = r#"
            // a line comment
            A = 1, B = 2 /* inline
               block */ C = 3
        "#;
        let root = parse(text).expect("parse");
        assert_eq!(root.get_i64("A"), Some(1));
        assert_eq!(root.get_i64("B"), Some(2));
        assert_eq!(root.get_i64("C"), Some(3));
    }

    #[test]
    fn quoted_strings_keep_spaces() {
        let root = parse(r#"Title = "two words""#).expect("parse");
        assert_eq!(root.get_str("Title"), Some("two words"));
    }

    #[test]
    fn empty_block_is_an_empty_node() {
        let root = parse("Data = { }").expect("parse");
        assert!(root.node("Data").expect("node").is_empty());
    }

    #[test]
    fn nested_arrays() {
        let root = parse("M = { { 1 2 } { 3 4 } }").expect("parse");
        let outer = root.get("M").unwrap().as_array().unwrap();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[0].as_array().unwrap()[1], Value::Int(2));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse("A = {\n  B = \n}").expect_err("missing value");
        assert!(err.to_string().contains("line"), "{err}");

        let err = parse("}").expect_err("unbalanced brace");
        assert!(err.to_string().contains("unbalanced"), "{err}");
    }
}
