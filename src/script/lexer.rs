//! Tokenizer for analysis scripts.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens so the parser can treat blocks like brackets.
//! Newlines inside `()`, `[]` and `{}` are ignored (implicit line joining).

use super::error::{ScriptError, ScriptResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Body of an f-string with escapes already processed
    FStr(String),
    Name(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Amp,
    Pipe,
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// A token with the 1-based source line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    out: Vec<Spanned>,
}

/// Tokenize a complete script
pub fn tokenize(source: &str) -> ScriptResult<Vec<Spanned>> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        indents: vec![0],
        at_line_start: true,
        out: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.out)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, token: Token) {
        self.out.push(Spanned {
            token,
            line: self.line,
        });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.out.last().map(|s| &s.token),
            None | Some(Token::Newline) | Some(Token::Indent) | Some(Token::Dedent)
        )
    }

    fn run(&mut self) -> ScriptResult<()> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.depth == 0 {
                self.handle_indentation()?;
                if self.pos >= self.chars.len() {
                    break;
                }
            }

            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };

            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        if !self.last_is_newline() {
                            self.push(Token::Newline);
                        }
                        self.at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' => self.pos += 1,
                '\\' if self.peek_at(1) == Some('\n') => {
                    // explicit line continuation
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '"' | '\'' => {
                    let text = self.read_string(false)?;
                    self.push(Token::Str(text));
                }
                c if c.is_ascii_digit() => self.read_number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.read_number()?,
                c if c.is_alphabetic() || c == '_' => self.read_name()?,
                _ => self.read_operator()?,
            }
        }

        if !self.last_is_newline() {
            self.push(Token::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Dedent);
        }
        self.push(Token::Eof);
        Ok(())
    }

    /// Measure leading whitespace of a logical line and emit Indent/Dedent
    fn handle_indentation(&mut self) -> ScriptResult<()> {
        loop {
            let mut width = 0usize;
            let mut cursor = self.pos;
            while let Some(c) = self.chars.get(cursor) {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / 4 + 1) * 4,
                    '\r' => {}
                    _ => break,
                }
                cursor += 1;
            }

            match self.chars.get(cursor) {
                // blank or comment-only line: indentation is meaningless
                Some('\n') => {
                    self.pos = cursor + 1;
                    self.line += 1;
                    continue;
                }
                Some('#') => {
                    while let Some(c) = self.chars.get(cursor) {
                        if *c == '\n' {
                            break;
                        }
                        cursor += 1;
                    }
                    self.pos = cursor;
                    continue;
                }
                None => {
                    self.pos = cursor;
                    self.at_line_start = false;
                    return Ok(());
                }
                Some(_) => {}
            }

            self.pos = cursor;
            self.at_line_start = false;

            let current = *self.indents.last().unwrap_or(&0);
            if width > current {
                self.indents.push(width);
                self.push(Token::Indent);
            } else if width < current {
                while width < *self.indents.last().unwrap_or(&0) {
                    self.indents.pop();
                    self.push(Token::Dedent);
                }
                if width != *self.indents.last().unwrap_or(&0) {
                    return Err(ScriptError::Indentation { line: self.line });
                }
            }
            return Ok(());
        }
    }

    fn read_name(&mut self) -> ScriptResult<()> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        // string prefixes: f"..", r"..", rf"..", fr".."
        if matches!(self.peek(), Some('"') | Some('\'')) {
            let lower = name.to_ascii_lowercase();
            match lower.as_str() {
                "f" => {
                    let body = self.read_string(false)?;
                    self.push(Token::FStr(body));
                    return Ok(());
                }
                "r" => {
                    let body = self.read_string(true)?;
                    self.push(Token::Str(body));
                    return Ok(());
                }
                "rf" | "fr" => {
                    let body = self.read_string(true)?;
                    self.push(Token::FStr(body));
                    return Ok(());
                }
                "b" | "u" => {
                    let body = self.read_string(false)?;
                    self.push(Token::Str(body));
                    return Ok(());
                }
                _ => {}
            }
        }

        self.push(Token::Name(name));
        Ok(())
    }

    fn read_number(&mut self) -> ScriptResult<()> {
        let start = self.pos;
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+')
            {
                is_float = true;
                self.pos += 2;
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        let token = if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ScriptError::syntax(self.line, format!("bad number '{}'", text)))?
        } else {
            match text.parse::<i64>() {
                Ok(n) => Token::Int(n),
                // integers wider than i64 degrade to float
                Err(_) => text
                    .parse::<f64>()
                    .map(Token::Float)
                    .map_err(|_| ScriptError::syntax(self.line, format!("bad number '{}'", text)))?,
            }
        };
        self.push(token);
        Ok(())
    }

    fn read_string(&mut self, raw: bool) -> ScriptResult<String> {
        let start_line = self.line;
        let quote = self.peek().unwrap_or('"');
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut text = String::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => return Err(ScriptError::syntax(start_line, "unterminated string literal")),
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(text);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(text);
                }
            }

            if c == '\n' {
                if !triple {
                    return Err(ScriptError::syntax(start_line, "unterminated string literal"));
                }
                self.line += 1;
            }

            if c == '\\' && !raw {
                let escaped = self.peek_at(1);
                self.pos += 2;
                match escaped {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some('\n') => self.line += 1,
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => {
                        return Err(ScriptError::syntax(start_line, "unterminated string literal"))
                    }
                }
                continue;
            }

            text.push(c);
            self.pos += 1;
        }
    }

    fn read_operator(&mut self) -> ScriptResult<()> {
        let c = self.peek().unwrap_or('\0');
        let next = self.peek_at(1);

        let (token, width) = match (c, next) {
            ('*', Some('*')) => (Token::DoubleStar, 2),
            ('/', Some('/')) => (Token::DoubleSlash, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('+', Some('=')) => (Token::PlusAssign, 2),
            ('-', Some('=')) => (Token::MinusAssign, 2),
            ('*', Some('=')) => (Token::StarAssign, 2),
            ('/', Some('=')) => (Token::SlashAssign, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('.', _) => (Token::Dot, 1),
            ('=', _) => (Token::Assign, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('&', _) => (Token::Amp, 1),
            ('|', _) => (Token::Pipe, 1),
            _ => {
                return Err(ScriptError::syntax(
                    self.line,
                    format!("unexpected character '{}'", c),
                ))
            }
        };

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => self.depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => {
                self.depth = self.depth.saturating_sub(1)
            }
            _ => {}
        }

        self.pos += width;
        self.push(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_simple_statement() {
        assert_eq!(
            kinds("x = df['a'].mean()"),
            vec![
                Token::Name("x".into()),
                Token::Assign,
                Token::Name("df".into()),
                Token::LBracket,
                Token::Str("a".into()),
                Token::RBracket,
                Token::Dot,
                Token::Name("mean".into()),
                Token::LParen,
                Token::RParen,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("for c in cols:\n    print(c)\nprint('done')\n");
        assert!(tokens.contains(&Token::Indent));
        assert!(tokens.contains(&Token::Dedent));
        let indent = tokens.iter().position(|t| *t == Token::Indent).unwrap();
        let dedent = tokens.iter().position(|t| *t == Token::Dedent).unwrap();
        assert!(indent < dedent);
    }

    #[test]
    fn test_newlines_inside_brackets_are_joined() {
        let tokens = kinds("fig = px.bar(df,\n    x='a',\n    y='b')\n");
        let newlines = tokens.iter().filter(|t| **t == Token::Newline).count();
        assert_eq!(newlines, 1);
        assert!(!tokens.contains(&Token::Indent));
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let tokens = kinds("# header\n\nx = 1  # trailing\n\n   \n");
        assert_eq!(
            tokens,
            vec![
                Token::Name("x".into()),
                Token::Assign,
                Token::Int(1),
                Token::Newline,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_numbers_and_fstrings() {
        let tokens = kinds("a = 1_000 + 2.5e3 + .5\nprint(f\"v={a:.2f}\\n\")");
        assert!(tokens.contains(&Token::Int(1000)));
        assert!(tokens.contains(&Token::Float(2500.0)));
        assert!(tokens.contains(&Token::Float(0.5)));
        assert!(tokens.contains(&Token::FStr("v={a:.2f}\n".into())));
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        let err = tokenize("x = 'oops\n").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_bad_dedent_is_indentation_error() {
        let err = tokenize("if x:\n    y = 1\n  z = 2\n").unwrap_err();
        assert!(matches!(err, ScriptError::Indentation { line: 3 }));
    }
}
