//! Recursive-descent parser producing [`Stmt`] trees.

use super::ast::{BinaryOp, Expr, FPart, Stmt, StmtKind, Target, UnaryOp};
use super::error::{ScriptError, ScriptResult};
use super::lexer::{tokenize, Spanned, Token};

/// Statements the language reserves but does not implement
const UNSUPPORTED: &[&str] = &[
    "while", "def", "class", "return", "try", "except", "with", "lambda", "yield", "global",
    "del", "async", "await", "assert", "break", "continue",
];

/// Parse a complete script into statements
pub fn parse(source: &str) -> ScriptResult<Vec<Stmt>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    parser.program()
}

/// Parse a single expression (used for f-string fields)
fn parse_expression(source: &str, line: usize) -> ScriptResult<Expr> {
    let tokens = tokenize(source)
        .map_err(|_| ScriptError::syntax(line, "invalid f-string field"))?
        .into_iter()
        .map(|mut s| {
            s.line = line;
            s
        })
        .collect();
    let mut parser = Parser::new(tokens);
    let expr = parser.expression()?;
    parser.skip_newlines();
    if !parser.at(&Token::Eof) {
        return Err(ScriptError::syntax(line, "invalid f-string field"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens
            .get(self.pos + 1)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == keyword)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> ScriptResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ScriptResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn expect_name(&mut self) -> ScriptResult<String> {
        match self.peek().clone() {
            Token::Name(name) if !is_keyword(&name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn unexpected(&self, expected: &str) -> ScriptError {
        ScriptError::syntax(
            self.line(),
            format!("expected {}, found {:?}", expected, self.peek()),
        )
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn end_of_statement(&mut self) -> ScriptResult<()> {
        match self.peek() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Eof | Token::Dedent => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn program(&mut self) -> ScriptResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Token::Eof => break,
                Token::Indent => {
                    return Err(ScriptError::syntax(self.line(), "unexpected indent"))
                }
                _ => statements.push(self.statement()?),
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        let keyword = match self.peek() {
            Token::Name(n) => Some(n.clone()),
            _ => None,
        };

        let kind = match keyword.as_deref() {
            Some("for") => self.for_statement()?,
            Some("if") => self.if_statement()?,
            Some("import") | Some("from") => {
                // dependencies are provided by the environment
                while !matches!(self.peek(), Token::Newline | Token::Eof) {
                    self.advance();
                }
                self.end_of_statement()?;
                StmtKind::Pass
            }
            Some("pass") => {
                self.advance();
                self.end_of_statement()?;
                StmtKind::Pass
            }
            Some("raise") => self.raise_statement()?,
            Some(word) if UNSUPPORTED.contains(&word) => {
                return Err(ScriptError::syntax(
                    line,
                    format!("'{}' statements are not supported", word),
                ))
            }
            _ => self.simple_statement()?,
        };

        Ok(Stmt { kind, line })
    }

    fn simple_statement(&mut self) -> ScriptResult<StmtKind> {
        let expr = self.expression()?;

        let aug = match self.peek() {
            Token::PlusAssign => Some(BinaryOp::Add),
            Token::MinusAssign => Some(BinaryOp::Sub),
            Token::StarAssign => Some(BinaryOp::Mul),
            Token::SlashAssign => Some(BinaryOp::Div),
            _ => None,
        };

        let kind = if self.eat(&Token::Assign) {
            let target = self.target_from(expr)?;
            let value = self.expression()?;
            StmtKind::Assign(target, value)
        } else if let Some(op) = aug {
            self.advance();
            let target = self.target_from(expr)?;
            let value = self.expression()?;
            StmtKind::AugAssign(target, op, value)
        } else {
            StmtKind::Expr(expr)
        };

        self.end_of_statement()?;
        Ok(kind)
    }

    fn target_from(&self, expr: Expr) -> ScriptResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index(base, key) => match *base {
                Expr::Name(name) => Ok(Target::Index(name, *key)),
                _ => Err(ScriptError::syntax(
                    self.line(),
                    "cannot assign to nested subscript",
                )),
            },
            _ => Err(ScriptError::syntax(self.line(), "cannot assign to expression")),
        }
    }

    fn raise_statement(&mut self) -> ScriptResult<StmtKind> {
        self.advance();
        let kind = self.expect_name()?;
        let mut message = None;
        if self.eat(&Token::LParen) {
            if !self.at(&Token::RParen) {
                message = Some(self.expression()?);
            }
            self.expect(Token::RParen, "')'")?;
        }
        self.end_of_statement()?;
        Ok(StmtKind::Raise { kind, message })
    }

    fn for_statement(&mut self) -> ScriptResult<StmtKind> {
        self.advance();
        let var = self.expect_name()?;
        self.expect_keyword("in")?;
        let iter = self.expression()?;
        self.expect(Token::Colon, "':'")?;
        let body = self.block()?;
        Ok(StmtKind::For { var, iter, body })
    }

    fn if_statement(&mut self) -> ScriptResult<StmtKind> {
        self.advance();
        let mut branches = Vec::new();

        let condition = self.expression()?;
        self.expect(Token::Colon, "':'")?;
        branches.push((condition, self.block()?));

        while self.eat_keyword("elif") {
            let condition = self.expression()?;
            self.expect(Token::Colon, "':'")?;
            branches.push((condition, self.block()?));
        }

        let orelse = if self.eat_keyword("else") {
            self.expect(Token::Colon, "':'")?;
            self.block()?
        } else {
            Vec::new()
        };

        Ok(StmtKind::If { branches, orelse })
    }

    fn block(&mut self) -> ScriptResult<Vec<Stmt>> {
        if !self.eat(&Token::Newline) {
            // single-line body: `if x: print(x)`
            return Ok(vec![self.statement()?]);
        }
        self.skip_newlines();
        self.expect(Token::Indent, "an indented block")?;

        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&Token::Dedent) || self.at(&Token::Eof) {
                break;
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    // ------------------------------------------------------------------
    // Expressions, lowest precedence first
    // ------------------------------------------------------------------

    fn expression(&mut self) -> ScriptResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> ScriptResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ScriptResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> ScriptResult<Expr> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek() {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            Token::Name(n) if n == "in" => BinaryOp::In,
            Token::Name(n) if n == "not" => match self.peek_next() {
                Token::Name(m) if m == "in" => BinaryOp::NotIn,
                _ => return None,
            },
            _ => return None,
        };
        if op == BinaryOp::NotIn {
            self.advance();
        }
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> ScriptResult<Expr> {
        let first = self.bit_or()?;
        let mut operands = vec![first];
        let mut ops = Vec::new();

        while let Some(op) = self.comparison_op() {
            ops.push(op);
            operands.push(self.bit_or()?);
        }

        if ops.is_empty() {
            return Ok(operands.remove(0));
        }

        // a < b < c  ==>  (a < b) and (b < c)
        let mut chained: Option<Expr> = None;
        for (i, op) in ops.into_iter().enumerate() {
            let link = Expr::Binary(
                op,
                Box::new(operands[i].clone()),
                Box::new(operands[i + 1].clone()),
            );
            chained = Some(match chained {
                None => link,
                Some(prev) => Expr::And(Box::new(prev), Box::new(link)),
            });
        }
        chained.ok_or_else(|| ScriptError::syntax(self.line(), "empty comparison"))
    }

    fn bit_or(&mut self) -> ScriptResult<Expr> {
        let mut left = self.bit_and()?;
        while self.eat(&Token::Pipe) {
            let right = self.bit_and()?;
            left = Expr::Binary(BinaryOp::BitOr, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> ScriptResult<Expr> {
        let mut left = self.arith()?;
        while self.eat(&Token::Amp) {
            let right = self.arith()?;
            left = Expr::Binary(BinaryOp::BitAnd, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn arith(&mut self) -> ScriptResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> ScriptResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> ScriptResult<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Plus) {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.unary()?)));
        }
        self.power()
    }

    fn power(&mut self) -> ScriptResult<Expr> {
        let base = self.postfix()?;
        if self.eat(&Token::DoubleStar) {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let (args, kwargs) = self.call_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let key = self.subscript()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Name(n) => n,
                        _ => return Err(self.unexpected("attribute name")),
                    };
                    expr = Expr::Attribute(Box::new(expr), name);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `[key]` or `[start:end]`; slices become a call to the `slice` builtin
    fn subscript(&mut self) -> ScriptResult<Expr> {
        let start = if self.at(&Token::Colon) {
            Expr::None
        } else {
            self.expression()?
        };
        if !self.eat(&Token::Colon) {
            return Ok(start);
        }
        let end = if self.at(&Token::RBracket) {
            Expr::None
        } else {
            self.expression()?
        };
        Ok(Expr::Call {
            callee: Box::new(Expr::Name("slice".to_string())),
            args: vec![start, end],
            kwargs: Vec::new(),
        })
    }

    fn call_arguments(&mut self) -> ScriptResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();

        while !self.at(&Token::RParen) {
            let is_kwarg = matches!(self.peek(), Token::Name(_))
                && matches!(self.peek_next(), Token::Assign);
            if is_kwarg {
                let name = self.expect_name()?;
                self.advance();
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(ScriptError::syntax(
                        self.line(),
                        "positional argument follows keyword argument",
                    ));
                }
                args.push(self.expression()?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        match self.advance() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(s) => {
                // adjacent literals concatenate
                let mut text = s;
                while let Token::Str(next) = self.peek().clone() {
                    self.advance();
                    text.push_str(&next);
                }
                Ok(Expr::Str(text))
            }
            Token::FStr(body) => Ok(Expr::FString(parse_fstring(&body, line)?)),
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                _ if is_keyword(&name) => Err(ScriptError::syntax(
                    line,
                    format!("unexpected keyword '{}'", name),
                )),
                _ => Ok(Expr::Name(name)),
            },
            Token::LParen => {
                if self.eat(&Token::RParen) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                // tuples are represented as lists
                let mut items = vec![first];
                while self.eat(&Token::Comma) {
                    if self.at(&Token::RParen) {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect(Token::RParen, "')'")?;
                Ok(Expr::List(items))
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while !self.at(&Token::RBracket) {
                    items.push(self.expression()?);
                    if self.at_keyword("for") {
                        return self.list_comprehension(items.remove(0));
                    }
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            other => Err(ScriptError::syntax(
                line,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    /// `[elt for var in iter if cond]`, lowered to a call of the reserved
    /// [`COMPREHENSION`] callee; the interpreter evaluates it lazily.
    fn list_comprehension(&mut self, element: Expr) -> ScriptResult<Expr> {
        self.expect_keyword("for")?;
        let var = self.expect_name()?;
        self.expect_keyword("in")?;
        let iter = self.bit_or()?;
        let condition = if self.eat_keyword("if") {
            self.or_expr()?
        } else {
            Expr::Bool(true)
        };
        self.expect(Token::RBracket, "']'")?;

        Ok(Expr::Call {
            callee: Box::new(Expr::Name(COMPREHENSION.to_string())),
            args: vec![Expr::Str(var), iter, element, condition],
            kwargs: Vec::new(),
        })
    }
}

/// Reserved callee name for lowered list comprehensions
pub const COMPREHENSION: &str = "<listcomp>";

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "and" | "or" | "not" | "in" | "if" | "elif" | "else" | "for" | "import" | "from" | "as"
            | "pass" | "raise" | "is"
    ) || UNSUPPORTED.contains(&name)
}

/// Split an f-string body into literal text and `{expr[:spec]}` fields
fn parse_fstring(body: &str, line: usize) -> ScriptResult<Vec<FPart>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }
        if c == '}' && chars.get(i + 1) == Some(&'}') {
            literal.push('}');
            i += 2;
            continue;
        }
        if c == '}' {
            return Err(ScriptError::syntax(line, "single '}' is not allowed"));
        }
        if c != '{' {
            literal.push(c);
            i += 1;
            continue;
        }

        // field: scan to the matching brace, tracking nesting and quotes
        let start = i + 1;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut spec_at: Option<usize> = None;
        let mut j = start;
        loop {
            let ch = match chars.get(j) {
                Some(ch) => *ch,
                None => return Err(ScriptError::syntax(line, "expecting '}'")),
            };
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
            } else {
                match ch {
                    '\'' | '"' => quote = Some(ch),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' => depth = depth.saturating_sub(1),
                    '}' if depth > 0 => depth -= 1,
                    '}' => break,
                    ':' if depth == 0 && spec_at.is_none() => spec_at = Some(j),
                    _ => {}
                }
            }
            j += 1;
        }

        let expr_end = spec_at.unwrap_or(j);
        let mut expr_text: String = chars[start..expr_end].iter().collect();
        // conversions (!r, !s) do not change the rendering here
        if let Some(bang) = expr_text.rfind('!') {
            if matches!(&expr_text[bang..], "!r" | "!s" | "!a") {
                expr_text.truncate(bang);
            }
        }
        let spec = spec_at.map(|s| chars[s + 1..j].iter().collect::<String>());

        if !literal.is_empty() {
            parts.push(FPart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(FPart::Field {
            expr: parse_expression(expr_text.trim(), line)?,
            spec,
        });
        i = j + 1;
    }

    if !literal.is_empty() {
        parts.push(FPart::Literal(literal));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> StmtKind {
        let mut stmts = parse(source).unwrap();
        assert_eq!(stmts.len(), 1);
        stmts.remove(0).kind
    }

    #[test]
    fn test_assignment_and_precedence() {
        let kind = single("x = 1 + 2 * 3");
        let expected = StmtKind::Assign(
            Target::Name("x".into()),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Int(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Int(2)),
                    Box::new(Expr::Int(3)),
                )),
            ),
        );
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_column_assignment_target() {
        let kind = single("df['total'] = df['a'] + df['b']");
        match kind {
            StmtKind::Assign(Target::Index(name, Expr::Str(key)), _) => {
                assert_eq!(name, "df");
                assert_eq!(key, "total");
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_method_call_with_kwargs() {
        let kind = single("fig = px.bar(df, x='region', y='sales', title='Sales')");
        let StmtKind::Assign(_, Expr::Call { args, kwargs, .. }) = kind else {
            panic!("expected call assignment");
        };
        assert_eq!(args.len(), 1);
        let names: Vec<&str> = kwargs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "title"]);
    }

    #[test]
    fn test_for_and_if_blocks() {
        let source = "for c in df.columns:\n    if c == 'a':\n        print(c)\n    elif c == 'b':\n        pass\n    else:\n        print('other')\nprint('done')\n";
        let stmts = parse(source).unwrap();
        assert_eq!(stmts.len(), 2);
        let StmtKind::For { body, .. } = &stmts[0].kind else {
            panic!("expected for loop");
        };
        let StmtKind::If { branches, orelse } = &body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
        assert_eq!(stmts[1].line, 8);
    }

    #[test]
    fn test_imports_are_ignored() {
        let stmts = parse("import pandas as pd\nfrom plotly import express as px\n").unwrap();
        assert!(stmts.iter().all(|s| s.kind == StmtKind::Pass));
    }

    #[test]
    fn test_fstring_fields_and_specs() {
        let StmtKind::Expr(Expr::FString(parts)) = single("f'Mean: {m:.2f} of {{n}} {len(xs)}'")
        else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], FPart::Literal("Mean: ".into()));
        assert!(matches!(&parts[1], FPart::Field { spec: Some(s), .. } if s == ".2f"));
        assert_eq!(parts[2], FPart::Literal(" of {n} ".into()));
    }

    #[test]
    fn test_chained_comparison_and_mask() {
        let kind = single("m = (df['a'] > 1) & (df['b'] <= 3)");
        let StmtKind::Assign(_, Expr::Binary(op, _, _)) = kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::BitAnd);

        let kind = single("ok = 0 < x < 10");
        assert!(matches!(kind, StmtKind::Assign(_, Expr::And(_, _))));
    }

    #[test]
    fn test_slice_and_comprehension_lowering() {
        let kind = single("top = xs[:3]");
        assert!(
            matches!(kind, StmtKind::Assign(_, Expr::Index(_, ref key)) if matches!(**key, Expr::Call { .. }))
        );

        let kind = single("ys = [x * 2 for x in xs if x > 1]");
        let StmtKind::Assign(_, Expr::Call { callee, args, .. }) = kind else {
            panic!("expected lowered comprehension");
        };
        assert_eq!(*callee, Expr::Name(COMPREHENSION.into()));
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_syntax_errors_report_line() {
        let err = parse("x = 1\ny = (2 +\n").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));

        let err = parse("x = 1\nwhile True:\n    pass\n").unwrap_err();
        assert_eq!(err.to_string(), "invalid syntax (<string>, line 2)");
    }

    #[test]
    fn test_raise_statement() {
        let kind = single("raise ValueError('no rows')");
        assert_eq!(
            kind,
            StmtKind::Raise {
                kind: "ValueError".into(),
                message: Some(Expr::Str("no rows".into())),
            }
        );
    }
}
