use super::lexer::{tokenize, Tok, Token};
use super::ScriptError;

/// Deepest allowed nesting of parentheses, calls and unary signs.
pub const MAX_NESTING: usize = 64;
/// Most binary operators allowed in one statement.
pub const MAX_OPERATORS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Var { name: String, line: usize },
    Call(Call),
    Neg(Box<Expr>),
    Bin(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign(Vec<String>, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

/// A parsed script body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        &self.toks[(self.pos + ahead).min(self.toks.len() - 1)].tok
    }

    fn next(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn error(&self, at: &Token, msg: impl Into<String>) -> ScriptError {
        ScriptError::Syntax { line: at.line, col: at.col, msg: msg.into() }
    }

    fn expect(&mut self, want: Tok, what: &str) -> Result<Token, ScriptError> {
        let t = self.next();
        if t.tok == want {
            Ok(t)
        } else {
            Err(self.error(&t, format!("expected {}", what)))
        }
    }

    fn binary(&mut self, lhs: Expr, op: BinOp, rhs: Expr, at: &Token) -> Result<Expr, ScriptError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(self.error(at, "expression is too long"));
        }
        Ok(Expr::Bin(Box::new(lhs), op, Box::new(rhs)))
    }

    fn program(&mut self) -> Result<Program, ScriptError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek().tok {
                Tok::Eof => return Ok(Program { stmts }),
                Tok::Newline => {
                    self.next();
                }
                _ => {
                    stmts.push(self.statement()?);
                    let end = self.next();
                    if !matches!(end.tok, Tok::Newline | Tok::Eof) {
                        return Err(self.error(&end, "expected end of statement"));
                    }
                }
            }
        }
    }

    fn is_assignment(&self) -> bool {
        let mut i = 0;
        loop {
            match (self.peek_at(i), self.peek_at(i + 1)) {
                (Tok::Ident(_), Tok::Assign) => return true,
                (Tok::Ident(_), Tok::Comma) => i += 2,
                _ => return false,
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.peek().line;
        self.operators = 0;
        if self.is_assignment() {
            let mut names = Vec::new();
            loop {
                let t = self.next();
                match t.tok {
                    Tok::Ident(name) => names.push(name),
                    _ => return Err(self.error(&t, "expected a name")),
                }
                if self.next().tok == Tok::Assign {
                    break;
                }
            }
            let value = self.expr()?;
            return Ok(Stmt { line, kind: StmtKind::Assign(names, value) });
        }
        Ok(Stmt { line, kind: StmtKind::Expr(self.expr()?) })
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().tok {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            let at = self.next();
            let rhs = self.term()?;
            lhs = self.binary(lhs, op, rhs, &at)?;
        }
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().tok {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                _ => return Ok(lhs),
            };
            let at = self.next();
            let rhs = self.unary()?;
            lhs = self.binary(lhs, op, rhs, &at)?;
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.depth >= MAX_NESTING {
            let at = self.peek().clone();
            return Err(self.error(&at, "expression is nested too deeply"));
        }
        self.depth += 1;
        let result = self.signed();
        self.depth -= 1;
        result
    }

    fn signed(&mut self) -> Result<Expr, ScriptError> {
        match self.peek().tok {
            Tok::Minus => {
                self.next();
                Ok(match self.unary()? {
                    Expr::Num(n) => Expr::Num(-n),
                    other => Expr::Neg(Box::new(other)),
                })
            }
            Tok::Plus => {
                self.next();
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let t = self.next();
        match t.tok {
            Tok::Num(n) => Ok(Expr::Num(n)),
            Tok::Str(ref s) => Ok(Expr::Str(s.clone())),
            Tok::LParen => {
                let e = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::Ident(ref name) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                _ if self.peek().tok == Tok::LParen => {
                    self.next();
                    self.call_args(name.clone(), &t)
                }
                _ => Ok(Expr::Var { name: name.clone(), line: t.line }),
            },
            Tok::Newline | Tok::Eof => Err(self.error(&t, "unexpected end of statement")),
            _ => Err(self.error(&t, "unexpected token")),
        }
    }

    fn call_args(&mut self, name: String, at: &Token) -> Result<Expr, ScriptError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        loop {
            if self.peek().tok == Tok::RParen {
                self.next();
                break;
            }
            let start = self.peek().clone();
            let keyword = *self.peek_at(1) == Tok::Assign;
            if let (Tok::Ident(key), true) = (&start.tok, keyword) {
                let key = key.clone();
                self.next();
                self.next();
                if kwargs.iter().any(|(k, _)| *k == key) {
                    return Err(self.error(&start, format!("keyword argument '{}' repeated", key)));
                }
                kwargs.push((key, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error(&start, "positional argument follows keyword argument"));
                }
                args.push(self.expr()?);
            }
            let sep = self.next();
            match sep.tok {
                Tok::Comma => {}
                Tok::RParen => break,
                _ => return Err(self.error(&sep, "expected ',' or ')'")),
            }
        }
        Ok(Expr::Call(Call { name, args, kwargs, line: at.line, col: at.col }))
    }
}

/// Parse a whole script body.
pub fn parse(src: &str) -> Result<Program, ScriptError> {
    let toks = tokenize(src)?;
    Parser { toks, pos: 0, depth: 0, operators: 0 }.program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(src: &str) -> Call {
        let p = parse(src).unwrap();
        match &p.stmts[0].kind {
            StmtKind::Expr(Expr::Call(c)) => c.clone(),
            other => panic!("not a call: {:?}", other),
        }
    }

    #[test]
    fn positional_and_keyword_args() {
        let c = call("click('right', count=2)");
        assert_eq!(c.name, "click");
        assert_eq!(c.args, vec![Expr::Str("right".into())]);
        assert_eq!(c.kwargs, vec![("count".into(), Expr::Num(2.0))]);
    }

    #[test]
    fn negative_literals_fold() {
        let c = call("scroll(0, -3)");
        assert_eq!(c.args, vec![Expr::Num(0.0), Expr::Num(-3.0)]);
    }

    #[test]
    fn tuple_assignment() {
        let p = parse("x, y = mousePosition()\nmove(x + 10, y * 2)").unwrap();
        assert_eq!(p.stmts.len(), 2);
        match &p.stmts[0].kind {
            StmtKind::Assign(names, Expr::Call(c)) => {
                assert_eq!(names, &vec!["x".to_string(), "y".to_string()]);
                assert_eq!(c.name, "mousePosition");
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(p.stmts[1].line, 2);
    }

    #[test]
    fn precedence() {
        let p = parse("a = 1 + 2 * 3").unwrap();
        let StmtKind::Assign(_, e) = &p.stmts[0].kind else { panic!() };
        assert_eq!(
            e,
            &Expr::Bin(
                Box::new(Expr::Num(1.0)),
                BinOp::Add,
                Box::new(Expr::Bin(Box::new(Expr::Num(2.0)), BinOp::Mul, Box::new(Expr::Num(3.0)))),
            )
        );
    }

    #[test]
    fn empty_and_comment_only() {
        assert!(parse("").unwrap().stmts.is_empty());
        assert!(parse("# nothing here\n\n").unwrap().stmts.is_empty());
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse("click(button='left' count=1)").is_err());
        assert!(parse("click(button='left', 1)").is_err());
        assert!(parse("click(count=1, count=2)").is_err());
        assert!(parse("move(1, 2) move(3, 4)").is_err());
        assert!(parse("= 3").is_err());
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let src = format!("a = {}1{}", "-(".repeat(100_000), ")".repeat(100_000));
        match parse(&src) {
            Err(ScriptError::Syntax { line: 1, msg, .. }) => assert!(msg.contains("nested")),
            other => panic!("unexpected {:?}", other),
        }
        let calls = format!("{}1{}", "move(".repeat(MAX_NESTING + 1), ", 1)".repeat(MAX_NESTING + 1));
        assert!(parse(&calls).is_err());
        let ok = format!("a = {}1{}", "(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        let long = format!("a = 1{}", " + 1".repeat(100_000));
        match parse(&long) {
            Err(ScriptError::Syntax { msg, .. }) => assert!(msg.contains("too long")),
            other => panic!("unexpected {:?}", other),
        }
        let fits = format!("a = 1{}\nb = 1{}", " * 2".repeat(MAX_OPERATORS), " - 1".repeat(MAX_OPERATORS));
        assert_eq!(parse(&fits).unwrap().stmts.len(), 2);
    }
}
