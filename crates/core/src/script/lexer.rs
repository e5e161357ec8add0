use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Num(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub col: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
    open: Vec<(usize, usize)>,
    out: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, tok: Tok, line: usize, col: usize) {
        self.out.push(Token { tok, line, col });
    }

    fn error(&self, line: usize, col: usize, msg: impl Into<String>) -> ScriptError {
        ScriptError::Syntax { line, col, msg: msg.into() }
    }

    fn string(&mut self, quote: char, line: usize, col: usize) -> Result<String, ScriptError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(line, col, "unterminated string")),
                Some(c) if c == quote => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('\'') => s.push('\''),
                    Some('"') => s.push('"'),
                    Some(other) => {
                        s.push('\\');
                        s.push(other);
                    }
                    None => return Err(self.error(line, col, "unterminated string")),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn number(&mut self, first: char, line: usize, col: usize) -> Result<f64, ScriptError> {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        text.replace('_', "")
            .parse()
            .map_err(|_| self.error(line, col, format!("invalid number '{}'", text)))
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        loop {
            let (line, col) = (self.line, self.col);
            let Some(c) = self.bump() else { break };
            match c {
                ' ' | '\t' | '\r' => {}
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                // newlines inside parentheses continue the statement
                '\n' | ';' => {
                    if self.open.is_empty() {
                        self.push(Tok::Newline, line, col);
                    }
                }
                '(' => {
                    self.open.push((line, col));
                    self.push(Tok::LParen, line, col);
                }
                ')' => {
                    if self.open.pop().is_none() {
                        return Err(self.error(line, col, "unmatched ')'"));
                    }
                    self.push(Tok::RParen, line, col);
                }
                ',' => self.push(Tok::Comma, line, col),
                '=' => self.push(Tok::Assign, line, col),
                '+' => self.push(Tok::Plus, line, col),
                '-' => self.push(Tok::Minus, line, col),
                '*' => self.push(Tok::Star, line, col),
                '/' => self.push(Tok::Slash, line, col),
                '\'' | '"' => {
                    let s = self.string(c, line, col)?;
                    self.push(Tok::Str(s), line, col);
                }
                c if c.is_ascii_digit() || c == '.' => {
                    let n = self.number(c, line, col)?;
                    self.push(Tok::Num(n), line, col);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::from(c);
                    while let Some(&c) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            ident.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.push(Tok::Ident(ident), line, col);
                }
                other => return Err(self.error(line, col, format!("unexpected character '{}'", other))),
            }
        }
        if let Some(&(line, col)) = self.open.last() {
            return Err(self.error(line, col, "'(' was never closed"));
        }
        let (line, col) = (self.line, self.col);
        self.push(Tok::Newline, line, col);
        self.push(Tok::Eof, line, col);
        Ok(self.out)
    }
}

/// Split script text into tokens. Comments and blank lines produce nothing.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ScriptError> {
    Lexer { chars: src.chars().peekable(), line: 1, col: 1, open: Vec::new(), out: Vec::new() }.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn call_with_keyword() {
        assert_eq!(
            toks("click(button='left')"),
            vec![
                Tok::Ident("click".into()),
                Tok::LParen,
                Tok::Ident("button".into()),
                Tok::Assign,
                Tok::Str("left".into()),
                Tok::RParen,
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_semicolons() {
        assert_eq!(
            toks("# header\nsleep(0.25); move(1, 2) # trailing\n"),
            vec![
                Tok::Newline,
                Tok::Ident("sleep".into()),
                Tok::LParen,
                Tok::Num(0.25),
                Tok::RParen,
                Tok::Newline,
                Tok::Ident("move".into()),
                Tok::LParen,
                Tok::Num(1.0),
                Tok::Comma,
                Tok::Num(2.0),
                Tok::RParen,
                Tok::Newline,
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(toks(r"typeText('\'')")[2], Tok::Str("'".into()));
        assert_eq!(toks(r#"typeText("a\\b")"#)[2], Tok::Str("a\\b".into()));
    }

    #[test]
    fn multiline_call_is_one_statement() {
        let t = toks("move(\n  1,\n  2\n)");
        assert_eq!(t.iter().filter(|t| **t == Tok::Newline).count(), 1);
    }

    #[test]
    fn errors_have_positions() {
        match tokenize("move(1, 2)\n  typeText('oops") {
            Err(ScriptError::Syntax { line, col, .. }) => assert_eq!((line, col), (2, 12)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(tokenize("move(1, 2))").is_err());
        assert!(tokenize("move(1, 2").is_err());
        assert!(tokenize("move(1 $ 2)").is_err());
    }

    #[test]
    fn unclosed_paren_points_at_innermost_open() {
        match tokenize("sleep(1)
move((1, 2

") {
            Err(ScriptError::Syntax { line, col, .. }) => assert_eq!((line, col), (2, 6)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
