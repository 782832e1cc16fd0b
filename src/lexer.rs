use std::fmt;

/// Where a token came from. Shell input keeps the whole line around so
/// errors can be rendered with a caret under the offending column.
#[derive(Debug, Clone)]
pub enum Loc {
    File {
        path: String,
        row: usize,
        col: usize,
    },
    Repl {
        col: usize,
        line: Vec<char>,
    },
}

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum TokenKind {
    Ident,
    OpenParen,
    CloseParen,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TokenKind::*;
        match self {
            Ident => write!(f, "atom"),
            OpenParen => write!(f, "open paren"),
            CloseParen => write!(f, "close paren"),
            End => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub loc: Loc,
}

impl PartialEq for Token {
    fn eq(&self, other: &Token) -> bool {
        self.kind == other.kind && self.text == other.text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} `{}`", self.kind, self.text)
        }
    }
}

pub const COMMENT_CHAR: char = ';';

pub struct Lexer {
    chars: Vec<char>,
    peeked: Option<Token>,
    exhausted: bool,
    file_path: Option<String>,
    lnum: usize,
    bol: usize,
    cnum: usize,
}

impl Lexer {
    pub fn new(chars: Vec<char>, file_path: Option<String>) -> Self {
        Self {
            chars,
            peeked: None,
            exhausted: false,
            file_path,
            lnum: 0,
            bol: 0,
            cnum: 0,
        }
    }

    pub fn current_line(&self) -> Vec<char> {
        let mut eol = self.bol;
        while eol < self.chars.len() && self.chars[eol] != '\n' {
            eol += 1;
        }
        self.chars[self.bol..eol].to_vec()
    }

    pub fn loc(&self) -> Loc {
        match &self.file_path {
            Some(file_path) => Loc::File {
                path: file_path.clone(),
                row: self.lnum + 1,
                col: self.cnum - self.bol + 1,
            },
            None => Loc::Repl {
                col: self.cnum - self.bol + 1,
                line: self.current_line(),
            },
        }
    }

    pub fn expect_token(&mut self, kind: TokenKind) -> Result<Token, (TokenKind, Token)> {
        let token = self.next_token();
        if kind == token.kind {
            Ok(token)
        } else {
            Err((kind, token))
        }
    }

    pub fn peek_token(&mut self) -> &Token {
        let token = self.next_token();
        self.peeked.insert(token)
    }

    pub fn next_token(&mut self) -> Token {
        self.peeked.take().unwrap_or_else(|| self.chop_tokens_from_chars())
    }

    fn drop_char_if(&mut self, predicate: impl FnOnce(char) -> bool) -> Option<char> {
        self.chars.get(self.cnum).cloned().and_then(|ch| {
            if predicate(ch) {
                self.drop_char()
            } else {
                None
            }
        })
    }

    fn drop_char(&mut self) -> Option<char> {
        self.chars.get(self.cnum).cloned().map(|ch| {
            self.cnum += 1;
            if ch == '\n' {
                self.bol = self.cnum;
                self.lnum += 1;
            }
            ch
        })
    }

    fn drop_line(&mut self) {
        while let Some(x) = self.drop_char() {
            if x == '\n' {
                return;
            }
        }
    }

    fn trim_whitespaces(&mut self) {
        while self.drop_char_if(|x| x.is_whitespace()).is_some() {}
    }

    fn chop_tokens_from_chars(&mut self) -> Token {
        assert!(!self.exhausted, "Completely exhausted lexer. The lexer MUST ALWAYS end with the terminators. If the lexer caller tries to pull tokens after the terminators, this is a bug.");

        'again: loop {
            self.trim_whitespaces();

            let loc = self.loc();
            return match self.drop_char() {
                Some(x) => {
                    let mut text = x.to_string();
                    match x {
                        '(' => Token {kind: TokenKind::OpenParen,  text, loc},
                        ')' => Token {kind: TokenKind::CloseParen, text, loc},
                        COMMENT_CHAR => {
                            self.drop_line();
                            continue 'again;
                        }
                        _ => {
                            while let Some(x) = self.drop_char_if(is_atom_char) {
                                text.push(x)
                            }
                            Token {kind: TokenKind::Ident, text, loc}
                        }
                    }
                }

                None => {
                    self.exhausted = true;
                    Token {kind: TokenKind::End, text: "".to_string(), loc}
                }
            };
        }
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            None
        } else {
            Some(self.next_token())
        }
    }
}

fn is_atom_char(x: char) -> bool {
    !x.is_whitespace() && x != '(' && x != ')' && x != COMMENT_CHAR
}
