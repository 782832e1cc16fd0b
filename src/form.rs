use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::lexer::{Lexer, Loc, Token, TokenKind};

/// An error that happens while parsing a form out of the token stream.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("there is no form in the input")]
    EmptyInput(Loc),
    #[error("expected an atom or an open paren but got {0}")]
    ExpectedForm(Token),
    #[error("expected {expected} but got {actual}")]
    ExpectedToken { expected: TokenKind, actual: Token },
}

impl ParseError {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::EmptyInput(loc) => loc,
            Self::ExpectedForm(token) => &token.loc,
            Self::ExpectedToken { actual, .. } => &actual.loc,
        }
    }
}

/// The single value type the engine operates on: an indivisible text token
/// or an ordered sequence of forms. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Form {
    Atom(String),
    Seq(Vec<Form>),
}

impl Form {
    pub fn atom(text: impl Into<String>) -> Self {
        let text = text.into();
        debug_assert!(!text.is_empty(), "an atom's text is never empty");
        Self::Atom(text)
    }

    pub fn seq(items: Vec<Form>) -> Self {
        Self::Seq(items)
    }

    /// Parses a single form. The caller decides what has to follow it:
    /// the shell demands `End`, the file interpreter keeps going.
    pub fn parse(lexer: &mut Lexer) -> Result<Self, ParseError> {
        let token = lexer.next_token();
        match token.kind {
            TokenKind::Ident => Ok(Form::Atom(token.text)),

            TokenKind::OpenParen => {
                let mut items = Vec::new();
                while !matches!(lexer.peek_token().kind, TokenKind::CloseParen | TokenKind::End) {
                    items.push(Self::parse(lexer)?);
                }
                lexer
                    .expect_token(TokenKind::CloseParen)
                    .map_err(|(expected, actual)| ParseError::ExpectedToken { expected, actual })?;
                Ok(Form::Seq(items))
            }

            TokenKind::End => Err(ParseError::EmptyInput(token.loc)),

            _ => Err(ParseError::ExpectedForm(token)),
        }
    }
}

impl FromStr for Form {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lexer = Lexer::new(s.chars().collect(), None);
        let form = Form::parse(&mut lexer)?;
        lexer
            .expect_token(TokenKind::End)
            .map_err(|(expected, actual)| ParseError::ExpectedToken { expected, actual })?;
        Ok(form)
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Form::Atom(text) => write!(f, "{}", text),
            Form::Seq(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, " ")? }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(input: &str) -> Form {
        input.parse().unwrap()
    }

    #[test]
    fn parses_atoms_and_sequences() {
        assert_eq!(form("foo"), Form::atom("foo"));
        assert_eq!(form("()"), Form::seq(vec![]));
        assert_eq!(
            form("(f a (g b))"),
            Form::seq(vec![
                Form::atom("f"),
                Form::atom("a"),
                Form::seq(vec![Form::atom("g"), Form::atom("b")]),
            ])
        );
    }

    #[test]
    fn blank_and_comment_only_input_is_empty() {
        assert!(matches!("".parse::<Form>(), Err(ParseError::EmptyInput(_))));
        assert!(matches!("   ".parse::<Form>(), Err(ParseError::EmptyInput(_))));
        assert!(matches!("; just a comment".parse::<Form>(), Err(ParseError::EmptyInput(_))));
    }

    #[test]
    fn unbalanced_delimiters_are_rejected() {
        assert!(matches!(
            "(a (b)".parse::<Form>(),
            Err(ParseError::ExpectedToken { expected: TokenKind::CloseParen, .. })
        ));
        assert!(matches!(")".parse::<Form>(), Err(ParseError::ExpectedForm(_))));
        assert!(matches!(
            "(a) b".parse::<Form>(),
            Err(ParseError::ExpectedToken { expected: TokenKind::End, .. })
        ));
    }

    #[test]
    fn printing_joins_with_single_spaces() {
        for input in ["foo", "()", "(f a (g b))", "(not (not true))"] {
            assert_eq!(form(input).to_string(), input);
        }
        assert_eq!(form("( f   a )").to_string(), "(f a)");
    }
}
