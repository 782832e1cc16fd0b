use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use crate::form::Form;

/// Marker prefix that turns an atom into a placeholder inside a rule
/// definition, e.g. `:x`. Outside of rule definitions it has no meaning.
pub const PLACEHOLDER_PREFIX: char = ':';

/// An error that happens at rule-definition time. The rule set is never
/// touched when one of these comes back.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("a rule definition must have exactly 3 elements, not {given}")]
    WrongShape { given: usize },
    #[error("the replacement references :{name} but the pattern never binds it")]
    UndefinedPlaceholder { name: String },
}

/// The compiled shape of a rule's pattern or replacement: a form in which
/// some atoms became named placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Atom(String),
    Hole(String),
    Seq(Vec<Pattern>),
}

pub type Bindings = HashMap<String, Form>;

fn placeholder_name(text: &str) -> Option<&str> {
    match text.strip_prefix(PLACEHOLDER_PREFIX) {
        // A bare `:` is an ordinary atom, not a nameless placeholder.
        Some(name) if !name.is_empty() => Some(name),
        _ => None,
    }
}

impl Pattern {
    fn compile_pattern(form: &Form, holes: &mut HashSet<String>) -> Self {
        match form {
            Form::Atom(text) => match placeholder_name(text) {
                Some(name) => {
                    holes.insert(name.to_string());
                    Self::Hole(name.to_string())
                }
                None => Self::Atom(text.clone()),
            },
            Form::Seq(items) => Self::Seq(
                items.iter().map(|item| Self::compile_pattern(item, holes)).collect(),
            ),
        }
    }

    fn compile_replacement(form: &Form, holes: &HashSet<String>) -> Result<Self, RuleError> {
        match form {
            Form::Atom(text) => match placeholder_name(text) {
                Some(name) => {
                    if holes.contains(name) {
                        Ok(Self::Hole(name.to_string()))
                    } else {
                        Err(RuleError::UndefinedPlaceholder { name: name.to_string() })
                    }
                }
                None => Ok(Self::Atom(text.clone())),
            },
            Form::Seq(items) => {
                let mut result = Vec::with_capacity(items.len());
                for item in items {
                    result.push(Self::compile_replacement(item, holes)?);
                }
                Ok(Self::Seq(result))
            }
        }
    }

    /// Matches `form` against this pattern. The receiver is always the
    /// pattern and the argument always the concrete form; a placeholder
    /// binds the form on first encounter and on every later encounter
    /// must compare equal to what it bound.
    pub fn pattern_match(&self, form: &Form) -> Option<Bindings> {
        fn pattern_match_impl(pattern: &Pattern, form: &Form, bindings: &mut Bindings) -> bool {
            match (pattern, form) {
                (Pattern::Atom(text1), Form::Atom(text2)) => text1 == text2,
                (Pattern::Hole(name), _) => {
                    if let Some(bound_value) = bindings.get(name) {
                        bound_value == form
                    } else {
                        bindings.insert(name.clone(), form.clone());
                        true
                    }
                }
                (Pattern::Seq(items), Form::Seq(forms)) => {
                    items.len() == forms.len()
                        && items
                            .iter()
                            .zip(forms)
                            .all(|(item, form)| pattern_match_impl(item, form, bindings))
                }
                _ => false,
            }
        }

        let mut bindings = HashMap::new();

        if pattern_match_impl(self, form, &mut bindings) {
            Some(bindings)
        } else {
            None
        }
    }

    /// Builds the concrete form this pattern describes under `bindings`.
    /// A pattern that is a bare placeholder yields exactly the bound
    /// sub-form, not a wrapper around it.
    pub fn substitute(&self, bindings: &Bindings) -> Form {
        match self {
            Self::Atom(text) => Form::Atom(text.clone()),
            Self::Hole(name) => match bindings.get(name) {
                Some(value) => value.clone(),
                // An unbound hole renders back as its marker atom.
                None => Form::Atom(format!("{}{}", PLACEHOLDER_PREFIX, name)),
            },
            Self::Seq(items) => {
                Form::Seq(items.iter().map(|item| item.substitute(bindings)).collect())
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Pattern::Atom(text) => write!(f, "{}", text),
            Pattern::Hole(name) => write!(f, "{}{}", PLACEHOLDER_PREFIX, name),
            Pattern::Seq(items) => {
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

/// A compiled `pattern -> replacement` pair. Immutable after construction;
/// the unit of matching.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Pattern,
    replacement: Pattern,
    holes: HashSet<String>,
}

impl Rule {
    /// Compiles a pattern/replacement pair of raw forms. Runs once, at
    /// rule-definition time; the result is reused for every later match
    /// attempt.
    pub fn compile(pattern: &Form, replacement: &Form) -> Result<Self, RuleError> {
        let mut holes = HashSet::new();
        let pattern = Pattern::compile_pattern(pattern, &mut holes);
        let replacement = Pattern::compile_replacement(replacement, &holes)?;
        Ok(Self { pattern, replacement, holes })
    }

    /// If `form` matches this rule's pattern, returns the transformed
    /// form; otherwise `None`.
    pub fn try_apply(&self, form: &Form) -> Option<Form> {
        let bindings = self.pattern.pattern_match(form)?;
        debug_assert_eq!(
            bindings.len(),
            self.holes.len(),
            "a successful match binds every placeholder of the pattern"
        );
        Some(self.replacement.substitute(&bindings))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.pattern, self.replacement)
    }
}


#[cfg(test)]
mod rule_tests {
    use super::*;

    fn form(input: &str) -> Form {
        input.parse().unwrap()
    }

    fn rule(pattern: &str, replacement: &str) -> Rule {
        Rule::compile(&form(pattern), &form(replacement)).unwrap()
    }

    #[test]
    fn placeholder_free_rule_matches_exactly_one_form() {
        let rule = rule("(not true)", "false");
        assert_eq!(rule.try_apply(&form("(not true)")), Some(form("false")));
        assert_eq!(rule.try_apply(&form("(not false)")), None);
        assert_eq!(rule.try_apply(&form("true")), None);
    }

    #[test]
    fn substitution_replaces_every_occurrence() {
        let rule = rule("(double :x)", "(+ :x :x)");
        assert_eq!(rule.try_apply(&form("(double 3)")), Some(form("(+ 3 3)")));
        assert_eq!(
            rule.try_apply(&form("(double (g b))")),
            Some(form("(+ (g b) (g b))"))
        );
    }

    #[test]
    fn bare_placeholder_replacement_yields_the_bound_form_unwrapped() {
        let rule = rule("(id :x)", ":x");
        assert_eq!(rule.try_apply(&form("(id (f a))")), Some(form("(f a)")));
        assert_eq!(rule.try_apply(&form("(id a)")), Some(form("a")));
    }

    #[test]
    fn replacement_may_not_introduce_fresh_placeholders() {
        let err = Rule::compile(&form("(f :x)"), &form("(g :y)")).unwrap_err();
        match err {
            RuleError::UndefinedPlaceholder { name } => assert_eq!(name, "y"),
            other => panic!("expected an undefined placeholder error, got {:?}", other),
        }
    }

    #[test]
    fn rules_display_as_shorthand() {
        assert_eq!(rule("(double :x)", "(+ :x :x)").to_string(), "(double :x) -> (+ :x :x)");
    }
}
