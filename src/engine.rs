use log::debug;
use thiserror::Error;

use crate::form::Form;
use crate::rule::{Rule, RuleError};

/// Head atom that turns a three-element sequence into a rule definition.
pub const DEFRULE_KEYWORD: &str = "defrule";

/// An error that happens while evaluating a form.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error("gave up after {limit} rewrites, the rule set does not look terminating")]
    RewriteLimit { limit: usize },
}

/// Ordered, append-only collection of rules. Insertion order is
/// declaration order, and declaration order is matching priority; rules
/// are never retracted.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, rule: Rule) {
        self.rules.push(rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

/// One session's evaluation state: the rule set and an optional rewrite
/// budget for runaway rule sets.
pub struct Context {
    rules: RuleSet,
    max_rewrites: Option<usize>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Children of a sequence mid-normalization: `original` as they were when
/// the engine descended, `done` the normalized prefix so far.
struct Frame {
    original: Vec<Form>,
    done: Vec<Form>,
}

impl Frame {
    fn next_child(&self) -> Option<Form> {
        self.original.get(self.done.len()).cloned()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            rules: RuleSet::new(),
            max_rewrites: None,
        }
    }

    /// Caps the number of rule firings per evaluation. Without a cap a
    /// non-terminating rule set loops forever.
    pub fn set_max_rewrites(&mut self, limit: usize) {
        self.max_rewrites = Some(limit);
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The one entry point the shell calls per input form. A rule
    /// definition is compiled, appended, and echoed back with a match
    /// count of 0; anything else is normalized against the rule set.
    pub fn eval(&mut self, form: Form) -> Result<(Form, usize), EvalError> {
        if let Some((pattern, replacement)) = rule_definition_parts(&form)? {
            let rule = Rule::compile(pattern, replacement)?;
            debug!("defined rule {}", rule);
            self.rules.define(rule);
            return Ok((form, 0));
        }
        self.normalize(form)
    }

    /// Rewrites `form` until no rule in the set matches it at any level
    /// and returns the normal form together with the number of rule
    /// firings it took.
    ///
    /// The traversal runs on an explicit frame stack, so deeply nested
    /// input cannot overflow the call stack.
    pub fn normalize(&self, form: Form) -> Result<(Form, usize), EvalError> {
        let mut matches = 0;
        let mut stack: Vec<Frame> = Vec::new();
        let mut current = form;

        'normalize: loop {
            // Fire rules at the root of `current` until none matches.
            // First-declared rule wins; a hit restarts the whole scan on
            // the rewritten form.
            while let Some(next) = self.rewrite_once(&current, &mut matches)? {
                current = next;
            }

            // No rule matches the root. An atom (or an empty sequence)
            // is terminal; otherwise descend into the first child.
            match current {
                Form::Seq(items) if !items.is_empty() => {
                    let first = items[0].clone();
                    stack.push(Frame { original: items, done: Vec::new() });
                    current = first;
                    continue 'normalize;
                }
                terminal => current = terminal,
            }

            // `current` is in normal form. Hand it back up the stack.
            loop {
                match stack.pop() {
                    None => return Ok((current, matches)),
                    Some(mut frame) => {
                        frame.done.push(current);
                        if let Some(next_child) = frame.next_child() {
                            current = next_child;
                            stack.push(frame);
                            continue 'normalize;
                        }
                        let changed = frame.done != frame.original;
                        current = Form::Seq(frame.done);
                        if changed {
                            // A child rewrite may newly satisfy a rule
                            // that looks at the whole parent.
                            continue 'normalize;
                        }
                    }
                }
            }
        }
    }

    fn rewrite_once(&self, form: &Form, matches: &mut usize) -> Result<Option<Form>, EvalError> {
        for rule in self.rules.iter() {
            if let Some(next) = rule.try_apply(form) {
                *matches += 1;
                if let Some(limit) = self.max_rewrites {
                    if *matches > limit {
                        return Err(EvalError::RewriteLimit { limit });
                    }
                }
                debug!("{} => {} via {}", form, next, rule);
                return Ok(Some(next));
            }
        }
        Ok(None)
    }
}

/// A sequence whose head is the `defrule` keyword is a rule definition
/// and is never matched against the rule set. It must have exactly three
/// elements: keyword, pattern, replacement. Recognition applies to the
/// top-level form only; nested `defrule` sequences are plain data.
fn rule_definition_parts(form: &Form) -> Result<Option<(&Form, &Form)>, RuleError> {
    let items = match form {
        Form::Seq(items) => items,
        Form::Atom(_) => return Ok(None),
    };
    match items.first() {
        Some(Form::Atom(head)) if head == DEFRULE_KEYWORD => {}
        _ => return Ok(None),
    }
    if items.len() != 3 {
        return Err(RuleError::WrongShape { given: items.len() });
    }
    Ok(Some((&items[1], &items[2])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(input: &str) -> Form {
        input.parse().unwrap()
    }

    fn session(inputs: &[&str]) -> Context {
        let mut context = Context::new();
        for input in inputs {
            context.eval(form(input)).unwrap();
        }
        context
    }

    #[test]
    fn empty_rule_set_is_the_identity() {
        let mut context = Context::new();
        for input in ["a", "()", "(f a (g b))"] {
            assert_eq!(context.eval(form(input)).unwrap(), (form(input), 0));
        }
    }

    #[test]
    fn rule_definition_echoes_and_appends() {
        let mut context = Context::new();
        let definition = form("(defrule (a) (b))");
        assert_eq!(context.eval(definition.clone()).unwrap(), (definition, 0));
        assert_eq!(context.rules().len(), 1);
    }

    #[test]
    fn malformed_rule_definition_leaves_the_rule_set_alone() {
        let mut context = Context::new();
        for input in ["(defrule)", "(defrule (a))", "(defrule (a) (b) (c))"] {
            match context.eval(form(input)) {
                Err(EvalError::Rule(RuleError::WrongShape { .. })) => {}
                other => panic!("expected a wrong shape error for {}, got {:?}", input, other),
            }
        }
        assert!(context.rules().is_empty());
    }

    #[test]
    fn undefined_placeholder_leaves_the_rule_set_alone() {
        let mut context = Context::new();
        match context.eval(form("(defrule (f :x) (g :y))")) {
            Err(EvalError::Rule(RuleError::UndefinedPlaceholder { name })) => {
                assert_eq!(name, "y")
            }
            other => panic!("expected an undefined placeholder error, got {:?}", other),
        }
        assert!(context.rules().is_empty());
    }

    #[test]
    fn rule_definitions_are_only_recognized_at_top_level() {
        let mut context = Context::new();
        let nested = form("(quote (defrule (a) (b)))");
        assert_eq!(context.eval(nested.clone()).unwrap(), (nested, 0));
        assert!(context.rules().is_empty());
    }

    #[test]
    fn first_declared_rule_wins() {
        let mut context = session(&[
            "(defrule (f :x) first)",
            "(defrule (f :x) second)",
        ]);
        assert_eq!(context.eval(form("(f a)")).unwrap(), (form("first"), 1));
    }

    #[test]
    fn nested_rewrites_count_every_firing() {
        let mut context = session(&[
            "(defrule (not true) false)",
            "(defrule (not false) true)",
        ]);
        assert_eq!(context.eval(form("(not (not true))")).unwrap(), (form("true"), 2));
    }

    #[test]
    fn a_child_rewrite_can_reenable_a_parent_rule() {
        let mut context = session(&[
            "(defrule (b) c)",
            "(defrule (a c) done)",
        ]);
        assert_eq!(context.eval(form("(a (b))")).unwrap(), (form("done"), 2));
    }

    #[test]
    fn a_normal_form_is_a_fixpoint() {
        let mut context = session(&[
            "(defrule (double :x) (+ :x :x))",
            "(defrule (not true) false)",
        ]);
        let (normal, matches) = context.eval(form("(double (not true))")).unwrap();
        assert!(matches > 0);
        assert_eq!(context.eval(normal.clone()).unwrap(), (normal, 0));
    }

    #[test]
    fn the_rewrite_budget_stops_runaway_rule_sets() {
        let mut context = session(&["(defrule (loop) (loop))"]);
        context.set_max_rewrites(10);
        match context.eval(form("(loop)")) {
            Err(EvalError::RewriteLimit { limit }) => assert_eq!(limit, 10),
            other => panic!("expected to run out of the rewrite budget, got {:?}", other),
        }
    }

    #[test]
    fn deep_nesting_unwinds_without_recursing() {
        let depth = 2_000;
        let mut context = session(&["(defrule (wrap :x) :x)"]);
        let mut input = Form::atom("a");
        for _ in 0..depth {
            input = Form::seq(vec![Form::atom("wrap"), input]);
        }
        assert_eq!(context.eval(input).unwrap(), (form("a"), depth));
    }
}
