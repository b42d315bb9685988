//! Static rule registry and concurrent dispatch.

use crate::ast::Program;
use crate::reporter::Reporter;
use crate::rule::{Rule, RuleBox, RuleError};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Registry of rules keyed by name.
#[derive(Default)]
pub struct RuleEngine {
    rules: BTreeMap<&'static str, RuleBox>,
}

/// What happened during one [`RuleEngine::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Rules that were dispatched, in registry order.
    pub rules_run: Vec<&'static str>,
    /// Rules that panicked; their findings are missing from the reporter.
    pub rule_errors: Vec<RuleError>,
}

impl RuleEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, replacing any rule registered under the same name.
    pub fn register(&mut self, rule: RuleBox) {
        let name = rule.name();
        if self.rules.insert(name, rule).is_some() {
            debug!(rule = name, "replaced registered rule");
        }
    }

    /// Builder-style [`RuleEngine::register`].
    #[must_use]
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.register(Box::new(rule));
        self
    }

    /// Registered rule names in sorted order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.keys().copied().collect()
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Rule> {
        self.rules.get(name).map(|rule| &**rule)
    }

    /// Names in `names` that are not registered.
    #[must_use]
    pub fn unknown_rules<'n, S: AsRef<str>>(&self, names: &'n [S]) -> Vec<&'n str> {
        names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| !self.rules.contains_key(*name))
            .collect()
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs the selected rules over `program` concurrently, one task per
    /// rule, and returns once every task has finished.
    ///
    /// Unknown names are skipped. Each rule's findings reach `reporter` as
    /// one batch, so a rule's emission order is preserved while the order
    /// between rules depends on scheduling.
    pub fn run<S: AsRef<str>>(&self, program: &Program, names: &[S], reporter: &Reporter) -> RunOutcome {
        let mut selected: Vec<&dyn Rule> = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.rules.get(name) {
                Some(rule) if !selected.iter().any(|r| r.name() == name) => {
                    selected.push(&**rule);
                }
                Some(_) => {}
                None => debug!(rule = name, "skipping unknown rule"),
            }
        }
        dispatch(program, &selected, reporter)
    }

    /// Runs every registered rule.
    pub fn run_all(&self, program: &Program, reporter: &Reporter) -> RunOutcome {
        let selected: Vec<&dyn Rule> = self.rules.values().map(|rule| &**rule).collect();
        dispatch(program, &selected, reporter)
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rule_names())
            .finish()
    }
}

fn dispatch(program: &Program, rules: &[&dyn Rule], reporter: &Reporter) -> RunOutcome {
    let errors = Mutex::new(Vec::new());

    rayon::scope(|scope| {
        for &rule in rules {
            let errors = &errors;
            scope.spawn(move |_| {
                debug!(rule = rule.name(), file = %program.file.display(), "dispatching rule");
                match panic::catch_unwind(AssertUnwindSafe(|| rule.check(program))) {
                    Ok(findings) => {
                        debug!(rule = rule.name(), findings = findings.len(), "rule finished");
                        reporter.extend(findings);
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(rule = rule.name(), %message, "rule panicked; skipping its findings");
                        errors
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .push(RuleError {
                                rule: rule.name().to_string(),
                                message,
                            });
                    }
                }
            });
        }
    });

    let mut rule_errors = errors
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    rule_errors.sort_by(|a, b| a.rule.cmp(&b.rule));

    RunOutcome {
        rules_run: rules.iter().map(|r| r.name()).collect(),
        rule_errors,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
