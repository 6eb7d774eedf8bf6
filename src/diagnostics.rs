//! Warnings that don't change control flow: overridden or unsupported
//! options, unknown placeholder attributes, dropped triggers. They
//! are collected in a `Diagnostics` sink instead of being printed,
//! optionally echoed to stderr.

use std::{cell::RefCell, fmt::{self, Display}, rc::Rc};

use chj_util::env::env_truthy;
use kstring::KString;

use crate::placeholder::PositionalId;

/// Environment variable enabling echoing of all diagnostics to stderr.
pub const WARN_ENV_VAR: &str = "APARTIAL_WARN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Both `signal` and `timeout` were given; the signal is used.
    SignalOverridesTimeout,
    /// The option is accepted but has no effect.
    UnsupportedOption(KString),
    UnknownAttribute { tag: KString, attribute: KString },
    /// A trigger fired while the placeholder's previous request was
    /// still running, and was ignored.
    TriggerDroppedInFlight { position: PositionalId },
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SignalOverridesTimeout =>
                f.write_str("the signal option overrides the signal derived from timeout"),
            Diagnostic::UnsupportedOption(name) =>
                write!(f, "the {name} option is not yet supported"),
            Diagnostic::UnknownAttribute { tag, attribute } =>
                write!(f, "unknown attribute {attribute} on <{tag}>"),
            Diagnostic::TriggerDroppedInFlight { position } =>
                write!(f, "placeholder at position {position}: trigger ignored, \
                           previous request still in flight"),
        }
    }
}

#[derive(Debug)]
struct DiagnosticsInner {
    echo: bool,
    entries: RefCell<Vec<Diagnostic>>,
}

/// Shared sink; clones push to the same list.
#[derive(Debug, Clone)]
pub struct Diagnostics(Rc<DiagnosticsInner>);

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Echoes to stderr if `APARTIAL_WARN` is truthy.
    pub fn new() -> Self {
        Self::with_echo(env_truthy(WARN_ENV_VAR))
    }

    /// Always echoes to stderr.
    pub fn echoing() -> Self {
        Self::with_echo(true)
    }

    pub fn silent() -> Self {
        Self::with_echo(false)
    }

    fn with_echo(echo: bool) -> Self {
        Diagnostics(Rc::new(DiagnosticsInner {
            echo,
            entries: RefCell::new(Vec::new())
        }))
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        if self.0.echo {
            chj_util::warn!("{}", diagnostic);
        }
        self.0.entries.borrow_mut().push(diagnostic);
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.0.entries.borrow().clone()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.0.entries.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.0.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_shared_between_clones() {
        let d = Diagnostics::silent();
        let d2 = d.clone();
        d2.push(Diagnostic::SignalOverridesTimeout);
        d.push(Diagnostic::UnsupportedOption("keepalive".into()));
        assert_eq!(d.len(), 2);
        assert_eq!(d.entries()[1].to_string(), "the keepalive option is not yet supported");
        assert_eq!(d2.take().len(), 2);
        assert!(d.is_empty());
    }
}
