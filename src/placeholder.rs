//! The `<request>` placeholder element and its attributes.

use std::fmt::{self, Display};

use ahtml::{Element, Selector};
use kstring::KString;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::http_request_method::HttpRequestMethod;

pub const PLACEHOLDER_TAG: &str = "request";

pub const SOURCE_ATTR: &str = "src";
pub const METHOD_ATTR: &str = "method";
pub const REF_ATTR: &str = "ref";
pub const AFTER_ATTR: &str = "after";
pub const MODE_ATTR: &str = "mode";

const KNOWN_ATTRS: &[&str] = &[SOURCE_ATTR, METHOD_ATTR, REF_ATTR, AFTER_ATTR, MODE_ATTR];

/// Index of an element in the pre-order walk over all elements below
/// the template root (see `analyzer::placeholder_elements`). Identical
/// for the template and every clone of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionalId(pub u32);

impl Display for PositionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fire on the first matching event only.
    One,
    /// Fire on every matching event, replacing the previous output.
    All,
}

impl Mode {
    pub fn from_str(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("one") {
            Some(Mode::One)
        } else if s.eq_ignore_ascii_case("all") {
            Some(Mode::All)
        } else {
            None
        }
    }
}

/// The parsed `after="event:selector"` attribute.
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub event: KString,
    pub selector: Selector,
    /// The selector as written.
    pub selector_src: KString,
}

#[derive(Debug, Clone)]
pub struct Placeholder {
    pub position: PositionalId,
    pub source: KString,
    pub method: HttpRequestMethod,
    pub ref_id: Option<KString>,
    pub trigger: Option<TriggerSpec>,
    /// Only meaningful with `trigger`.
    pub mode: Mode,
}

fn kstr(s: &str) -> KString {
    KString::from_ref(s)
}

/// Split at the first colon; later colons belong to the selector.
fn split_trigger(value: &str) -> Option<(&str, &str)> {
    match value.find(':') {
        Some(i) if i > 0 => Some((&value[..i], &value[i + 1..])),
        _ => None
    }
}

impl Placeholder {
    /// Validate the attributes of placeholder element `e`.
    /// `single_request` says whether `e` is the template root.
    pub fn from_element(
        e: &Element,
        position: PositionalId,
        single_request: bool,
        diagnostics: &Diagnostics
    ) -> Result<Placeholder, TemplateError> {
        for (name, _) in e.attrs() {
            if ! KNOWN_ATTRS.contains(&name.as_str()) {
                diagnostics.push(Diagnostic::UnknownAttribute {
                    tag: kstr(e.tag()),
                    attribute: name.clone()
                });
            }
        }

        let source = match e.get_attribute(SOURCE_ATTR) {
            Some(s) if ! s.is_empty() => kstr(s),
            _ => Err(TemplateErrorKind::MissingSource { position })?
        };
        let method = match e.get_attribute(METHOD_ATTR) {
            None => HttpRequestMethod::GET,
            Some(m) => HttpRequestMethod::from_str(m).map_err(
                |_| TemplateErrorKind::InvalidMethod { position, value: kstr(m) })?
        };
        // An empty "after" counts as absent
        let after = e.get_attribute(AFTER_ATTR).filter(|s| ! s.is_empty());
        if after.is_some() && single_request {
            Err(TemplateErrorKind::TriggerOnSingleRequest)?
        }
        let mode_attr = e.get_attribute(MODE_ATTR);
        let mode = match mode_attr {
            None => Mode::All,
            Some(m) => Mode::from_str(m).ok_or_else(
                || TemplateErrorKind::InvalidMode { position, value: kstr(m) })?
        };
        let trigger = match after {
            Some(value) => {
                let (event, selector_src) = split_trigger(value)
                    .filter(|(_, sel)| ! sel.trim().is_empty())
                    .ok_or_else(|| TemplateErrorKind::MalformedTrigger {
                        position,
                        value: kstr(value)
                    })?;
                let selector = Selector::parse(selector_src).map_err(
                    |e| TemplateErrorKind::InvalidSelector {
                        position,
                        selector: kstr(selector_src),
                        message: e.to_string()
                    })?;
                Some(TriggerSpec {
                    event: kstr(event),
                    selector,
                    selector_src: kstr(selector_src)
                })
            }
            None => {
                if mode_attr.is_some() {
                    Err(TemplateErrorKind::ModeWithoutTrigger { position })?
                }
                None
            }
        };
        let ref_id = e.get_attribute(REF_ATTR).map(kstr);

        Ok(Placeholder { position, source, method, ref_id, trigger, mode })
    }

    pub fn is_deferred(&self) -> bool {
        self.trigger.is_some()
    }

    /// Whether repeated firing replaces its own previous output.
    pub fn is_tracked(&self) -> bool {
        self.trigger.is_some() && self.mode == Mode::All
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use ahtml::Dom;

    fn ph(attrs: &[(&str, &str)], single: bool) -> Result<Placeholder, TemplateError> {
        let mut dom = Dom::new();
        let id = dom.new_element("request", attrs.iter().copied());
        let e = dom.element(id).unwrap().clone();
        Placeholder::from_element(&e, PositionalId(3), single, &Diagnostics::silent())
    }

    fn kind(r: Result<Placeholder, TemplateError>) -> TemplateErrorKind {
        r.unwrap_err().into_kind()
    }

    #[test]
    fn t_defaults() -> Result<(), TemplateError> {
        let p = ph(&[("src", "/x")], false)?;
        assert_eq!(p.method, HttpRequestMethod::GET);
        assert_eq!(p.mode, Mode::All);
        assert!(p.trigger.is_none() && p.ref_id.is_none());
        assert!(! p.is_tracked());
        Ok(())
    }

    #[test]
    fn t_trigger_keeps_later_colons() -> Result<(), TemplateError> {
        let p = ph(&[("src", "/x"), ("after", "click:a[href='x:y']"), ("mode", "one"),
                     ("method", "post"), ("ref", "r")], false)?;
        let t = p.trigger.as_ref().unwrap();
        assert_eq!(t.event.as_str(), "click");
        assert_eq!(t.selector_src.as_str(), "a[href='x:y']");
        assert_eq!(p.mode, Mode::One);
        assert_eq!(p.method, HttpRequestMethod::POST);
        assert_eq!(p.ref_id.as_deref(), Some("r"));
        Ok(())
    }

    #[test]
    fn t_trigger_selector_with_pseudo_classes() -> Result<(), TemplateError> {
        let p = ph(&[("src", "/x"), ("after", "click:li:first-child")], false)?;
        let t = p.trigger.as_ref().unwrap();
        assert_eq!(t.event.as_str(), "click");
        assert_eq!(t.selector_src.as_str(), "li:first-child");
        assert_eq!(t.selector.to_string(), "li:first-child");
        let p = ph(&[("src", "/x"), ("after", "input:ul > li:nth-child(2n) + li")], false)?;
        assert_eq!(p.trigger.unwrap().selector.to_string(), "ul > li:nth-child(2n) + li");
        Ok(())
    }

    #[test]
    fn t_validation_errors() {
        use TemplateErrorKind::*;
        assert!(matches!(kind(ph(&[], false)), MissingSource { position: PositionalId(3) }));
        assert!(matches!(kind(ph(&[("src", "")], false)), MissingSource { .. }));
        assert!(matches!(kind(ph(&[("src", "/x"), ("method", "head")], false)),
                         InvalidMethod { .. }));
        assert!(matches!(kind(ph(&[("src", "/x"), ("after", "click:p")], true)),
                         TriggerOnSingleRequest));
        assert!(matches!(kind(ph(&[("src", "/x"), ("after", "click:p"), ("mode", "some")], false)),
                         InvalidMode { .. }));
        assert!(matches!(kind(ph(&[("src", "/x"), ("mode", "one")], false)),
                         ModeWithoutTrigger { .. }));
        assert!(matches!(kind(ph(&[("src", "/x"), ("after", "click")], false)),
                         MalformedTrigger { .. }));
        assert!(matches!(kind(ph(&[("src", "/x"), ("after", ":p")], false)),
                         MalformedTrigger { .. }));
        assert!(matches!(kind(ph(&[("src", "/x"), ("after", "click: ")], false)),
                         MalformedTrigger { .. }));
        assert!(matches!(kind(ph(&[("src", "/x"), ("after", "click:p:hover")], false)),
                         InvalidSelector { .. }));
    }

    #[test]
    fn t_unknown_attribute() -> Result<(), TemplateError> {
        let mut dom = Dom::new();
        let id = dom.new_element("request", [("src", "/x"), ("srcc", "/y")]);
        let d = Diagnostics::silent();
        Placeholder::from_element(dom.element(id).unwrap(), PositionalId(0), false, &d)?;
        assert_eq!(d.entries(), vec![Diagnostic::UnknownAttribute {
            tag: "request".into(),
            attribute: "srcc".into()
        }]);
        Ok(())
    }
}
