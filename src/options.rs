//! Caller-supplied request configuration: fetch-style transport
//! knobs plus an observer callback, either one record for all
//! placeholders or a list of records selected by placeholder `ref`.

use std::{collections::HashSet, fmt, rc::Rc, time::Duration};

use ahtml::NodeId;
use kstring::KString;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::instance::Request;
use crate::signal::AbortSignal;

/// What changed, as passed to the observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    /// Single request templates: the parsed response, a parentless
    /// fragment node.
    Fragment(NodeId),
    /// The nodes inserted for one placeholder.
    Nodes(Vec<NodeId>),
    /// Sent after each placeholder's nodes were inserted.
    Root(NodeId),
}

#[derive(Debug, Clone)]
pub enum Notification {
    Status { status: u16, request: Option<Request> },
    Response { value: ResponseValue, request: Option<Request> },
}

pub type Observer = Rc<dyn Fn(&Notification)>;

#[derive(Clone, Default)]
pub struct RequestOptions {
    pub credentials: Option<KString>,
    pub body: Option<String>,
    pub mode: Option<KString>,
    pub cache: Option<KString>,
    pub redirect: Option<KString>,
    pub referrer_policy: Option<KString>,
    pub integrity: Option<KString>,
    pub referrer: Option<KString>,
    pub window: Option<KString>,
    pub headers: Vec<(KString, KString)>,
    pub signal: Option<AbortSignal>,
    pub timeout: Option<Duration>,
    /// Not supported, only produces a diagnostic when set.
    pub keepalive: Option<bool>,
    pub observer: Option<Observer>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("credentials", &self.credentials)
            .field("body", &self.body)
            .field("mode", &self.mode)
            .field("cache", &self.cache)
            .field("redirect", &self.redirect)
            .field("referrer_policy", &self.referrer_policy)
            .field("integrity", &self.integrity)
            .field("referrer", &self.referrer)
            .field("window", &self.window)
            .field("headers", &self.headers)
            .field("signal", &self.signal)
            .field("timeout", &self.timeout)
            .field("keepalive", &self.keepalive)
            .field("observer", &self.observer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((KString::from_ref(name), KString::from_ref(value)));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn observer(mut self, f: impl Fn(&Notification) + 'static) -> Self {
        self.observer = Some(Rc::new(f));
        self
    }
}

/// A record in the list form of the options, applying to the
/// placeholders with `ref` equal to `id`.
#[derive(Debug, Clone)]
pub struct IdentifiedOptions {
    pub id: KString,
    pub options: RequestOptions,
}

impl IdentifiedOptions {
    pub fn new(id: &str, options: RequestOptions) -> Self {
        IdentifiedOptions { id: KString::from_ref(id), options }
    }
}

#[derive(Debug, Clone)]
pub enum OptionsInput {
    Single(RequestOptions),
    ById(Vec<IdentifiedOptions>),
}

impl Default for OptionsInput {
    fn default() -> Self {
        OptionsInput::Single(RequestOptions::default())
    }
}

impl From<RequestOptions> for OptionsInput {
    fn from(o: RequestOptions) -> Self {
        OptionsInput::Single(o)
    }
}

impl From<Vec<IdentifiedOptions>> for OptionsInput {
    fn from(v: Vec<IdentifiedOptions>) -> Self {
        OptionsInput::ById(v)
    }
}

/// The typed part of a JSON options record; `headers`, `get` and
/// unknown keys are dealt with separately.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct JsonOptions {
    credentials: Option<String>,
    body: Option<String>,
    mode: Option<String>,
    cache: Option<String>,
    redirect: Option<String>,
    referrer_policy: Option<String>,
    integrity: Option<String>,
    referrer: Option<String>,
    window: Option<String>,
    /// Milliseconds.
    timeout: Option<u64>,
    keepalive: Option<bool>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

fn invalid(msg: String) -> TemplateError {
    TemplateErrorKind::InvalidOptions(msg).into()
}

fn err<T>(kind: TemplateErrorKind) -> Result<T, TemplateError> {
    Err(kind.into())
}

fn record_from_json(
    record: &Map<String, Value>,
    diagnostics: &Diagnostics
) -> Result<RequestOptions, TemplateError> {
    if record.contains_key("get") {
        // Functions can't be represented in JSON data
        return err(TemplateErrorKind::InvalidObserverCallback)
    }
    let mut record = record.clone();
    let mut headers = Vec::new();
    match record.remove("headers") {
        None | Some(Value::Null) => (),
        Some(Value::Object(map)) => {
            for (name, value) in map {
                match value {
                    Value::String(s) =>
                        headers.push((KString::from_string(name), KString::from_string(s))),
                    _ => return err(TemplateErrorKind::InvalidHeaderValue {
                        name: KString::from_string(name)
                    })
                }
            }
        }
        Some(_) => return Err(invalid("the \"headers\" property must be an object".into()))
    }
    let typed: JsonOptions = serde_json::from_value(Value::Object(record))
        .map_err(|e| invalid(e.to_string()))?;
    for key in typed.rest.keys() {
        diagnostics.push(Diagnostic::UnsupportedOption(KString::from_ref(key)));
    }
    let k = |s: Option<String>| s.map(KString::from_string);
    Ok(RequestOptions {
        credentials: k(typed.credentials),
        body: typed.body,
        mode: k(typed.mode),
        cache: k(typed.cache),
        redirect: k(typed.redirect),
        referrer_policy: k(typed.referrer_policy),
        integrity: k(typed.integrity),
        referrer: k(typed.referrer),
        window: k(typed.window),
        headers,
        signal: None,
        timeout: typed.timeout.map(Duration::from_millis),
        keepalive: typed.keepalive,
        observer: None,
    })
}

impl OptionsInput {
    /// Options from JSON data: an object is one record for all
    /// placeholders, an array holds `{"id": .., "options": {..}}`
    /// entries, null means no options. Unknown keys are reported to
    /// `diagnostics` and otherwise ignored.
    pub fn from_json(value: &Value, diagnostics: &Diagnostics) -> Result<Self, TemplateError> {
        match value {
            Value::Null => Ok(OptionsInput::default()),
            Value::Object(record) =>
                Ok(OptionsInput::Single(record_from_json(record, diagnostics)?)),
            Value::Array(entries) => {
                let mut seen = HashSet::new();
                let mut out = Vec::with_capacity(entries.len());
                for (i, entry) in entries.iter().enumerate() {
                    let entry = entry.as_object().ok_or_else(
                        || invalid(format!("options entry {i} is not an object")))?;
                    if entry.contains_key("get") {
                        return err(TemplateErrorKind::InvalidObserverCallback)
                    }
                    let id = match entry.get("id") {
                        Some(Value::String(s)) => KString::from_ref(s),
                        _ => return Err(invalid(format!(
                            "options entry {i}: \"id\" must be a string")))
                    };
                    if ! seen.insert(id.clone()) {
                        return err(TemplateErrorKind::DuplicateOptionsId { id })
                    }
                    let options = match entry.get("options") {
                        None | Some(Value::Null) => RequestOptions::default(),
                        Some(Value::Object(record)) => record_from_json(record, diagnostics)?,
                        Some(_) => return Err(invalid(format!(
                            "options entry {i}: \"options\" must be an object")))
                    };
                    out.push(IdentifiedOptions { id, options });
                }
                Ok(OptionsInput::ById(out))
            }
            _ => Err(invalid("options must be an object, an array or null".into()))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kind(r: Result<OptionsInput, TemplateError>) -> TemplateErrorKind {
        r.unwrap_err().into_kind()
    }

    #[test]
    fn t_from_json_single() -> Result<(), TemplateError> {
        let d = Diagnostics::silent();
        let o = OptionsInput::from_json(&json!({
            "referrerPolicy": "no-referrer",
            "timeout": 1500,
            "headers": { "X-A": "1" },
            "keepalive": true,
            "priority": "high"
        }), &d)?;
        match o {
            OptionsInput::Single(o) => {
                assert_eq!(o.referrer_policy.as_deref(), Some("no-referrer"));
                assert_eq!(o.timeout, Some(Duration::from_millis(1500)));
                assert_eq!(o.headers, vec![(KString::from_static("X-A"), KString::from_static("1"))]);
                assert_eq!(o.keepalive, Some(true));
            }
            _ => panic!()
        }
        assert_eq!(d.entries(), vec![Diagnostic::UnsupportedOption("priority".into())]);
        Ok(())
    }

    #[test]
    fn t_from_json_errors() {
        let d = Diagnostics::silent();
        assert!(matches!(kind(OptionsInput::from_json(&json!({"get": "f"}), &d)),
                         TemplateErrorKind::InvalidObserverCallback));
        assert!(matches!(kind(OptionsInput::from_json(&json!({"headers": {"a": 1}}), &d)),
                         TemplateErrorKind::InvalidHeaderValue { .. }));
        assert!(matches!(kind(OptionsInput::from_json(&json!({"headers": "a"}), &d)),
                         TemplateErrorKind::InvalidOptions(_)));
        assert!(matches!(kind(OptionsInput::from_json(&json!({"timeout": "soon"}), &d)),
                         TemplateErrorKind::InvalidOptions(_)));
        assert!(matches!(kind(OptionsInput::from_json(&json!(5), &d)),
                         TemplateErrorKind::InvalidOptions(_)));
        assert!(matches!(kind(OptionsInput::from_json(&json!([{"id": 1}]), &d)),
                         TemplateErrorKind::InvalidOptions(_)));
        assert!(matches!(kind(OptionsInput::from_json(&json!([3]), &d)),
                         TemplateErrorKind::InvalidOptions(_)));
        assert!(matches!(
            kind(OptionsInput::from_json(
                &json!([{"id": "a"}, {"id": "b"}, {"id": "a"}]), &d)),
            TemplateErrorKind::DuplicateOptionsId { id } if id.as_str() == "a"));
    }

    #[test]
    fn t_from_json_list() -> Result<(), TemplateError> {
        let d = Diagnostics::silent();
        let o = OptionsInput::from_json(&json!([
            {"id": "a", "options": {"body": "x=1"}},
            {"id": "b"}
        ]), &d)?;
        match o {
            OptionsInput::ById(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v[0].id.as_str(), "a");
                assert_eq!(v[0].options.body.as_deref(), Some("x=1"));
                assert!(v[1].options.body.is_none());
            }
            _ => panic!()
        }
        Ok(())
    }
}
