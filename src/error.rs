//! Error types: `TemplateError` for everything that fails
//! synchronously (compiling, instantiating, dispatching events),
//! `RequestError` for the outcome of a request running in the
//! background.

use kstring::KString;

use crate::placeholder::PositionalId;

/// Define an error type wrapper e.g. `Foo` around a `Box<FooKind>`,
/// keeping `Result<T, Foo>` one word wide. `Deref` gives access to
/// the kind, and `From` is forwarded so `#[from]` on the kind's
/// variants works for `?` on the wrapper.
#[macro_export]
macro_rules! def_boxed_error {
    ($wrappername:ident, $kindname:ident) => {

        #[derive(Debug)]
        pub struct $wrappername(Box<$kindname>);

        impl $wrappername {
            pub fn kind(&self) -> &$kindname {
                &self.0
            }

            pub fn into_kind(self) -> $kindname {
                *self.0
            }
        }

        impl std::ops::Deref for $wrappername {
            type Target = $kindname;

            fn deref(&self) -> &Self::Target {
                &*self.0
            }
        }

        impl<E> From<E> for $wrappername where $kindname: From<E> {
            fn from(err: E) -> Self {
                $wrappername(Box::new($kindname::from(err)))
            }
        }

        impl std::error::Error for $wrappername {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                std::error::Error::source(&*self.0)
            }
        }

        impl std::fmt::Display for $wrappername {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&*self.0, f)
            }
        }
    }
}

/// `def_boxed_error` plus the kind enum itself, deriving
/// `thiserror::Error` on it.
#[macro_export]
macro_rules! def_boxed_thiserror {
    ($wrappername:ident, pub enum $kindname:ident {$($body:tt)*}) => {
        #[derive(thiserror::Error, Debug)]
        pub enum $kindname {
            $($body)*
        }

        $crate::def_boxed_error!($wrappername, $kindname);
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TemplateErrorKind {
    #[error("template string is empty")]
    EmptyTemplate,
    #[error("template must have exactly one top-level element, found {count}")]
    MultipleRootElements { count: usize },
    #[error("template has no top-level element")]
    ElementUndefined,
    #[error("no <request> placeholder found in the template")]
    PlaceholderNotFound,
    #[error("placeholder at position {position} contains another placeholder")]
    NestedPlaceholder { position: PositionalId },
    #[error("placeholder at position {position}: the \"src\" attribute is missing or empty")]
    MissingSource { position: PositionalId },
    #[error("placeholder at position {position}: method \"{value}\" is not one of \
             GET, POST, PUT, PATCH or DELETE")]
    InvalidMethod { position: PositionalId, value: KString },
    #[error("placeholder at position {position}: mode \"{value}\" is not ONE or ALL")]
    InvalidMode { position: PositionalId, value: KString },
    #[error("placeholder at position {position}: the \"mode\" attribute requires \"after\"")]
    ModeWithoutTrigger { position: PositionalId },
    #[error("the \"after\" attribute can't be used on a single request template, \
             there is no event target")]
    TriggerOnSingleRequest,
    #[error("placeholder at position {position}: \"after\" value \"{value}\" is not \
             of the form event:selector")]
    MalformedTrigger { position: PositionalId, value: KString },
    #[error("placeholder at position {position}: invalid selector \"{selector}\": {message}")]
    InvalidSelector { position: PositionalId, selector: KString, message: String },
    #[error("options ids are not applicable: {0}")]
    IdNotApplicable(&'static str),
    #[error("options id \"{id}\" referenced by the placeholder at position {position} not found")]
    OptionsIdNotFound { position: PositionalId, id: KString },
    #[error("options id \"{id}\" is given more than once")]
    DuplicateOptionsId { id: KString },
    #[error("the \"get\" observer option must be a function")]
    InvalidObserverCallback,
    #[error("header \"{name}\" does not have a valid string value")]
    InvalidHeaderValue { name: KString },
    #[error("invalid header name \"{name}\"")]
    InvalidHeaderName { name: KString },
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("placeholder at position {position}: trigger selector \"{selector}\" \
             matches no elements")]
    NoMatchingTriggerElements { position: PositionalId, selector: KString },
    #[error("placeholder at position {position} is missing from the instance tree")]
    ElementError { position: PositionalId },
    #[error(transparent)]
    Tree(#[from] anyhow::Error),
}

def_boxed_error!(TemplateError, TemplateErrorKind);

/// Why a request started in the background did not complete. The
/// request's status still shows the last status seen (0 if no
/// response arrived).
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("request error with code {status}")]
    RequestFailed { status: u16 },
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("request was aborted")]
    Aborted,
    #[error("request timed out")]
    TimedOut,
    #[error("inserting the response: {0}")]
    Tree(#[source] anyhow::Error),
    #[error("request task failed: {0}")]
    Join(String),
}

impl RequestError {
    /// The HTTP status, for failures that got as far as a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::RequestFailed { status } => Some(*status),
            _ => None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn fails_with_tree_error() -> Result<(), TemplateError> {
        let r: anyhow::Result<()> = Err(anyhow!("node vanished"));
        r?;
        Ok(())
    }

    #[test]
    fn t_boxed_error() {
        let e = TemplateError::from(TemplateErrorKind::DuplicateOptionsId { id: "a".into() });
        assert!(matches!(e.kind(), TemplateErrorKind::DuplicateOptionsId { id } if id.as_str() == "a"));
        assert_eq!(e.to_string(), "options id \"a\" is given more than once");
        let e = TemplateError::from(TemplateErrorKind::InvalidSelector {
            position: PositionalId(3),
            selector: KString::from_string("li:first".to_string()),
            message: "bad".into()
        });
        assert_eq!(e.to_string(),
                   "placeholder at position 3: invalid selector \"li:first\": bad");
        assert_eq!(std::mem::size_of::<TemplateError>(), std::mem::size_of::<usize>());

        let e = fails_with_tree_error().unwrap_err();
        assert!(matches!(&*e, TemplateErrorKind::Tree(_)));
        assert_eq!(e.to_string(), "node vanished");
    }

    #[test]
    fn t_request_error_status() {
        assert_eq!(RequestError::RequestFailed { status: 404 }.status(), Some(404));
        assert_eq!(RequestError::Aborted.status(), None);
        assert_eq!(RequestError::RequestFailed { status: 500 }.to_string(),
                   "request error with code 500");
    }
}
