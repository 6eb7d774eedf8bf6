//! HTML templates with placeholder regions whose content is fetched
//! from the network, either when an instance is created or when a
//! matching event fires.

pub mod error;
pub mod diagnostics;
pub mod http_request_method;
pub mod signal;
pub mod options;
pub mod placeholder;
pub mod resolver;
pub mod analyzer;
pub mod transport;
pub mod instance;
pub mod template;
pub(crate) mod engine;
pub(crate) mod request_fn;

pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{RequestError, TemplateError, TemplateErrorKind};
pub use http_request_method::HttpRequestMethod;
pub use instance::{Instance, InstanceId, Request, RequestHandle};
pub use options::{IdentifiedOptions, Notification, Observer, OptionsInput, RequestOptions,
                  ResponseValue};
pub use placeholder::{Mode, Placeholder, PositionalId};
pub use signal::{AbortReason, AbortSignal};
pub use template::{compile, compile_with_diagnostics, Host, Template};
pub use transport::{StubTransport, Transport, TransportRequest, TransportResponse};
#[cfg(feature = "reqwest-transport")]
pub use transport::ReqwestTransport;

pub use ahtml::{Dom, NodeId};
