//! Compiling template markup, and instantiating compiled templates.

use std::{fmt, rc::Rc};

use ahtml::{Dom, NodeId, to_html_string};

use crate::analyzer::analyze;
use crate::diagnostics::Diagnostics;
use crate::error::TemplateError;
use crate::instance::Instance;
use crate::options::OptionsInput;
use crate::placeholder::Placeholder;
use crate::request_fn::TopLevelFn;
use crate::transport::Transport;

/// What instances talk to: the network, and where warnings go.
#[derive(Clone)]
pub struct Host {
    pub(crate) transport: Rc<dyn Transport>,
    pub(crate) diagnostics: Diagnostics,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl Host {
    /// With a `Diagnostics::new()` sink.
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self::with_diagnostics(transport, Diagnostics::new())
    }

    pub fn with_diagnostics(transport: Rc<dyn Transport>, diagnostics: Diagnostics) -> Self {
        Host { transport, diagnostics }
    }

    pub fn transport(&self) -> &Rc<dyn Transport> {
        &self.transport
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

#[derive(Debug)]
pub(crate) struct CompiledTemplate {
    pub(crate) dom: Dom,
    pub(crate) root: NodeId,
    pub(crate) single_request: bool,
    pub(crate) placeholders: Vec<Placeholder>,
    pub(crate) top: TopLevelFn,
}

/// A compiled template. Immutable; cloning is cheap.
#[derive(Debug, Clone)]
pub struct Template(Rc<CompiledTemplate>);

/// Compile `src`, which must consist of exactly one element: either a
/// `<request>` placeholder itself, or an element containing at least
/// one placeholder.
pub fn compile(src: &str) -> Result<Template, TemplateError> {
    compile_with_diagnostics(src, &Diagnostics::new())
}

pub fn compile_with_diagnostics(
    src: &str,
    diagnostics: &Diagnostics
) -> Result<Template, TemplateError> {
    let analysis = analyze(src, diagnostics)?;
    let top = TopLevelFn::build(&analysis.placeholders, analysis.single_request);
    Ok(Template(Rc::new(CompiledTemplate {
        dom: analysis.dom,
        root: analysis.root,
        single_request: analysis.single_request,
        placeholders: analysis.placeholders,
        top,
    })))
}

impl Template {
    /// Create a live instance, starting its immediate requests and
    /// arming its triggers. Must be called from within a tokio
    /// `LocalSet`. Option and trigger errors are reported here, before
    /// any request is issued.
    pub fn instantiate(
        &self,
        host: &Host,
        options: impl Into<OptionsInput>
    ) -> Result<Instance, TemplateError> {
        Instance::create(&self.0, host, &options.into())
    }

    pub fn is_single_request(&self) -> bool {
        self.0.single_request
    }

    /// In document order.
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.0.placeholders
    }

    /// The canonical template tree.
    pub fn to_html(&self) -> String {
        to_html_string(&self.0.dom, self.0.root)
    }
}
