//! Request functions: what to do for each placeholder when a template
//! is instantiated. Built once per template; each invocation is split
//! into `prepare` (all lookups and checks) and `commit` (starting
//! requests, arming triggers), so a failing placeholder aborts the
//! instantiation before any request was issued.

use std::{cell::RefCell, rc::Rc};

use ahtml::{NodeId, Subscription};
use kstring::KString;

use crate::diagnostics::Diagnostic;
use crate::engine::{execute, Execution, Target};
use crate::error::{TemplateError, TemplateErrorKind};
use crate::instance::{Live, Request};
use crate::options::OptionsInput;
use crate::placeholder::{Mode, Placeholder, TriggerSpec};
use crate::resolver::resolve;

#[derive(Debug, Clone)]
pub(crate) enum RequestFn {
    /// Fires as soon as the instance is created.
    Immediate {
        placeholder: Placeholder,
        /// The placeholder is the template root.
        single_request: bool,
    },
    /// Fires on events matching the trigger.
    Deferred {
        placeholder: Placeholder,
        trigger: TriggerSpec,
        mode: Mode,
    },
}

/// The arguments of one invocation.
pub(crate) struct RequestCall<'c> {
    pub(crate) live: &'c Rc<Live>,
    pub(crate) options: &'c OptionsInput,
    pub(crate) request: Option<Request>,
    /// The placeholder's live element if the caller already knows it.
    pub(crate) element: Option<NodeId>,
}

pub(crate) enum Prepared {
    Fire(Execution),
    Arm {
        listener: Listener,
        event: KString,
        nodes: Vec<NodeId>,
    },
}

/// An armed deferred placeholder, as registered for each element
/// matching its trigger selector.
#[derive(Debug)]
pub(crate) struct Armed {
    execution: Execution,
    mode: Mode,
    subscriptions: RefCell<Vec<Subscription>>,
}

pub(crate) type Listener = Rc<Armed>;

impl RequestFn {
    pub(crate) fn build(placeholder: &Placeholder, single_request: bool) -> RequestFn {
        match &placeholder.trigger {
            None => RequestFn::Immediate {
                placeholder: placeholder.clone(),
                single_request
            },
            Some(trigger) => RequestFn::Deferred {
                placeholder: placeholder.clone(),
                trigger: trigger.clone(),
                mode: placeholder.mode
            }
        }
    }

    pub(crate) fn placeholder(&self) -> &Placeholder {
        match self {
            RequestFn::Immediate { placeholder, .. } => placeholder,
            RequestFn::Deferred { placeholder, .. } => placeholder,
        }
    }

    fn target(&self, call: &RequestCall) -> Result<Target, TemplateError> {
        if let RequestFn::Immediate { single_request: true, .. } = self {
            return Ok(Target::Root)
        }
        let position = self.placeholder().position;
        let id = call.element
            .or_else(|| call.live.elements.get(&position).copied())
            .ok_or(TemplateErrorKind::ElementError { position })?;
        Ok(Target::Node(id))
    }

    pub(crate) fn prepare(&self, call: RequestCall) -> Result<Prepared, TemplateError> {
        let placeholder = self.placeholder();
        let options = resolve(call.options, placeholder)?;
        let target = self.target(&call)?;
        let execution = Execution {
            position: placeholder.position,
            target,
            method: placeholder.method,
            source: placeholder.source.clone(),
            tracked: placeholder.is_tracked(),
            options,
            request: call.request,
        };
        match self {
            RequestFn::Immediate { .. } => Ok(Prepared::Fire(execution)),
            RequestFn::Deferred { trigger, mode, .. } => {
                let nodes = {
                    let dom = call.live.dom.borrow();
                    dom.query_selector_all(call.live.root, &trigger.selector)
                };
                if nodes.is_empty() {
                    Err(TemplateErrorKind::NoMatchingTriggerElements {
                        position: placeholder.position,
                        selector: trigger.selector_src.clone()
                    })?
                }
                Ok(Prepared::Arm {
                    listener: Rc::new(Armed {
                        execution,
                        mode: *mode,
                        subscriptions: RefCell::new(Vec::new())
                    }),
                    event: trigger.event.clone(),
                    nodes
                })
            }
        }
    }
}

impl Prepared {
    pub(crate) fn commit(self, live: &Rc<Live>) -> Result<(), TemplateError> {
        match self {
            Prepared::Fire(execution) => {
                let handle = execute(live, execution)?;
                live.pending.borrow_mut().insert(handle.position(), handle);
            }
            Prepared::Arm { listener, event, nodes } => {
                let mut events = live.events.borrow_mut();
                let subscriptions = nodes.iter().map(
                    |node| events.subscribe(*node, &event, listener.clone())).collect();
                *listener.subscriptions.borrow_mut() = subscriptions;
            }
        }
        Ok(())
    }
}

impl Armed {
    /// Run the request for a matching event. Returns false if the
    /// trigger was dropped because the previous request is still
    /// running.
    pub(crate) fn fire(&self, live: &Rc<Live>) -> Result<bool, TemplateError> {
        if let Some(request) = &self.execution.request {
            if request.is_in_flight() {
                live.host.diagnostics.push(Diagnostic::TriggerDroppedInFlight {
                    position: self.execution.position
                });
                return Ok(false)
            }
        }
        let handle = execute(live, self.execution.clone())?;
        live.pending.borrow_mut().insert(handle.position(), handle);
        if self.mode == Mode::One {
            let mut events = live.events.borrow_mut();
            for subscription in self.subscriptions.borrow_mut().drain(..) {
                events.cancel(subscription);
            }
        }
        Ok(true)
    }
}

/// The function run per instantiation, invoking the request
/// functions of all placeholders.
#[derive(Debug, Clone)]
pub(crate) enum TopLevelFn {
    /// The template root is the placeholder.
    Single(RequestFn),
    /// One request record per placeholder, in document order.
    Aggregate(Vec<RequestFn>),
}

impl TopLevelFn {
    pub(crate) fn build(placeholders: &[Placeholder], single_request: bool) -> TopLevelFn {
        if single_request {
            TopLevelFn::Single(RequestFn::build(&placeholders[0], true))
        } else {
            TopLevelFn::Aggregate(
                placeholders.iter().map(|p| RequestFn::build(p, false)).collect())
        }
    }

    pub(crate) fn invoke(&self, live: &Rc<Live>, options: &OptionsInput) -> Result<(), TemplateError> {
        match self {
            TopLevelFn::Single(f) => {
                let prepared = f.prepare(RequestCall { live, options, request: None, element: None })?;
                prepared.commit(live)
            }
            TopLevelFn::Aggregate(fns) => {
                let mut requests = Vec::with_capacity(fns.len());
                let mut prepared = Vec::with_capacity(fns.len());
                for f in fns {
                    let position = f.placeholder().position;
                    let request = Request::new(position);
                    prepared.push(f.prepare(RequestCall {
                        live,
                        options,
                        request: Some(request.clone()),
                        element: live.elements.get(&position).copied()
                    })?);
                    requests.push(request);
                }
                *live.requests.borrow_mut() = requests;
                for p in prepared {
                    p.commit(live)?;
                }
                Ok(())
            }
        }
    }
}
