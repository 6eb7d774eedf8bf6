//! Live instances of a compiled template, and the per placeholder
//! state they carry.

use std::{cell::{Cell, RefCell}, collections::{BTreeMap, HashMap}, fmt, rc::Rc, sync::Mutex};

use ahtml::{Dom, EventRegistry, NodeId, Selector, to_html_string};
use lazy_static::lazy_static;
use tokio::task::JoinHandle;

use crate::analyzer::placeholder_elements;
use crate::diagnostics::Diagnostics;
use crate::error::{RequestError, TemplateError};
use crate::options::OptionsInput;
use crate::placeholder::PositionalId;
use crate::request_fn::Listener;
use crate::resolver::check_input;
use crate::template::{CompiledTemplate, Host};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

lazy_static!{
    static ref NEXT_INSTANCE_ID: Mutex<u64> = Mutex::new(0);
}
fn next_instance_id() -> InstanceId {
    let mut guard = NEXT_INSTANCE_ID.lock().unwrap();
    let id = *guard;
    *guard += 1;
    InstanceId(id)
}

#[derive(Debug, Default)]
struct RequestState {
    status: u16,
    response: Option<Vec<NodeId>>,
    in_flight: bool,
}

/// The state of one placeholder of one instance. Clones share it.
#[derive(Debug, Clone)]
pub struct Request {
    position: PositionalId,
    state: Rc<RefCell<RequestState>>,
}

impl Request {
    pub(crate) fn new(position: PositionalId) -> Self {
        Request { position, state: Default::default() }
    }

    pub fn position(&self) -> PositionalId {
        self.position
    }

    /// 0 until a response arrived (and again while a re-triggered
    /// request is running).
    pub fn status(&self) -> u16 {
        self.state.borrow().status
    }

    /// The nodes inserted by the last successful request.
    pub fn response(&self) -> Option<Vec<NodeId>> {
        self.state.borrow().response.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().in_flight
    }

    pub fn same(&self, other: &Request) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Returns whether the status changed.
    pub(crate) fn set_status(&self, status: u16) -> bool {
        let mut s = self.state.borrow_mut();
        let changed = s.status != status;
        s.status = status;
        changed
    }

    pub(crate) fn set_response(&self, nodes: Vec<NodeId>) {
        self.state.borrow_mut().response = Some(nodes);
    }

    pub(crate) fn set_in_flight(&self, in_flight: bool) {
        self.state.borrow_mut().in_flight = in_flight;
    }
}

/// A request running in the background.
#[derive(Debug)]
pub struct RequestHandle {
    position: PositionalId,
    join: JoinHandle<Result<(), RequestError>>,
}

impl RequestHandle {
    pub(crate) fn new(position: PositionalId, join: JoinHandle<Result<(), RequestError>>) -> Self {
        RequestHandle { position, join }
    }

    pub fn position(&self) -> PositionalId {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<(), RequestError> {
        match self.join.await {
            Ok(r) => r,
            Err(e) => Err(RequestError::Join(e.to_string()))
        }
    }
}

/// The nodes a repeatedly triggered placeholder inserted last time,
/// so that the next response can replace them.
#[derive(Debug, Default)]
pub struct Region {
    pub(crate) parent: Option<NodeId>,
    pub(crate) nodes: Vec<NodeId>,
}

impl Region {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

#[derive(Debug, Default)]
pub struct RegionArena {
    regions: HashMap<(InstanceId, PositionalId), Region>,
}

impl RegionArena {
    pub fn ensure(&mut self, instance: InstanceId, position: PositionalId) -> &mut Region {
        self.regions.entry((instance, position)).or_default()
    }

    pub fn get(&self, instance: InstanceId, position: PositionalId) -> Option<&Region> {
        self.regions.get(&(instance, position))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

pub(crate) struct Live {
    pub(crate) id: InstanceId,
    pub(crate) host: Host,
    pub(crate) single_request: bool,
    pub(crate) dom: RefCell<Dom>,
    /// The clone of the template root.
    pub(crate) root: NodeId,
    /// Placeholder elements in the clone, by position.
    pub(crate) elements: HashMap<PositionalId, NodeId>,
    // For single request templates only:
    pub(crate) status: Cell<u16>,
    pub(crate) response: Cell<Option<NodeId>>,
    // For all others:
    pub(crate) requests: RefCell<Vec<Request>>,
    pub(crate) regions: RefCell<RegionArena>,
    pub(crate) events: RefCell<EventRegistry<Listener>>,
    /// The latest handle per placeholder, until collected.
    pub(crate) pending: RefCell<BTreeMap<PositionalId, RequestHandle>>,
}

/// Returned by `Template::instantiate`. Cheap to clone; all clones
/// refer to the same live tree. Requests update it in the background
/// (on the current `LocalSet`).
#[derive(Clone)]
pub struct Instance(pub(crate) Rc<Live>);

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.0.id)
            .field("single_request", &self.0.single_request)
            .field("html", &self.to_html())
            .finish()
    }
}

impl Instance {
    /// Clone the template tree and start its requests (or arm their
    /// triggers). Fails without issuing any request if the options
    /// don't fit the template.
    pub(crate) fn create(
        template: &CompiledTemplate,
        host: &Host,
        options: &OptionsInput
    ) -> Result<Instance, TemplateError> {
        check_input(options, template.single_request)?;
        let mut dom = Dom::new();
        let root = dom.clone_subtree_from(&template.dom, template.root)?;
        let elements = if template.single_request {
            HashMap::new()
        } else {
            placeholder_elements(&dom, root).into_iter().collect()
        };
        let live = Rc::new(Live {
            id: next_instance_id(),
            host: host.clone(),
            single_request: template.single_request,
            dom: RefCell::new(dom),
            root,
            elements,
            status: Cell::new(0),
            response: Cell::new(None),
            requests: RefCell::new(Vec::new()),
            regions: Default::default(),
            events: RefCell::new(EventRegistry::new()),
            pending: RefCell::new(BTreeMap::new()),
        });
        template.top.invoke(&live, options)?;
        Ok(Instance(live))
    }

    pub fn id(&self) -> InstanceId {
        self.0.id
    }

    pub fn is_single_request(&self) -> bool {
        self.0.single_request
    }

    /// The status of a single request template's request; None for
    /// other templates (see `requests`).
    pub fn status(&self) -> Option<u16> {
        if self.0.single_request {
            Some(self.0.status.get())
        } else {
            None
        }
    }

    /// Single request templates: the parsed response once it arrived,
    /// a fragment node. Otherwise the live root.
    pub fn response(&self) -> Option<NodeId> {
        if self.0.single_request {
            self.0.response.get()
        } else {
            Some(self.0.root)
        }
    }

    pub fn root(&self) -> NodeId {
        self.0.root
    }

    /// One entry per placeholder, in document order. Empty for single
    /// request templates.
    pub fn requests(&self) -> Vec<Request> {
        self.0.requests.borrow().clone()
    }

    /// Don't call instance methods from `f`.
    pub fn with_dom<R>(&self, f: impl FnOnce(&Dom) -> R) -> R {
        f(&self.0.dom.borrow())
    }

    /// The HTML of `response()`, empty if there is none yet.
    pub fn to_html(&self) -> String {
        match self.response() {
            Some(id) => self.with_dom(|dom| to_html_string(dom, id)),
            None => String::new()
        }
    }

    /// Elements below the live root matching `selector`.
    pub fn query_selector_all(&self, selector: &str) -> anyhow::Result<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self.with_dom(|dom| dom.query_selector_all(self.0.root, &selector)))
    }

    /// Fire event `event` at `target`, bubbling up through its
    /// ancestors. Each armed placeholder fires at most once per
    /// dispatch. Returns how many requests were started.
    pub fn dispatch_event(&self, target: NodeId, event: &str) -> Result<usize, TemplateError> {
        let live = &self.0;
        let listeners = {
            let dom = live.dom.borrow();
            live.events.borrow().listeners_for_dispatch(&dom, target, event)
        };
        let mut unique: Vec<Listener> = Vec::new();
        for (_, listener) in listeners {
            if ! unique.iter().any(|l| Rc::ptr_eq(l, &listener)) {
                unique.push(listener);
            }
        }
        let mut started = 0;
        for listener in unique {
            if listener.fire(live)? {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Handles of the requests started since the last call, in
    /// document order.
    pub fn take_pending(&self) -> Vec<RequestHandle> {
        std::mem::take(&mut *self.0.pending.borrow_mut()).into_values().collect()
    }

    /// How many handles `take_pending` would return: at most one per
    /// placeholder, as a newer request replaces the handle of the
    /// previous one (which keeps running if it hasn't finished).
    pub fn pending_count(&self) -> usize {
        self.0.pending.borrow().len()
    }

    /// Wait for all requests started so far, including ones started
    /// while waiting.
    pub async fn settle(&self) -> Vec<Result<(), RequestError>> {
        let mut results = Vec::new();
        loop {
            let pending = self.take_pending();
            if pending.is_empty() {
                break
            }
            for handle in pending {
                results.push(handle.wait().await);
            }
        }
        results
    }

    /// Event subscriptions still armed.
    pub fn active_subscriptions(&self) -> usize {
        self.0.events.borrow().active_count()
    }

    /// The nodes currently tracked for the repeatedly triggered
    /// placeholder at `position`, if it fired successfully before.
    pub fn region_nodes(&self, position: PositionalId) -> Option<Vec<NodeId>> {
        self.0.regions.borrow().get(self.0.id, position).map(|r| r.nodes.clone())
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.0.host.diagnostics
    }
}
