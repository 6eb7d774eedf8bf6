//! Running one request: building the transport request, tracking
//! status, and splicing the parsed response into the live tree.

use std::rc::Rc;

use ahtml::{Dom, NodeId, parse_fragment, remove_elements_by_tag};
use anyhow::{anyhow, Result};
use kstring::KString;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{RequestError, TemplateError};
use crate::http_request_method::HttpRequestMethod;
use crate::instance::{Live, Request, RequestHandle};
use crate::options::{Notification, RequestOptions, ResponseValue};
use crate::placeholder::PositionalId;
use crate::resolver::check_headers;
use crate::signal::{AbortReason, AbortSignal};
use crate::transport::TransportRequest;

/// Where the response goes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target {
    /// Single request template: the response becomes the instance's
    /// response, nothing in the tree changes.
    Root,
    /// The placeholder element in the live tree.
    Node(NodeId),
}

/// Everything needed to run (or re-run) one placeholder's request.
#[derive(Debug, Clone)]
pub(crate) struct Execution {
    pub(crate) position: PositionalId,
    pub(crate) target: Target,
    pub(crate) method: HttpRequestMethod,
    pub(crate) source: KString,
    /// Replace the previous output on each run (via the region)
    /// instead of replacing the placeholder once.
    pub(crate) tracked: bool,
    pub(crate) options: RequestOptions,
    /// None for single request templates.
    pub(crate) request: Option<Request>,
}

pub(crate) fn transport_request(
    exec: &Execution,
    diagnostics: &Diagnostics
) -> Result<TransportRequest, TemplateError> {
    let o = &exec.options;
    check_headers(o)?;
    if o.keepalive.is_some() {
        diagnostics.push(Diagnostic::UnsupportedOption(KString::from_static("keepalive")));
    }
    let timeout = o.timeout.filter(|t| ! t.is_zero());
    let signal = match (&o.signal, timeout) {
        (Some(signal), Some(_)) => {
            diagnostics.push(Diagnostic::SignalOverridesTimeout);
            Some(signal.clone())
        }
        (Some(signal), None) => Some(signal.clone()),
        (None, Some(t)) => Some(AbortSignal::timeout(t)),
        (None, None) => None,
    };
    Ok(TransportRequest {
        method: exec.method,
        url: exec.source.clone(),
        headers: o.headers.clone(),
        body: o.body.clone(),
        credentials: o.credentials.clone(),
        mode: o.mode.clone(),
        cache: o.cache.clone(),
        redirect: o.redirect.clone(),
        referrer_policy: o.referrer_policy.clone(),
        integrity: o.integrity.clone(),
        referrer: o.referrer.clone(),
        window: o.window.clone(),
        signal,
    })
}

fn notify(exec: &Execution, notification: Notification) {
    if let Some(observer) = &exec.options.observer {
        observer(&notification);
    }
}

/// Observers are only told about actual changes.
fn update_status(live: &Live, exec: &Execution, status: u16) {
    let changed = match &exec.request {
        Some(request) => request.set_status(status),
        None => live.status.replace(status) != status,
    };
    if changed {
        notify(exec, Notification::Status { status, request: exec.request.clone() });
    }
}

/// Marks the request as running until dropped.
struct InFlight(Option<Request>);

impl InFlight {
    fn new(request: Option<Request>) -> Self {
        if let Some(r) = &request {
            r.set_in_flight(true);
        }
        InFlight(request)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(r) = &self.0 {
            r.set_in_flight(false);
        }
    }
}

/// Start the request for `exec` on the current `LocalSet`. Only fails
/// if the transport request can't be built, in which case nothing
/// was started.
pub(crate) fn execute(live: &Rc<Live>, exec: Execution) -> Result<RequestHandle, TemplateError> {
    let request = transport_request(&exec, &live.host.diagnostics)?;
    update_status(live, &exec, 0);
    let guard = InFlight::new(exec.request.clone());
    let position = exec.position;
    let live = live.clone();
    let join = tokio::task::spawn_local(async move {
        let _guard = guard;
        run(&live, &exec, request).await
    });
    Ok(RequestHandle::new(position, join))
}

async fn run(live: &Live, exec: &Execution, request: TransportRequest) -> Result<(), RequestError> {
    let signal = request.signal.clone();
    let fetch = live.host.transport.fetch(request);
    let fetched = match signal {
        Some(signal) => tokio::select! {
            biased;
            reason = signal.cancelled() => return Err(match reason {
                AbortReason::Aborted => RequestError::Aborted,
                AbortReason::TimedOut => RequestError::TimedOut,
            }),
            r = fetch => r,
        },
        None => fetch.await
    };
    let response = fetched.map_err(RequestError::Transport)?;
    update_status(live, exec, response.status);
    if ! response.ok() {
        return Err(RequestError::RequestFailed { status: response.status })
    }
    let notifications = splice(live, exec, &response.body).map_err(RequestError::Tree)?;
    for n in notifications {
        notify(exec, n);
    }
    Ok(())
}

fn insert_all(dom: &mut Dom, parent: NodeId, nodes: &[NodeId], reference: NodeId) -> Result<()> {
    for n in nodes {
        dom.insert_before(parent, *n, Some(reference))?;
    }
    Ok(())
}

fn placeholder_parent(dom: &Dom, exec: &Execution, target: NodeId) -> Result<NodeId> {
    dom.parent(target).ok_or_else(
        || anyhow!("placeholder at position {} is not attached to the tree", exec.position))
}

/// Put the response content into the tree. All of it or, on error,
/// as little as possible. Returns the notifications to send, which
/// must happen after the tree is released.
fn splice(live: &Live, exec: &Execution, body: &str) -> Result<Vec<Notification>> {
    let mut dom = live.dom.borrow_mut();
    let fragment = parse_fragment(&mut dom, body)?;
    remove_elements_by_tag(&mut dom, fragment, "script")?;

    let target = match exec.target {
        Target::Root => {
            if let Some(old) = live.response.replace(Some(fragment)) {
                if dom.is_live(old) {
                    dom.free_subtree(old)?;
                }
            }
            return Ok(vec![Notification::Response {
                value: ResponseValue::Fragment(fragment),
                request: None
            }])
        }
        Target::Node(id) => id
    };

    let nodes = dom.children(fragment).to_vec();
    if exec.tracked {
        let mut regions = live.regions.borrow_mut();
        let region = regions.ensure(live.id, exec.position);
        let mut tracked = nodes.clone();
        if tracked.is_empty() {
            // anchor so the next response knows where to go
            tracked.push(dom.new_comment(""));
        }
        match (region.parent, region.nodes.last().copied()) {
            (Some(parent), Some(last)) => {
                insert_all(&mut dom, parent, &tracked, last)?;
                for old in std::mem::take(&mut region.nodes) {
                    if dom.is_live(old) {
                        dom.free_subtree(old)?;
                    }
                }
            }
            _ => {
                let parent = placeholder_parent(&dom, exec, target)?;
                insert_all(&mut dom, parent, &tracked, target)?;
                dom.free_subtree(target)?;
                region.parent = Some(parent);
            }
        }
        region.nodes = tracked;
    } else {
        let parent = placeholder_parent(&dom, exec, target)?;
        insert_all(&mut dom, parent, &nodes, target)?;
        dom.free_subtree(target)?;
    }
    dom.free_subtree(fragment)?;

    let mut notifications = Vec::with_capacity(2);
    if let Some(request) = &exec.request {
        request.set_response(nodes.clone());
        notifications.push(Notification::Response {
            value: ResponseValue::Nodes(nodes),
            request: Some(request.clone())
        });
    }
    notifications.push(Notification::Response {
        value: ResponseValue::Root(live.root),
        request: None
    });
    Ok(notifications)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn exec(options: RequestOptions) -> Execution {
        Execution {
            position: PositionalId(0),
            target: Target::Root,
            method: HttpRequestMethod::POST,
            source: KString::from_static("/s"),
            tracked: false,
            options,
            request: None,
        }
    }

    #[tokio::test]
    async fn t_transport_request() -> Result<()> {
        let d = Diagnostics::silent();
        let r = transport_request(
            &exec(RequestOptions::new().body("a=1").header("X-A", "b")), &d)?;
        assert_eq!(r.method, HttpRequestMethod::POST);
        assert_eq!(r.url.as_str(), "/s");
        assert_eq!(r.body.as_deref(), Some("a=1"));
        assert!(r.signal.is_none());
        assert!(d.is_empty());

        let r = transport_request(&exec(RequestOptions::new().timeout(Duration::from_secs(1))), &d)?;
        assert!(r.signal.is_some());
        let r = transport_request(&exec(RequestOptions::new().timeout(Duration::ZERO)), &d)?;
        assert!(r.signal.is_none());
        assert!(d.is_empty());

        let signal = AbortSignal::new();
        let mut o = RequestOptions::new().signal(signal.clone()).timeout(Duration::from_secs(1));
        o.keepalive = Some(true);
        let r = transport_request(&exec(o), &d)?;
        signal.abort();
        assert!(r.signal.map_or(false, |s| s.aborted()));
        assert_eq!(d.entries(), vec![
            Diagnostic::UnsupportedOption("keepalive".into()),
            Diagnostic::SignalOverridesTimeout,
        ]);
        Ok(())
    }
}
