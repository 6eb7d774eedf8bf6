//! The network side: a fetch-like trait, an in-memory stub, and
//! (with the `reqwest-transport` feature) a real HTTP client.

use std::{cell::RefCell, collections::{HashMap, VecDeque}, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use itertools::Itertools;
use kstring::KString;

use crate::http_request_method::HttpRequestMethod;
use crate::signal::AbortSignal;

/// Fetch-style request description. Fields other than method, url,
/// headers and body are passed along for transports that know what
/// to do with them.
#[derive(Debug, Clone, Default)]
pub struct TransportRequest {
    pub method: HttpRequestMethod,
    pub url: KString,
    pub headers: Vec<(KString, KString)>,
    pub body: Option<String>,
    pub credentials: Option<KString>,
    pub mode: Option<KString>,
    pub cache: Option<KString>,
    pub redirect: Option<KString>,
    pub referrer_policy: Option<KString>,
    pub integrity: Option<KString>,
    pub referrer: Option<KString>,
    pub window: Option<KString>,
    /// The engine races the fetch against this; transports may also
    /// watch it themselves.
    pub signal: Option<AbortSignal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

#[async_trait(?Send)]
pub trait Transport {
    /// Errors are for failures to get any response at all; HTTP
    /// error statuses are normal responses.
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[derive(Debug, Clone)]
struct StubReply {
    status: u16,
    body: String,
    delay: Duration,
}

/// Serves configured replies keyed by method and url. Several replies
/// for the same route are served in order, the last one repeatedly.
#[derive(Debug, Default)]
pub struct StubTransport {
    routes: RefCell<HashMap<(HttpRequestMethod, KString), VecDeque<StubReply>>>,
    calls: RefCell<Vec<TransportRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, method: HttpRequestMethod, url: &str, status: u16, body: &str) -> &Self {
        self.route_delayed(method, url, status, body, Duration::ZERO)
    }

    /// The reply is sent after `delay` (tokio time).
    pub fn route_delayed(
        &self,
        method: HttpRequestMethod,
        url: &str,
        status: u16,
        body: &str,
        delay: Duration
    ) -> &Self {
        self.routes.borrow_mut()
            .entry((method, KString::from_ref(url)))
            .or_default()
            .push_back(StubReply { status, body: body.to_owned(), delay });
        self
    }

    /// All requests seen so far, in order.
    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn next_reply(&self, method: HttpRequestMethod, url: &KString) -> Option<StubReply> {
        let mut routes = self.routes.borrow_mut();
        let queue = routes.get_mut(&(method, url.clone()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait(?Send)]
impl Transport for StubTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse> {
        let (method, url) = (request.method, request.url.clone());
        self.calls.borrow_mut().push(request);
        let reply = self.next_reply(method, &url).ok_or_else(|| {
            let known = self.routes.borrow().keys()
                .map(|(m, u)| format!("{m} {u}"))
                .sorted()
                .join(", ");
            anyhow!("StubTransport: no route for {method} \"{url}\" (have: {known})")
        })?;
        if ! reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        Ok(TransportResponse { status: reply.status, body: reply.body })
    }
}

#[cfg(feature = "reqwest-transport")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest-transport")]
mod reqwest_transport {
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use url::Url;

    use super::{Transport, TransportRequest, TransportResponse};

    /// Sources are resolved against `base` if given, otherwise they
    /// have to be absolute urls.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
        base: Option<Url>,
    }

    impl ReqwestTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_base(base: &str) -> Result<Self> {
            let base = Url::parse(base).with_context(|| format!("parsing base url {base:?}"))?;
            Ok(ReqwestTransport { client: reqwest::Client::new(), base: Some(base) })
        }

        fn url(&self, source: &str) -> Result<Url> {
            match &self.base {
                Some(base) => base.join(source)
                    .with_context(|| format!("resolving {source:?} against {base}")),
                None => Url::parse(source)
                    .with_context(|| format!("parsing url {source:?}")),
            }
        }
    }

    #[async_trait(?Send)]
    impl Transport for ReqwestTransport {
        async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse> {
            let url = self.url(&request.url)?;
            let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())?;
            let mut builder = self.client.request(method, url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(referrer) = &request.referrer {
                builder = builder.header(reqwest::header::REFERER, referrer.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(TransportResponse { status, body })
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> TransportRequest {
        TransportRequest { url: KString::from_ref(url), ..Default::default() }
    }

    #[tokio::test]
    async fn t_stub_routes_and_queue() -> Result<()> {
        let t = StubTransport::new();
        t.route(HttpRequestMethod::GET, "/a", 200, "one")
            .route(HttpRequestMethod::GET, "/a", 500, "two");
        assert_eq!(t.fetch(get("/a")).await?.body, "one");
        assert_eq!(t.fetch(get("/a")).await?.status, 500);
        assert_eq!(t.fetch(get("/a")).await?.status, 500);
        assert!(t.fetch(get("/b")).await.is_err());
        assert_eq!(t.call_count(), 4);
        assert_eq!(t.calls()[3].url.as_str(), "/b");
        Ok(())
    }

    #[test]
    fn t_ok_range() {
        let r = |status| TransportResponse { status, body: String::new() };
        assert!(r(200).ok() && r(299).ok());
        assert!(! r(199).ok() && ! r(300).ok() && ! r(404).ok());
    }
}
