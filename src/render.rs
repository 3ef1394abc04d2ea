//! Server-rendered pages fetched from the frontend server.
//!
//! # Data Flow
//! ```text
//! GET /dashboard?tab=1 ──▶ NextJsPage ──GET {server_url}/dashboard?tab=1──▶ frontend server
//!                                     ◀── status, location/vary/content-type, html
//!                      ◀── html, optionally spliced through a PageTemplate
//! ```
//!
//! # Design Decisions
//! - Always a GET; the inbound request body is read and discarded
//! - Only the headers the frontend needs to choose between a full page and
//!   an RSC payload are forwarded, plus the caller's address and user agent
//! - Redirects are relayed to the browser unless following them is configured
//! - Encoded bodies are relayed untouched and never spliced
//! - Not gated on development mode: pages are served in production too

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request};
use futures_util::future::BoxFuture;
use url::Url;

use crate::app::{refuse_websocket, Unsupported};
use crate::bridge::headers;
use crate::bridge::http::BodyBuffer;
use crate::bridge::{BridgeError, UpstreamBase};
use crate::config::{PagesConfig, SpliceConfig};
use crate::lifecycle::{ClientLease, UpstreamClient};
use crate::observability::metrics;
use crate::protocol::{AppError, Application, Headers, Inbound, Message, Outbound, Scope, ScopeKind};
use crate::routing::matcher::{AnyPrefixMatcher, Matcher};

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// Inbound headers copied onto the page request when present.
const FORWARDED_HEADERS: [&str; 6] = [
    "rsc",
    "next-router-state-tree",
    "next-router-prefetch",
    "next-url",
    "cookie",
    "accept-encoding",
];

// Section markers emitted by the frontend's document component.
const HEAD_OPEN: &str = "<head>";
const BODY_OPEN: &str = "</head><body id=\"__django_nextjs_body\"";
const BODY_BEGIN: &str = "<div id=\"__django_nextjs_body_begin\"";
const BODY_END: &str = "<div id=\"__django_nextjs_body_end\"";

/// A rendered page cut at its section markers. Concatenating the five
/// sections in order gives back the original page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSections<'a> {
    /// Everything up to and including `<head>`.
    pub preamble: &'a str,
    /// Contents of `<head>`.
    pub head: &'a str,
    /// From `</head>` up to the body-begin marker.
    pub body_open: &'a str,
    /// From the body-begin marker up to the body-end marker.
    pub body: &'a str,
    /// The body-end marker and everything after it.
    pub tail: &'a str,
}

impl<'a> PageSections<'a> {
    /// Split `html`, or `None` if any marker is missing.
    pub fn split(html: &'a str) -> Option<Self> {
        let head = html.find(HEAD_OPEN)? + HEAD_OPEN.len();
        let body_open = head + html[head..].find(BODY_OPEN)?;
        let body = body_open + html[body_open..].find(BODY_BEGIN)?;
        let tail = body + html[body..].find(BODY_END)?;

        Some(Self {
            preamble: &html[..head],
            head: &html[head..body_open],
            body_open: &html[body_open..body],
            body: &html[body..tail],
            tail: &html[tail..],
        })
    }
}

/// Produces the final page from its sections.
pub trait PageTemplate: Send + Sync + std::fmt::Debug {
    fn render(&self, sections: &PageSections<'_>) -> String;
}

/// Inserts fixed markup at the end of `<head>` and around the page body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Splice {
    pub head: String,
    pub body_begin: String,
    pub body_end: String,
}

impl From<&SpliceConfig> for Splice {
    fn from(config: &SpliceConfig) -> Self {
        Self {
            head: config.head.clone(),
            body_begin: config.body_begin.clone(),
            body_end: config.body_end.clone(),
        }
    }
}

impl PageTemplate for Splice {
    fn render(&self, sections: &PageSections<'_>) -> String {
        [
            sections.preamble,
            sections.head,
            self.head.as_str(),
            sections.body_open,
            self.body_begin.as_str(),
            sections.body,
            self.body_end.as_str(),
            sections.tail,
        ]
        .concat()
    }
}

/// Page as returned to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl RenderedPage {
    /// The body as text; bytes that are not UTF-8 are replaced.
    pub fn html(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Serves each HTTP request with the page the frontend server renders for
/// the same path and query.
#[derive(Debug, Clone)]
pub struct NextJsPage {
    upstream: UpstreamBase,
    allow_redirects: bool,
    headers: Headers,
    template: Option<Arc<dyn PageTemplate>>,
}

impl NextJsPage {
    pub fn new(server_url: &str) -> Result<Self, BridgeError> {
        Ok(Self {
            upstream: UpstreamBase::parse(server_url)?,
            allow_redirects: false,
            headers: Headers::new(),
            template: None,
        })
    }

    /// Build from the `[pages]` configuration section.
    pub fn from_config(server_url: &str, pages: &PagesConfig) -> Result<Self, BridgeError> {
        let mut page = Self::new(server_url)?.allow_redirects(pages.allow_redirects);
        for (name, value) in &pages.headers {
            page = page.with_header(name.as_str(), value.as_str());
        }
        if let Some(splice) = &pages.splice {
            page = page.with_template(Splice::from(splice));
        }
        Ok(page)
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    /// Send `name: value` with every page request, replacing any forwarded value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_template(mut self, template: impl PageTemplate + 'static) -> Self {
        self.template = Some(Arc::new(template));
        self
    }

    pub fn upstream(&self) -> &UpstreamBase {
        &self.upstream
    }

    /// Headers sent to the frontend server for `scope`.
    pub fn request_headers(&self, scope: &Scope) -> Headers {
        let real_ip = scope
            .headers
            .get("x-real-ip")
            .filter(|ip| !ip.is_empty())
            .map(str::to_owned)
            .or_else(|| scope.client.map(|addr| addr.ip().to_string()))
            .unwrap_or_default();

        let mut forwarded = Headers::new();
        forwarded.push("x-real-ip", real_ip);
        forwarded.push("user-agent", scope.headers.get("user-agent").unwrap_or_default());
        for name in FORWARDED_HEADERS {
            let values: Vec<&str> = scope.headers.get_all(name).collect();
            if !values.is_empty() {
                let separator = if name == "cookie" { "; " } else { ", " };
                forwarded.push(name, values.join(separator));
            }
        }

        let mut headers: Headers = forwarded
            .iter()
            .filter(|(name, _)| !self.headers.contains(name))
            .collect();
        for (name, value) in self.headers.iter() {
            headers.push(name, value);
        }
        headers
    }

    /// Fetch the page for `scope` from the frontend server.
    pub async fn render(&self, client: &UpstreamClient, scope: &Scope) -> Result<RenderedPage, BridgeError> {
        let request_headers = self.request_headers(scope);
        let mut url = self.upstream.http_url(scope);
        let mut redirects = 0;

        let (parts, body) = loop {
            let mut request = Request::builder().method(Method::GET).uri(&url);
            for (name, value) in request_headers.iter() {
                request = request.header(name, value);
            }
            let response = client.request(request.body(Body::empty())?).await?;

            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .filter(|_| self.allow_redirects && response.status().is_redirection())
                .map(str::to_owned);

            match location {
                Some(_) if redirects == MAX_REDIRECTS => return Err(BridgeError::TooManyRedirects(url)),
                Some(location) => {
                    tracing::debug!(connection_id = %scope.id, from = %url, to = %location, "Following page redirect");
                    url = resolve(&url, &location)?;
                    redirects += 1;
                }
                None => break response.into_parts(),
            }
        };

        let status = parts.status.as_u16();
        let body = axum::body::to_bytes(Body::new(body), usize::MAX)
            .await
            .map_err(BridgeError::UpstreamBody)?;
        let headers = headers::page_response_headers(&parts.headers);

        let body = match &self.template {
            Some(template) if !headers.contains("content-encoding") => apply_template(template.as_ref(), body),
            _ => body,
        };

        tracing::debug!(connection_id = %scope.id, url = %url, status, redirects, "Page rendered");
        Ok(RenderedPage { status, headers, body })
    }

    /// Fetch the page for `scope` and return only its markup.
    pub async fn render_to_string(&self, client: &UpstreamClient, scope: &Scope) -> Result<String, BridgeError> {
        Ok(self.render(client, scope).await?.html())
    }

    async fn handle(&self, scope: Scope, mut inbound: Inbound, outbound: Outbound) -> Result<(), AppError> {
        match scope.kind {
            ScopeKind::Http => {
                if BodyBuffer::collect(&mut inbound).await.is_none() {
                    return Ok(());
                }
                let client = ClientLease::for_scope(&scope);

                let page = match self.render(&client, &scope).await {
                    Ok(page) => page,
                    Err(e) => {
                        if e.is_upstream() {
                            metrics::record_upstream_error();
                        }
                        tracing::error!(connection_id = %scope.id, path = %scope.path, error = %e, "Page render failed");
                        return Err(e.into());
                    }
                };
                metrics::record_page_render(page.status);

                outbound
                    .send(Message::HttpResponseStart {
                        status: page.status,
                        headers: page.headers,
                    })
                    .await?;
                outbound
                    .send(Message::HttpResponseBody {
                        body: page.body,
                        more_body: false,
                    })
                    .await?;
                Ok(())
            }
            ScopeKind::WebSocket => refuse_websocket(&mut inbound, &outbound).await,
            kind => Err(Unsupported { app: "NextJsPage", kind }.into()),
        }
    }
}

impl Application for NextJsPage {
    fn call(&self, scope: Scope, inbound: Inbound, outbound: Outbound) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(self.handle(scope, inbound, outbound))
    }
}

fn resolve(base: &str, location: &str) -> Result<String, BridgeError> {
    Url::parse(base)
        .and_then(|base| base.join(location))
        .map(|url| url.to_string())
        .map_err(|e| BridgeError::InvalidUpstreamUrl {
            url: location.to_string(),
            reason: e.to_string(),
        })
}

fn apply_template(template: &dyn PageTemplate, body: Bytes) -> Bytes {
    let rendered = std::str::from_utf8(&body)
        .ok()
        .and_then(PageSections::split)
        .map(|sections| template.render(&sections));
    match rendered {
        Some(html) => Bytes::from(html),
        None => body,
    }
}

/// Sends HTTP requests under the page prefixes to a [`NextJsPage`] and
/// every other scope to `fallback`.
#[derive(Debug)]
pub struct PageRoutes<A> {
    prefixes: AnyPrefixMatcher,
    page: NextJsPage,
    fallback: A,
}

impl<A: Application> PageRoutes<A> {
    pub fn new<I, S>(prefixes: I, page: NextJsPage, fallback: A) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: AnyPrefixMatcher::new(prefixes),
            page,
            fallback,
        }
    }
}

impl<A: Application> Application for PageRoutes<A> {
    fn call(&self, scope: Scope, inbound: Inbound, outbound: Outbound) -> BoxFuture<'_, Result<(), AppError>> {
        if scope.kind == ScopeKind::Http && self.prefixes.matches(&scope.path) {
            self.page.call(scope, inbound, outbound)
        } else {
            self.fallback.call(scope, inbound, outbound)
        }
    }
}
