// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use crate::{
    context::state::IpgateState,
    waf::{
        chain::{FilterChain, FilterRequest, RuleTrace},
        error::{display_chain, EvaluationJoinSnafu, ReadBlockPageSnafu, Result},
    },
};
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use ipgate_types::ipfilter::Decision;
use snafu::ResultExt;
use std::{net::SocketAddr, path::Path, sync::Arc};

/// Paths never subject to the filter.
pub const EXCLUDED_PATHS: [&str; 1] = ["/healthz"];

pub async fn ipfilter_middleware(
    State(state): State<IpgateState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if state.chain.is_empty() || EXCLUDED_PATHS.contains(&path.as_str()) {
        return next.run(req).await;
    }

    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let filter_req = FilterRequest {
        path,
        remote_addr,
        headers: req.headers().to_owned(),
    };

    let trace = match evaluate(state.chain.to_owned(), filter_req).await {
        Ok(trace) => trace,
        Err(e) => {
            tracing::warn!("Failed to evaluate ipfilter for {}: {}", req.uri(), display_chain(&e));
            return internal_error();
        }
    };
    if trace.decision.is_denied() {
        tracing::info!("Denied {:?} on {} by rule {:?}", trace.client, req.uri(), trace.rule);
    } else {
        tracing::debug!("Admitted {:?} on {} by rule {:?}", trace.client, req.uri(), trace.rule);
    }

    match trace.decision {
        Decision::Proceed => next.run(req).await,
        Decision::DenyForbidden => StatusCode::FORBIDDEN.into_response(),
        Decision::DenyWithPage(page) => {
            match read_block_page(&page).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("{}", display_chain(&e));
                    internal_error()
                }
            }
        }
    }
}

// Evaluation checks files and the country database, keep it off the async workers.
async fn evaluate(chain: Arc<FilterChain>, req: FilterRequest) -> Result<RuleTrace> {
    tokio::task::spawn_blocking(move || chain.evaluate_traced(&req))
        .await
        .context(EvaluationJoinSnafu)?
}

async fn read_block_page(page: &Path) -> Result<Response> {
    let body = tokio::fs::read(page).await.context(ReadBlockPageSnafu { path: page })?;
    let content_type = mime_guess::from_path(page).first_or_octet_stream();
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type.to_string())], body).into_response())
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::config::{AppConfig, AppConfigProperties},
        waf::{address::AddressResolver, geo::tests::FakeCountryLookup, geo::GeoClassifier, rule::FilterRule},
    };
    use axum::{middleware::from_fn_with_state, routing::get, Router};
    use ipgate_types::ipfilter::Polarity;
    use tower::ServiceExt;

    fn app(rules: Vec<FilterRule>) -> Router {
        let config = AppConfig::new(&AppConfigProperties::default());
        let chain = FilterChain::new(AddressResolver::new("X-Forwarded-For").unwrap(), rules);
        let state = IpgateState::with_chain(&config, chain);
        Router::new()
            .route("/healthz", get(|| async { "UP" }))
            .fallback(|| async { "upstream" })
            .layer(from_fn_with_state(state, ipfilter_middleware))
    }

    fn request(uri: &str, peer: &str) -> Request<Body> {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, String) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn block(scope: &str, token: &str) -> FilterRule {
        FilterRule::builder(Polarity::Block).path(scope).ip(token).unwrap().build().unwrap()
    }

    #[tokio::test]
    async fn test_forbidden_without_block_page() {
        let app = app(vec![FilterRule::builder(Polarity::Block)
            .path("/")
            .ip("70.1.128.0/19")
            .unwrap()
            .ip("2001:db8::/122")
            .unwrap()
            .ip("9.12.20.16")
            .unwrap()
            .build()
            .unwrap()]);
        let (status, body) = send(app.clone(), request("/", "9.12.20.16:4000")).await;
        assert_eq!(StatusCode::FORBIDDEN, status);
        assert!(body.is_empty());

        let (status, body) = send(app, request("/", "9.12.20.17:4000")).await;
        assert_eq!(StatusCode::OK, status);
        assert_eq!("upstream", body);
    }

    #[tokio::test]
    async fn test_block_page_served_with_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let page = tmp.path().join("default.html");
        std::fs::write(&page, "<html>Blocked</html>").unwrap();
        let app = app(vec![FilterRule::builder(Polarity::Allow)
            .path("/")
            .ip("55.3.4.20/32")
            .unwrap()
            .blockpage(&page)
            .build()
            .unwrap()]);

        let resp = app.clone().oneshot(request("/", "1.2.3.4:4000")).await.unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!("text/html", resp.headers()[header::CONTENT_TYPE]);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(b"<html>Blocked</html>".as_slice(), body.as_ref());

        let (status, body) = send(app, request("/", "55.3.4.20:4000")).await;
        assert_eq!(StatusCode::OK, status);
        assert_eq!("upstream", body);
    }

    #[tokio::test]
    async fn test_block_page_removed_after_load() {
        let tmp = tempfile::tempdir().unwrap();
        let page = tmp.path().join("default.html");
        std::fs::write(&page, "blocked").unwrap();
        let app = app(vec![FilterRule::builder(Polarity::Block)
            .path("/")
            .ip("1.2.3.4")
            .unwrap()
            .blockpage(&page)
            .build()
            .unwrap()]);
        std::fs::remove_file(&page).unwrap();
        let (status, body) = send(app, request("/", "1.2.3.4:4000")).await;
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert_eq!("Internal Server Error", body);
    }

    #[tokio::test]
    async fn test_override_on_narrower_scope() {
        let app = app(vec![
            block("/", "192.168.1.10"),
            FilterRule::builder(Polarity::Allow)
                .path("/allowed")
                .ip("192.168.1.10")
                .unwrap()
                .build()
                .unwrap(),
        ]);
        assert_eq!(StatusCode::OK, send(app.clone(), request("/allowed", "192.168.1.10:80")).await.0);
        assert_eq!(StatusCode::FORBIDDEN, send(app, request("/private", "192.168.1.10:80")).await.0);
    }

    #[tokio::test]
    async fn test_health_is_exempt() {
        let app = app(vec![block("/", "0.0.0.0/0")]);
        let (status, body) = send(app.clone(), request("/healthz", "9.9.9.9:80")).await;
        assert_eq!(StatusCode::OK, status);
        assert_eq!("UP", body);
        assert_eq!(StatusCode::FORBIDDEN, send(app, request("/", "9.9.9.9:80")).await.0);
    }

    #[tokio::test]
    async fn test_forwarded_header_is_trusted() {
        let app = app(vec![block("/", "9.12.20.16")]);
        let mut req = request("/", "10.0.0.1:80");
        req.headers_mut().insert("x-forwarded-for", "9.12.20.16".parse().unwrap());
        assert_eq!(StatusCode::FORBIDDEN, send(app, req).await.0);
    }

    #[tokio::test]
    async fn test_unparsable_address_is_internal_error() {
        let app = app(vec![block("/", "9.12.20.16")]);
        let mut req = request("/", "10.0.0.1:80");
        req.headers_mut().insert("x-forwarded-for", "unknown".parse().unwrap());
        let (status, body) = send(app, req).await;
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
        assert_eq!("Internal Server Error", body);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_internal_error() {
        let lookup = FakeCountryLookup::default().failing("1.2.3.4");
        let app = app(vec![FilterRule::builder(Polarity::Block)
            .path("/")
            .countries(GeoClassifier::new(Arc::new(lookup), ["CN"]))
            .build()
            .unwrap()]);
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, send(app.clone(), request("/", "1.2.3.4:80")).await.0);
        assert_eq!(StatusCode::OK, send(app, request("/", "5.6.7.8:80")).await.0);
    }

    #[tokio::test]
    async fn test_link_local_peer_is_resolved() {
        let app = app(vec![block("/", "fe80::1")]);
        let peer = SocketAddr::V6(std::net::SocketAddrV6::new("fe80::1".parse().unwrap(), 80, 0, 2));
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(StatusCode::FORBIDDEN, send(app.clone(), req).await.0);

        let other = SocketAddr::V6(std::net::SocketAddrV6::new("fe80::2".parse().unwrap(), 80, 0, 2));
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(other));
        assert_eq!(StatusCode::OK, send(app, req).await.0);
    }

    #[tokio::test]
    async fn test_missing_connect_info_out_of_scope() {
        let app = app(vec![block("/admin", "9.12.20.16")]);
        let req = Request::builder().uri("/index.html").body(Body::empty()).unwrap();
        assert_eq!(StatusCode::OK, send(app, req).await.0);
    }
}
