#![forbid(unsafe_code)]

use poem::http::{header, HeaderValue};
use poem::{Endpoint, Middleware, Request, Response, Result};

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Same-origin policy for all sources. Inline styles are allowed because the
// greeting page uses style attributes, a documented residual risk.
const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'";
const CONTENT_TYPE_OPTIONS: &str = "nosniff";

// ***************************************************************************
//                               Middleware
// ***************************************************************************
// ---------------------------------------------------------------------------
// SecurityHeaders:
// ---------------------------------------------------------------------------
/** Middleware that stamps the security headers on every response produced
 * by the wrapped endpoint.
 */
#[derive(Default)]
pub struct SecurityHeaders;

impl SecurityHeaders {
    pub fn new() -> Self {
        SecurityHeaders
    }
}

impl<E: Endpoint> Middleware<E> for SecurityHeaders {
    type Output = SecurityHeadersEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        SecurityHeadersEndpoint { inner: ep }
    }
}

// ---------------------------------------------------------------------------
// SecurityHeadersEndpoint:
// ---------------------------------------------------------------------------
pub struct SecurityHeadersEndpoint<E> {
    inner: E,
}

impl<E: Endpoint> Endpoint for SecurityHeadersEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> Result<Self::Output> {
        // Fold endpoint errors into a response here so that error replies,
        // including the routing 404, carry the headers too.
        let mut resp = self.inner.get_response(req).await;
        let headers = resp.headers_mut();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static(CONTENT_TYPE_OPTIONS),
        );
        Ok(resp)
    }
}
