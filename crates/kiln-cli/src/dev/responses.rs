//! Locally generated responses (errors that never reach the build server).

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response, StatusCode},
};

use crate::dev::mime::MimeLookup;

/// Build an empty error response for `req`.
///
/// The content type follows the requested path's extension so browsers treat
/// the failure as the asset kind they asked for. CORS is always permissive.
pub fn send_response_error<B>(
    req: &Request<B>,
    status: StatusCode,
    mime: &dyn MimeLookup,
) -> Response<Body> {
    let content_type = mime.content_type_for(req.uri().path());

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));

    response
}

/// Plain-text response used when the proxy cannot produce one from upstream.
pub(crate) fn plain_text(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::mime::ExtensionTable;
    use http_body_util::BodyExt;

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_extension_404() {
        let res = send_response_error(&request("/data.xyz"), StatusCode::NOT_FOUND, &ExtensionTable);

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[test]
    fn test_always_sets_cors_and_range_headers() {
        let res = send_response_error(
            &request("/src/app.js"),
            StatusCode::INTERNAL_SERVER_ERROR,
            &ExtensionTable,
        );

        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/javascript");
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(res.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(res.headers()[header::VARY], "Accept-Encoding");
    }

    #[test]
    fn test_extensionless_path_is_html() {
        let res = send_response_error(&request("/about"), StatusCode::NOT_FOUND, &ExtensionTable);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }
}
