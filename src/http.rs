//! HTTP client utilities for the streaming endpoints.
//!
//! Client construction, header handling and error mapping shared by the chat
//! and alert streams.

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use std::collections::HashMap;
use tracing::warn;

use crate::client::ClientError;
use crate::options::{AuthHeader, SecretString, TransportOptions};

const ACCESS_TOKEN_HEADER: &str = "access-token";

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy"),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Attach the credential, if any, using the configured header.
pub fn add_credential(
    request: RequestBuilder,
    auth_header: AuthHeader,
    credential: Option<&SecretString>,
) -> RequestBuilder {
    let Some(credential) = credential else {
        return request;
    };

    match auth_header {
        AuthHeader::AccessToken => request.header(ACCESS_TOKEN_HEADER, credential.expose_secret()),
        AuthHeader::Bearer => request.header(
            AUTHORIZATION,
            format!("Bearer {}", credential.expose_secret()),
        ),
    }
}

/// Fail with `ClientError::Status` unless the response is a 2xx.
pub async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_build_http_client() {
        let transport_options =
            TransportOptions::new("http://vision.local").with_timeout(Duration::from_secs(30));

        let client = build_http_client(&transport_options);
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let transport_options = TransportOptions::new("http://vision.local")
            .with_proxy("http://proxy.example.com:8080".to_string());

        let client = build_http_client(&transport_options);
        assert!(client.is_ok());
    }

    #[test]
    fn test_add_credential_headers() {
        let client = Client::new();
        let secret = SecretString::from("tok");

        let request = add_credential(
            client.get("http://vision.local"),
            AuthHeader::AccessToken,
            Some(&secret),
        )
        .build()
        .unwrap();
        assert_eq!(request.headers()[ACCESS_TOKEN_HEADER], "tok");

        let request = add_credential(client.get("http://vision.local"), AuthHeader::Bearer, Some(&secret))
            .build()
            .unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer tok");

        let request = add_credential(client.get("http://vision.local"), AuthHeader::Bearer, None)
            .build()
            .unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_add_extra_headers() {
        let mut headers = HashMap::new();
        headers.insert("x-tenant".to_string(), "north".to_string());

        let request = add_extra_headers(Client::new().get("http://vision.local"), &Some(headers))
            .build()
            .unwrap();
        assert_eq!(request.headers()["x-tenant"], "north");
    }
}
