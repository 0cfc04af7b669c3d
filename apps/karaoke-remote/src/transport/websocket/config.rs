use url::Url;

use crate::transport::TransportError;

pub const NEGOTIATE_VERSION: &str = "1";

/// Maps the http(s) hub URL onto the WebSocket endpoint. A negotiated
/// connection carries its token as the `id` query parameter.
pub fn websocket_url(hub_url: &Url, connection_token: Option<&str>) -> Result<Url, TransportError> {
    let mut url = hub_url.clone();
    let scheme = match hub_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidUrl(hub_url.to_string()))?;

    // Normalize localhost to avoid IPv6 issues
    if url.host_str() == Some("localhost") {
        url.set_host(Some("127.0.0.1"))
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
    }

    if let Some(token) = connection_token {
        url.query_pairs_mut().append_pair("id", token);
    }
    Ok(url)
}

pub fn negotiate_url(hub_url: &Url) -> Url {
    let mut url = hub_url.clone();
    let path = format!("{}/negotiate", hub_url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .append_pair("negotiateVersion", NEGOTIATE_VERSION);
    url
}
