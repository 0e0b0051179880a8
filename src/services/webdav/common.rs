/// Common utilities and shared functions for WebDAV services

/// Build a standardized User-Agent string for all WebDAV requests
pub fn build_user_agent() -> String {
    format!("nxget/{} (WebDAV-Mirror)", env!("CARGO_PKG_VERSION"))
}

/// Percent-decodes a URL or URL path, falling back to the raw input when the
/// decoded bytes are not UTF-8
pub fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Key identifying a remote folder regardless of percent-encoding or a
/// trailing separator.
///
/// Servers commonly echo the queried folder back as `/dav/My%20Docs/` while
/// the caller asked for `/dav/My Docs`; both map to the same key.
pub fn folder_key(url: &str) -> String {
    decode_path(url.trim()).trim_end_matches('/').to_string()
}
