//! Canonical request construction for TOS V4 signing.
//!
//! The canonical request is the normalized textual form of an HTTP request
//! that both client and service derive independently:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Unlike a verifying server, a client controls the bytes it puts on the
//! wire, so query keys and values are percent-encoded here with the same
//! rules used when the request URL is assembled; canonicalization and
//! transmission can never disagree.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters percent-encoded in path segments and query components: all
/// but the RFC 3986 unreserved set (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`).
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode one path segment or query component.
#[must_use]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

/// Build the canonical URI by encoding each path segment, preserving `/`.
///
/// Empty paths normalize to `/`.
///
/// # Examples
///
/// ```
/// use tos_auth::canonical::canonical_uri;
///
/// assert_eq!(canonical_uri("/object.txt"), "/object.txt");
/// assert_eq!(canonical_uri(""), "/");
/// assert_eq!(canonical_uri("/dir/hello world"), "/dir/hello%20world");
/// ```
#[must_use]
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string from decoded key/value pairs.
///
/// Pairs are encoded and then sorted by key, and by value among duplicate
/// keys. Keys with no value encode as `key=`.
///
/// # Examples
///
/// ```
/// use tos_auth::canonical::canonical_query;
///
/// let pairs = [("b", "2"), ("a", "1")];
/// assert_eq!(canonical_query(&pairs), "a=1&b=2");
/// assert_eq!(canonical_query(&[("uploads", "")]), "uploads=");
/// ```
#[must_use]
pub fn canonical_query<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (uri_encode(k.as_ref()), uri_encode(v.as_ref())))
        .collect();
    encoded.sort_unstable();

    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block and the sorted signed-header list.
///
/// Header names are lowercased; values are trimmed and inner whitespace
/// runs collapse to one space; duplicate names join with commas; output is
/// sorted by name. Returns `(canonical_headers, signed_header_names)`.
#[must_use]
pub fn canonical_headers<K, V>(headers: &[(K, V)]) -> (String, Vec<String>)
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_ref().to_lowercase();
        let value = collapse_whitespace(value.as_ref().trim());
        map.entry(name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    let block = map
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");
    let names = map.into_keys().collect();
    (block, names)
}

/// Join signed header names with `;` (the names must already be sorted).
#[must_use]
pub fn signed_headers_string(names: &[String]) -> String {
    names.join(";")
}

/// Assemble the full canonical request string.
#[must_use]
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers_block: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    format!("{method}\n{uri}\n{query}\n{headers_block}\n\n{signed_headers}\n{payload_hash}")
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
