//! Request IDs
//!
//! Callers (storefront proxies, load balancers) may supply their own id for
//! cross-system tracing. Ids that are too long or contain characters outside
//! `[A-Za-z0-9._:-]` are replaced so log lines stay greppable.

use salvo::{http::header::HeaderValue, prelude::Response};
use tracing::debug;
use uuid::Uuid;

pub(super) const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 64;

pub(super) fn resolve_request_id(header_value: Option<String>) -> String {
    match header_value {
        Some(value) if is_acceptable(&value) => value,
        Some(rejected) => {
            debug!(
                len = rejected.len(),
                "replacing unusable caller request id"
            );

            Uuid::now_v7().to_string()
        }
        None => Uuid::now_v7().to_string(),
    }
}

pub(super) fn set_request_id_header(res: &mut Response, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

fn is_acceptable(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b':'))
}
