use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{
    Response,
    header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap},
};

static CONTENT_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"bytes (\d+)-(\d+)/(\d+|\*)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// Status and headers of a fetch response, captured once at fetch start so
/// the body stream can keep being consumed separately.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    status_code: u16,
    response_headers: HeaderMap,
}

impl ResponseInfo {
    pub fn from_response(resp: &Response) -> Self {
        Self {
            status_code: resp.status().as_u16(),
            response_headers: resp.headers().clone(),
        }
    }

    #[cfg(test)]
    fn new(status_code: u16, response_headers: HeaderMap) -> Self {
        Self {
            status_code,
            response_headers,
        }
    }

    pub fn is_successful(&self) -> bool {
        (200..=299).contains(&self.status_code)
    }

    pub fn is_partial(&self) -> bool {
        self.status_code == 206
    }

    fn content_length(&self) -> Option<u64> {
        self.response_headers
            .get(CONTENT_LENGTH)
            .and_then(|val| val.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    }

    /// Extracts the content range value from the response headers.
    pub fn content_range(&self) -> Option<ContentRange> {
        self.response_headers
            .get(CONTENT_RANGE)
            .and_then(|val| val.to_str().ok())
            .and_then(|header| {
                CONTENT_RANGE_RE.captures(header).and_then(|caps| {
                    let start = caps.get(1)?.as_str().parse().ok()?;
                    let end = caps.get(2)?.as_str().parse().ok()?;
                    let total = match caps.get(3)?.as_str() {
                        "*" => None,
                        n => n.parse().ok(),
                    };
                    Some(ContentRange { start, end, total })
                })
            })
    }

    /// Total declared size of the resource for a transfer that started at
    /// `resume_offset`. A partial response declares the full size in its
    /// `Content-Range`; a partial response without one declares only the
    /// bytes still to come in `Content-Length`, so the offset is added back.
    /// A full (200) response restarts from byte zero no matter what was
    /// requested, so its `Content-Length` is taken as-is. `None` when the
    /// server declares nothing usable.
    pub fn declared_total(&self, resume_offset: u64) -> Option<u64> {
        if let Some(range) = self.content_range()
            && range.total.is_some()
        {
            return range.total;
        }
        let offset = if self.is_partial() { resume_offset } else { 0 };
        self.content_length().map(|len| len + offset)
    }
}
