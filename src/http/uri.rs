//! Request-target / URI parsing and path normalization.
//!
//! Supersedes the old zero-copy-only `Url` (raw `target`/`path`/`query`
//! slices, no decoding) with a type that additionally understands the
//! absolute-form and authority-form request targets a proxying client can
//! receive, and normalizes the path the way a filesystem-backed handler
//! needs it normalized.

use crate::{
    errors::ErrorKind,
    limits::ReqLimits,
    util::{argmap::ArgMap, bytes},
};

/// A parsed request-target.
///
/// `path_original` retains the raw, percent-encoded, non-normalized path
/// exactly as received; `path` is the normalized form described in the
/// type-level docs of [`crate::http::request::Request::uri`]. Segment
/// ranges index into the *normalized* `path` buffer, which this type owns
/// (normalization can shrink or reorder bytes, so unlike the rest of the
/// zero-copy request it cannot alias the connection's read buffer).
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Uri {
    scheme: Option<Vec<u8>>,
    host: Option<Vec<u8>>,
    target: &'static [u8],
    path_original: &'static [u8],
    path: Vec<u8>,
    segments: Vec<(usize, usize)>,
    query: Option<&'static [u8]>,
    fragment: Option<&'static [u8]>,
    query_args: Option<ArgMap>,
}

impl Uri {
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Self {
            scheme: None,
            host: None,
            target: b"",
            path_original: b"",
            path: Vec::with_capacity(limits.url_size),
            segments: Vec::with_capacity(limits.url_parts),
            query: None,
            fragment: None,
            query_args: None,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.scheme = None;
        self.host = None;
        self.target = b"";
        self.path_original = b"";
        self.path.clear();
        self.segments.clear();
        self.query = None;
        self.fragment = None;
        self.query_args = None;
    }

    /// Parses `target` (the request-line request-target, `'static` because
    /// it is a slice of the connection's reused parse buffer) into scheme,
    /// host, path, query and fragment.
    ///
    /// Accepts a raw path (`/a/b`), a scheme-less authority path
    /// (`//host/a/b`), or absolute form (`scheme://host/a/b`).
    pub(crate) fn parse(&mut self, target: &'static [u8]) -> Result<(), ErrorKind> {
        self.clear();
        self.target = target;

        let mut rest = target;

        if let Some(scheme_end) = find_scheme_end(rest) {
            self.scheme = Some(lower(&rest[..scheme_end]));
            rest = &rest[scheme_end + 3..]; // skip "://"
        }

        if rest.starts_with(b"//") {
            rest = &rest[2..];
            let host_end = rest.iter().position(|&b| b == b'/').unwrap_or(rest.len());
            self.host = Some(lower(&rest[..host_end]));
            rest = &rest[host_end..];
            if rest.is_empty() {
                rest = b"/";
            }
        }

        if rest.is_empty() || rest[0] != b'/' {
            return Err(ErrorKind::InvalidUrl);
        }

        // Fragment is always the last component (path?query#fragment);
        // split it off first, then split the remainder on the first '?'.
        let (before_frag, frag_part) = split_first(rest, b'#');
        let (path_part, query_part) = split_first(before_frag, b'?');

        self.path_original = path_part;
        self.path = normalize_path(path_part);
        self.segments = compute_segments(&self.path);

        if !query_part.is_empty() {
            self.query = Some(query_part);
        }
        if !frag_part.is_empty() {
            self.fragment = Some(&frag_part[1..]);
        }

        Ok(())
    }

    pub fn scheme(&self) -> Option<&[u8]> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&[u8]> {
        self.host.as_deref()
    }

    pub const fn target(&self) -> &[u8] {
        self.target
    }

    /// The raw, percent-encoded, non-normalized path as received.
    pub const fn path_original(&self) -> &[u8] {
        self.path_original
    }

    /// The normalized path: percent-decoded, collapsed slashes, dot-segments
    /// resolved, never escaping the root.
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn path_segment(&self, index: usize) -> Option<&[u8]> {
        self.segments.get(index).map(|&(s, e)| &self.path[s..e])
    }

    pub fn path_segments(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(|&(s, e)| &self.path[s..e])
    }

    pub fn matches(&self, pattern: &[&[u8]]) -> bool {
        self.segments.len() == pattern.len() && self.path_segments().eq(pattern.iter().copied())
    }

    pub fn starts_with(&self, pattern: &[&[u8]]) -> bool {
        pattern.len() <= self.segments.len() && self.path_segments().take(pattern.len()).eq(pattern.iter().copied())
    }

    pub fn ends_with(&self, pattern: &[&[u8]]) -> bool {
        if pattern.len() > self.segments.len() {
            return false;
        }
        let skip = self.segments.len() - pattern.len();
        self.path_segments().skip(skip).eq(pattern.iter().copied())
    }

    pub const fn query_full(&self) -> Option<&[u8]> {
        self.query
    }

    pub const fn fragment(&self) -> Option<&[u8]> {
        self.fragment
    }

    /// Lazily parses and returns the query-string arguments on first
    /// access; subsequent calls reuse the cached `ArgMap`.
    pub fn query_args(&mut self, limits: &ReqLimits) -> Result<&ArgMap, ErrorKind> {
        if self.query_args.is_none() {
            let mut map = ArgMap::with_capacity(limits.url_query_parts);
            if let Some(q) = self.query {
                let body = if q.first() == Some(&b'?') { &q[1..] } else { q };
                parse_query_into(body, limits.url_query_parts, &mut map)?;
            }
            self.query_args = Some(map);
        }
        Ok(self.query_args.as_ref().unwrap())
    }
}

/// Lowercases `src` into an owned buffer. Scheme and host are small
/// (typically under 64 bytes), so the allocation is cheap relative to the
/// case-insensitive comparisons it saves callers from redoing.
fn lower(src: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    out.copy_from_slice(src);
    out.make_ascii_lowercase();
    out
}

fn find_scheme_end(src: &[u8]) -> Option<usize> {
    let colon = src.iter().position(|&b| b == b':')?;
    if colon == 0 {
        return None;
    }
    let scheme = &src[..colon];
    if !scheme
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
    {
        return None;
    }
    if src.get(colon + 1..colon + 3) == Some(b"//") {
        Some(colon)
    } else {
        None
    }
}

fn split_first(src: &[u8], needle: u8) -> (&[u8], &[u8]) {
    match src.iter().position(|&b| b == needle) {
        Some(pos) => (&src[..pos], &src[pos..]),
        None => (src, &[]),
    }
}

/// Percent-decodes (no `+`-conversion) and resolves `.`/`..` segments,
/// collapsing duplicate slashes, never climbing above the root.
fn normalize_path(raw: &[u8]) -> Vec<u8> {
    let mut slashed = Vec::with_capacity(raw.len());
    for &b in raw {
        slashed.push(if b == b'\\' { b'/' } else { b });
    }

    let mut decoded = Vec::with_capacity(slashed.len());
    bytes::percent_decode(&slashed, false, &mut decoded);

    let mut stack: Vec<&[u8]> = Vec::new();
    for segment in decoded.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }

    let mut out = Vec::with_capacity(decoded.len() + 1);
    for segment in &stack {
        out.push(b'/');
        out.extend_from_slice(segment);
    }
    if out.is_empty() {
        out.push(b'/');
    }
    out
}

fn compute_segments(path: &[u8]) -> Vec<(usize, usize)> {
    let mut segments = Vec::new();
    let body = if path.first() == Some(&b'/') { &path[1..] } else { path };
    if body.is_empty() {
        return segments;
    }
    let base = path.len() - body.len();
    let mut start = base;
    for (i, &b) in body.iter().enumerate() {
        if b == b'/' {
            segments.push((start, base + i));
            start = base + i + 1;
        }
    }
    segments.push((start, path.len()));
    segments
}

fn parse_query_into(body: &'static [u8], limit: usize, map: &mut ArgMap) -> Result<(), ErrorKind> {
    if body.is_empty() {
        return Ok(());
    }
    for pair in body.split(|&b| b == b'&') {
        if pair.is_empty() {
            continue;
        }
        if map.len() >= limit {
            return Err(ErrorKind::Query(crate::http::query::Error::OverLimit(limit)));
        }
        let (k, v) = match pair.iter().position(|&b| b == b'=') {
            Some(pos) => (&pair[..pos], &pair[pos + 1..]),
            None => (pair, &b""[..]),
        };
        map.add(k, v);
    }
    Ok(())
}
