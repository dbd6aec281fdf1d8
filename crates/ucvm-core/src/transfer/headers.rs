//! Track the Content-Length of the final response while curl follows redirects.

use std::cell::Cell;

/// Fed raw header lines from curl's header callback. A status line starts a
/// new response (redirect hop), so the length seen so far is discarded.
#[derive(Debug, Default)]
pub(crate) struct ResponseHeaders {
    content_length: Cell<Option<u64>>,
}

impl ResponseHeaders {
    pub(crate) fn observe(&self, raw: &[u8]) {
        let line = match std::str::from_utf8(raw) {
            Ok(l) => l.trim(),
            Err(_) => return,
        };
        if line.starts_with("HTTP/") {
            self.content_length.set(None);
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.trim().parse::<u64>() {
                    self.content_length.set(Some(n));
                }
            }
        }
    }

    /// Content-Length of the current response, 0 if unknown.
    pub(crate) fn total(&self) -> u64 {
        self.content_length.get().unwrap_or(0)
    }
}
