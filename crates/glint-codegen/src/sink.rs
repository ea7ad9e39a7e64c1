//! Output sink with two write modes.

use crate::escape::escape_into;

/// Destination of rendered output.
///
/// Literal template text and `{{ raw }}` output go through `write_raw`;
/// `{{ expr }}` output goes through `write_escaped`.
pub trait OutputSink {
    fn write_raw(&mut self, text: &str);

    fn write_escaped(&mut self, text: &str) {
        self.write_raw(&crate::escape::escape(text));
    }
}

/// In-memory sink that collects HTML into a `String`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlBuffer {
    buf: String,
}

impl HtmlBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl OutputSink for HtmlBuffer {
    fn write_raw(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    fn write_escaped(&mut self, text: &str) {
        escape_into(&mut self.buf, text);
    }
}
