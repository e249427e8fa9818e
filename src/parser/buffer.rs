//! Coalescing of character data.
//!
//! Scanners report text in fragments split at arbitrary points. The buffer
//! joins them into one run per stretch of text between two structural
//! events, and classifies the run once it is flushed.

use crate::chvalid::xml_is_whitespace_only;

/// How a flushed run is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlTextKind {
    Characters,
    IgnorableWhitespace,
}

/// A logical run of character data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlTextRun {
    pub text: String,
    pub kind: XmlTextKind,
    pub whitespace_only: bool,
    /// The run comes from a CDATA section.
    pub cdata: bool,
}

/// Accumulates text fragments until the next structural event.
#[derive(Debug, Default)]
pub struct XmlCharBuffer {
    text: String,
    cdata: bool,
}

impl XmlCharBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check whether the pending run is whitespace only.
    ///
    /// An empty buffer counts as whitespace.
    pub fn is_whitespace_only(&self) -> bool {
        xml_is_whitespace_only(&self.text)
    }

    pub fn is_cdata(&self) -> bool {
        self.cdata
    }

    /// Mark whether following fragments are inside a CDATA section.
    pub fn set_cdata(&mut self, cdata: bool) {
        self.cdata = cdata;
    }

    /// Take the pending run.
    ///
    /// A whitespace-only run outside CDATA becomes ignorable unless
    /// `preserve` is set. Returns `None` if nothing is pending.
    pub fn flush(&mut self, preserve: bool) -> Option<XmlTextRun> {
        if self.text.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        let whitespace_only = xml_is_whitespace_only(&text);
        let kind = if whitespace_only && !preserve && !self.cdata {
            XmlTextKind::IgnorableWhitespace
        } else {
            XmlTextKind::Characters
        };
        Some(XmlTextRun {
            text,
            kind,
            whitespace_only,
            cdata: self.cdata,
        })
    }

    /// Drop the pending run.
    pub fn clear(&mut self) {
        self.text.clear();
        self.cdata = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_are_joined() {
        let mut buf = XmlCharBuffer::new();
        assert!(buf.flush(true).is_none());
        buf.write("hel");
        buf.write("lo ");
        buf.write("world");
        let run = buf.flush(false).unwrap();
        assert_eq!(run.text, "hello world");
        assert_eq!(run.kind, XmlTextKind::Characters);
        assert!(!run.whitespace_only);
        assert!(buf.is_empty());
    }

    #[test]
    fn whitespace_policy() {
        let mut buf = XmlCharBuffer::new();
        buf.write("\n  ");
        buf.write("\t");
        assert!(buf.is_whitespace_only());
        let run = buf.flush(false).unwrap();
        assert_eq!(run.kind, XmlTextKind::IgnorableWhitespace);
        assert_eq!(run.text, "\n  \t");

        buf.write("  ");
        assert_eq!(buf.flush(true).unwrap().kind, XmlTextKind::Characters);

        buf.set_cdata(true);
        buf.write("  ");
        let run = buf.flush(false).unwrap();
        assert_eq!(run.kind, XmlTextKind::Characters);
        assert!(run.cdata);
    }
}
