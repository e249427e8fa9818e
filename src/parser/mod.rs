//! The incremental, namespace-aware reader.
//!
//! Bytes go through a token-level [`XmlScanner`] (the built-in one is
//! [`XmlTextScanner`]), whose events are turned by the engine core into
//! [`XmlEvent`]s for a chain of [`XmlFilter`]s. Along the way the core
//! expands entities on a stack of contexts, checks the document against its
//! DTD, fixes up xml:base and xml:lang at entity boundaries and applies the
//! whitespace policy.
//!
//! [`XmlReader`] drives all of this, in one call or chunk by chunk, and can
//! suspend after every event.

mod buffer;
mod context;
mod entity;
mod filter;
mod handler;
mod push;
pub mod sax;
mod scan;
mod strip;
mod valid;
#[cfg(feature = "xinclude")]
mod xinclude;

pub use buffer::{XmlCharBuffer, XmlTextKind, XmlTextRun};
pub use context::{XmlContextKind, XmlContextState, XmlParseContext, XmlParserCtxt};
pub use entity::{XmlEntityResolver, XmlFileResolver, XmlInputSource, XmlMemoryResolver};
pub use filter::{
    XmlAttribute, XmlEvent, XmlEventCollector, XmlFilter, XmlFilterAction, XmlFilterChain,
};
pub use push::{XmlEventReader, XmlReader};
pub use sax::{
    XmlSAXLocator, XmlScanControl, XmlScanEvent, XmlScanHandler, XmlScanMode, XmlScanStatus,
    XmlScanner,
};
pub use scan::XmlTextScanner;
pub use strip::{XmlWhitespaceRule, XmlWhitespaceRules};

/// Options of the reader, combined as a bit set.
#[doc(alias = "xmlParserOption")]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlParserOption {
    /// Validate with the DTD
    XmlParseDTDValid = 1 << 4,
    /// Suppress warning reports
    XmlParseNoWarning = 1 << 6,
    /// Implement XInclude substitution
    XmlParseXInclude = 1 << 10,
    /// Do not fixup XInclude and entity xml:base URIs
    XmlParseNoBaseFix = 1 << 18,
    /// Do not load external parameter entities or the external subset
    XmlParseNoExtPE = 1 << 25,
}

/// Where a parse stands after a call to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlParseStatus {
    /// Waiting for more input.
    Parsing,
    /// Suspended after an event; [`XmlReader::resume`] continues.
    Suspended,
    Finished,
    /// Aborted by [`XmlReader::stop`].
    Stopped,
}
