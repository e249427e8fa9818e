//! An incremental, namespace-aware XML reader.
//!
//! Documents are read in chunks or all at once and reported as a stream of
//! [`parser::XmlEvent`]s to a chain of filters. The reader expands entities,
//! validates against the DTD with content models compiled to DFAs, performs
//! XInclude substitution and fixes up xml:base and xml:lang where content
//! crosses entity boundaries.
//!
//! ```
//! use exml_reader::parser::{XmlEvent, XmlReader};
//!
//! let reader = XmlReader::new();
//! let names = reader
//!     .events(&b"<a><b/></a>"[..])
//!     .filter_map(|event| match event {
//!         Ok(XmlEvent::StartElement { name, .. }) => Some(name.local_name().to_string()),
//!         _ => None,
//!     })
//!     .collect::<Vec<_>>();
//! assert_eq!(names, ["a", "b"]);
//! ```

pub mod automata;
pub mod chvalid;
pub mod dict;
pub mod dtd;
pub mod encoding;
pub mod error;
pub mod parser;
pub mod uri;

pub use dict::{ExpandedName, XmlAtom, XmlDict};
pub use error::{XmlError, XmlErrorHandler, XmlErrorKind};
pub use parser::{XmlEvent, XmlFilter, XmlFilterAction, XmlParserOption, XmlReader};

/// The namespace bound to the `xml` prefix.
pub const XML_XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The namespace of namespace declarations.
pub const XML_XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
/// The XInclude namespace.
pub const XINCLUDE_NS: &str = "http://www.w3.org/2003/XInclude";
/// The XInclude namespace of the 2001 draft, still accepted.
pub const XINCLUDE_OLD_NS: &str = "http://www.w3.org/2001/XInclude";
