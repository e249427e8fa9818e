//! Diagnostics shared by every layer of the reader.
//!
//! Every problem found while reading a document is described by an [`XmlError`].
//! Errors are routed through [`XmlDiagnostics`], which applies the severity policy:
//! warnings never stop the parse, errors stop it unless a registered
//! [`XmlErrorHandler`] absorbs them, and fatal errors always stop it.

use std::{
    borrow::Cow,
    cell::RefCell,
    fmt::{self, Display},
    rc::Rc,
};

/// The maximum number of diagnostics routed to a handler for one parse.
pub const XML_MAX_ERRORS: usize = 100;

macro_rules! impl_xml_parser_errors {
    ( $( $variant:ident $( = $default:literal )? ),* ) => {
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum XmlParserErrors {
            $(
                $variant $( = $default )?
            ),*
        }

        impl TryFrom<i32> for XmlParserErrors {
            type Error = anyhow::Error;
            fn try_from(value: i32) -> Result<Self, Self::Error> {
                $(
                    if value == Self:: $variant as i32 {
                        return Ok(Self:: $variant);
                    }
                )*
                Err(anyhow::anyhow!("Invalid convert from value '{value}' to {}", std::any::type_name::<Self>()))
            }
        }

        impl Default for XmlParserErrors {
            fn default() -> Self {
                Self::XmlErrOK
            }
        }
    };
}
impl_xml_parser_errors!(
    XmlErrOK = 0,
    XmlErrInternalError = 1,
    XmlErrNoMemory = 2,
    XmlErrDocumentStart = 3,
    XmlErrDocumentEmpty = 4,
    XmlErrDocumentEnd = 5,
    XmlErrInvalidHexCharRef = 6,
    XmlErrInvalidDecCharRef = 7,
    XmlErrInvalidCharRef = 8,
    XmlErrInvalidChar = 9,
    XmlErrEntityRefNoName = 22,
    XmlErrEntityRefSemicolMissing = 23,
    XmlErrPERefNoName = 24,
    XmlErrPERefSemicolMissing = 25,
    XmlErrUndeclaredEntity = 26,
    XmlWarUndeclaredEntity = 27,
    XmlErrUnparsedEntity = 28,
    XmlErrEntityIsExternal = 29,
    XmlErrEntityIsParameter = 30,
    XmlErrUnknownEncoding = 31,
    XmlErrUnsupportedEncoding = 32,
    XmlErrNsDeclError = 35,
    XmlErrLtInAttribute = 38,
    XmlErrAttributeNotStarted = 39,
    XmlErrAttributeNotFinished = 40,
    XmlErrAttributeWithoutValue = 41,
    XmlErrAttributeRedefined = 42,
    XmlErrLiteralNotStarted = 43,
    XmlErrLiteralNotFinished = 44,
    XmlErrCommentNotFinished = 45,
    XmlErrPINotStarted = 46,
    XmlErrPINotFinished = 47,
    XmlErrNotationNotStarted = 48,
    XmlErrNotationNotFinished = 49,
    XmlErrAttlistNotStarted = 50,
    XmlErrAttlistNotFinished = 51,
    XmlErrMixedNotStarted = 52,
    XmlErrMixedNotFinished = 53,
    XmlErrElemcontentNotStarted = 54,
    XmlErrElemcontentNotFinished = 55,
    XmlErrXMLDeclNotStarted = 56,
    XmlErrXMLDeclNotFinished = 57,
    XmlErrCondsecNotStarted = 58,
    XmlErrCondsecNotFinished = 59,
    XmlErrExtSubsetNotFinished = 60,
    XmlErrDoctypeNotFinished = 61,
    XmlErrMisplacedCDATAEnd = 62,
    XmlErrCDATANotFinished = 63,
    XmlErrReservedXmlName = 64,
    XmlErrSpaceRequired = 65,
    XmlErrSeparatorRequired = 66,
    XmlErrNmtokenRequired = 67,
    XmlErrNameRequired = 68,
    XmlErrPCDATARequired = 69,
    XmlErrURIRequired = 70,
    XmlErrPubidRequired = 71,
    XmlErrLtRequired = 72,
    XmlErrGtRequired = 73,
    XmlErrLtSlashRequired = 74,
    XmlErrEqualRequired = 75,
    XmlErrTagNameMismatch = 76,
    XmlErrTagNotFinished = 77,
    XmlErrStandaloneValue = 78,
    XmlErrEncodingName = 79,
    XmlErrHyphenInComment = 80,
    XmlErrInvalidEncoding = 81,
    XmlErrCondsecInvalid = 83,
    XmlErrValueRequired = 84,
    XmlErrNotWellBalanced = 85,
    XmlErrExtraContent = 86,
    XmlErrEntityPEInternal = 88,
    XmlErrEntityLoop = 89,
    XmlErrEntityBoundary = 90,
    XmlErrInvalidURI = 91,
    XmlErrCondsecInvalidKeyword = 95,
    XmlErrVersionMissing = 96,
    XmlWarUnknownVersion = 97,
    XmlWarLangValue = 98,
    XmlErrMissingEncoding = 101,
    XmlWarSpaceValue = 102,
    XmlErrUnknownVersion = 108,
    XmlErrUserStop = 111,
    XmlNsErrXmlNamespace = 200,
    XmlNsErrUndefinedNamespace = 201,
    XmlNsErrQname = 202,
    XmlNsErrAttributeRedefined = 203,
    XmlNsErrEmpty = 204,
    XmlNsErrColon = 205,
    XmlDTDAttributeDefault = 500,
    XmlDTDAttributeRedefined = 501,
    XmlDTDAttributeValue = 502,
    XmlDTDContentError = 503,
    XmlDTDContentModel = 504,
    XmlDTDContentNotDeterminist = 505,
    XmlDTDElemRedefined = 509,
    XmlDTDEmptyNotation = 510,
    XmlDTDEntityType = 511,
    XmlDTDIDFixed = 512,
    XmlDTDIDRedefined = 513,
    XmlDTDInvalidChild = 515,
    XmlDTDInvalidDefault = 516,
    XmlDTDLoadError = 517,
    XmlDTDMissingAttribute = 518,
    XmlDTDMultipleID = 520,
    XmlDTDNoDTD = 522,
    XmlDTDNoRoot = 525,
    XmlDTDNotationRedefined = 526,
    XmlDTDNotationValue = 527,
    XmlDTDNotEmpty = 528,
    XmlDTDNotPCDATA = 529,
    XmlDTDRootName = 531,
    XmlDTDUnknownAttribute = 533,
    XmlDTDUnknownElem = 534,
    XmlDTDUnknownEntity = 535,
    XmlDTDUnknownID = 536,
    XmlDTDUnknownNotation = 537,
    XmlDTDDupToken = 541,
    XmlIOEncoder = 1544,
    XmlIOLoadError = 1549,
    XmlXIncludeRecursion = 1600,
    XmlXIncludeParseValue = 1601,
    XmlXIncludeNoHref = 1603,
    XmlXIncludeNoFallback = 1604,
    XmlXIncludeHrefURI = 1605,
    XmlXIncludeTextFragment = 1606,
    XmlXIncludeTextDocument = 1607,
    XmlXIncludeInvalidChar = 1608,
    XmlXIncludeUnknownEncoding = 1610,
    XmlXIncludeXPtrFailed = 1612,
    XmlXIncludeIncludeInInclude = 1614,
    XmlXIncludeFallbacksInInclude = 1615,
    XmlXIncludeFallbackNotInInclude = 1616
);

impl XmlParserErrors {
    /// Check if this code is the `XmlErrOK`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::XmlErrOK)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum XmlErrorLevel {
    #[default]
    XmlErrNone = 0,
    /// A simple warning
    XmlErrWarning = 1,
    /// A recoverable error
    XmlErrError = 2,
    /// A fatal error
    XmlErrFatal = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlErrorDomain {
    #[default]
    XmlFromNone = 0,
    /// The XML parser
    XmlFromParser,
    /// The XML Namespace module
    XmlFromNamespace,
    /// The XML DTD validation with parser context
    XmlFromDTD,
    /// The Input/Output stack
    XmlFromIO,
    /// The XInclude processing
    XmlFromXInclude,
    /// The XML DTD validation with valid context
    XmlFromValid,
    /// The module handling character conversion
    XmlFromI18N,
    /// The name dictionary
    XmlFromDict,
}

impl XmlErrorDomain {
    fn prefix(&self) -> &'static str {
        match self {
            Self::XmlFromNone => "",
            Self::XmlFromParser => "parser ",
            Self::XmlFromNamespace => "namespace ",
            Self::XmlFromDTD | Self::XmlFromValid => "validity ",
            Self::XmlFromIO => "I/O ",
            Self::XmlFromXInclude => "XInclude ",
            Self::XmlFromI18N => "encoding ",
            Self::XmlFromDict => "dictionary ",
        }
    }
}

/// The kind of a diagnostic, independent of which module raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlErrorKind {
    /// Malformed markup. Always fatal.
    WellFormedness,
    /// A DTD constraint violation.
    Validity,
    /// Redeclarations and orphaned declarations. Always recoverable.
    ValidityWarning,
    /// An inclusion target could not be reached or read.
    Resource,
    /// A broken invariant inside the reader itself.
    Internal,
}

/// A diagnostic with its location and the names or values it is about.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlError {
    pub domain: XmlErrorDomain,
    pub code: XmlParserErrors,
    pub message: Option<Cow<'static, str>>,
    pub level: XmlErrorLevel,
    /// The URI of the entity being read when the problem was found.
    pub file: Option<Cow<'static, str>>,
    pub line: usize,
    pub col: usize,
    pub str1: Option<Cow<'static, str>>,
    pub str2: Option<Cow<'static, str>>,
    pub str3: Option<Cow<'static, str>>,
}

impl XmlError {
    pub fn new(
        domain: XmlErrorDomain,
        code: XmlParserErrors,
        level: XmlErrorLevel,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            domain,
            code,
            level,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Attach the structured parameters of the diagnostic.
    pub fn with_params(
        mut self,
        str1: Option<&str>,
        str2: Option<&str>,
        str3: Option<&str>,
    ) -> Self {
        self.str1 = str1.map(|s| Cow::Owned(s.to_owned()));
        self.str2 = str2.map(|s| Cow::Owned(s.to_owned()));
        self.str3 = str3.map(|s| Cow::Owned(s.to_owned()));
        self
    }

    /// Attach the location of the diagnostic.
    pub fn with_location(mut self, file: Option<&str>, line: usize, col: usize) -> Self {
        self.file = file.map(|f| Cow::Owned(f.to_owned()));
        self.line = line;
        self.col = col;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.level == XmlErrorLevel::XmlErrFatal
    }

    /// Classify this diagnostic.
    pub fn kind(&self) -> XmlErrorKind {
        use XmlErrorDomain::*;
        if matches!(
            self.code,
            XmlParserErrors::XmlErrInternalError | XmlParserErrors::XmlErrNoMemory
        ) || self.domain == XmlFromDict
        {
            return XmlErrorKind::Internal;
        }
        match self.domain {
            XmlFromIO | XmlFromXInclude if self.level != XmlErrorLevel::XmlErrFatal => {
                XmlErrorKind::Resource
            }
            XmlFromValid | XmlFromDTD if self.level == XmlErrorLevel::XmlErrWarning => {
                XmlErrorKind::ValidityWarning
            }
            XmlFromValid | XmlFromDTD => XmlErrorKind::Validity,
            _ if self.level == XmlErrorLevel::XmlErrWarning => XmlErrorKind::ValidityWarning,
            _ => XmlErrorKind::WellFormedness,
        }
    }
}

impl Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = self.file.as_deref() {
            write!(f, "{file}:{}:{}: ", self.line, self.col)?;
        } else if self.line != 0 {
            write!(f, "Entity: line {}:{}: ", self.line, self.col)?;
        }
        let level = match self.level {
            XmlErrorLevel::XmlErrNone => "",
            XmlErrorLevel::XmlErrWarning => "warning",
            XmlErrorLevel::XmlErrError => "error",
            XmlErrorLevel::XmlErrFatal => "error",
        };
        write!(f, "{}{level} : ", self.domain.prefix())?;
        match self.message.as_deref() {
            Some(msg) => write!(f, "{}", msg.trim_end()),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl std::error::Error for XmlError {}

/// Receiver of the diagnostics produced during a parse.
pub trait XmlErrorHandler {
    /// A warning. Parsing always continues.
    fn warning(&mut self, error: &XmlError);

    /// A recoverable error.
    ///
    /// Returning `Ok(())` absorbs the error and parsing continues.
    /// Returning `Err` promotes it to a fatal error and stops the parse.
    fn error(&mut self, error: XmlError) -> Result<(), XmlError>;

    /// A fatal error. Parsing has already been stopped.
    fn fatal_error(&mut self, error: &XmlError);

    /// A broken invariant inside the reader. Parsing has already been stopped.
    fn internal_error(&mut self, error: &XmlError) {
        self.fatal_error(error);
    }
}

/// An error handler that absorbs every diagnostic and keeps it.
///
/// The collected list is shared, so a clone of the collector can be kept
/// by the caller after the original is moved into a reader.
#[derive(Debug, Clone, Default)]
pub struct XmlErrorCollector {
    errors: Rc<RefCell<Vec<XmlError>>>,
}

impl XmlErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every diagnostic received so far.
    pub fn errors(&self) -> Vec<XmlError> {
        self.errors.borrow().clone()
    }

    /// The diagnostics of the given kind, in reporting order.
    pub fn of_kind(&self, kind: XmlErrorKind) -> Vec<XmlError> {
        self.errors
            .borrow()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// The diagnostics carrying the given code, in reporting order.
    pub fn with_code(&self, code: XmlParserErrors) -> Vec<XmlError> {
        self.errors
            .borrow()
            .iter()
            .filter(|e| e.code == code)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.errors.borrow_mut().clear();
    }
}

impl XmlErrorHandler for XmlErrorCollector {
    fn warning(&mut self, error: &XmlError) {
        self.errors.borrow_mut().push(error.clone());
    }

    fn error(&mut self, error: XmlError) -> Result<(), XmlError> {
        self.errors.borrow_mut().push(error);
        Ok(())
    }

    fn fatal_error(&mut self, error: &XmlError) {
        self.errors.borrow_mut().push(error.clone());
    }
}

/// Applies the severity policy and routes diagnostics to the registered handler.
#[derive(Default)]
pub struct XmlDiagnostics {
    handler: Option<Box<dyn XmlErrorHandler>>,
    pub(crate) no_warning: bool,
    nb_errors: usize,
    nb_warnings: usize,
    last_error: Option<XmlError>,
}

impl XmlDiagnostics {
    pub fn set_handler(&mut self, handler: Option<Box<dyn XmlErrorHandler>>) {
        self.handler = handler;
    }

    pub fn nb_errors(&self) -> usize {
        self.nb_errors
    }

    pub fn nb_warnings(&self) -> usize {
        self.nb_warnings
    }

    /// The last error or fatal error reported.
    pub fn last_error(&self) -> Option<&XmlError> {
        self.last_error.as_ref()
    }

    pub(crate) fn reset(&mut self) {
        self.nb_errors = 0;
        self.nb_warnings = 0;
        self.last_error = None;
    }

    /// Route `error` according to its severity.
    ///
    /// Returns `Err` with the diagnostic that must stop the parse, if any.
    pub fn report(&mut self, error: XmlError) -> Result<(), XmlError> {
        match error.level {
            XmlErrorLevel::XmlErrWarning => {
                self.nb_warnings += 1;
                if self.no_warning {
                    log::debug!("{error}");
                    return Ok(());
                }
                match self.handler.as_mut() {
                    Some(handler) if self.nb_warnings <= XML_MAX_ERRORS => handler.warning(&error),
                    _ => log::warn!("{error}"),
                }
                Ok(())
            }
            XmlErrorLevel::XmlErrError => {
                self.nb_errors += 1;
                self.last_error = Some(error.clone());
                match self.handler.as_mut() {
                    Some(handler) if self.nb_errors <= XML_MAX_ERRORS => handler.error(error),
                    Some(_) => {
                        log::warn!("{error}");
                        Ok(())
                    }
                    None => Err(error),
                }
            }
            XmlErrorLevel::XmlErrFatal | XmlErrorLevel::XmlErrNone => {
                self.nb_errors += 1;
                self.last_error = Some(error.clone());
                if error.kind() == XmlErrorKind::Internal {
                    log::error!("{error}");
                    if let Some(handler) = self.handler.as_mut() {
                        handler.internal_error(&error);
                    }
                } else if let Some(handler) = self.handler.as_mut() {
                    handler.fatal_error(&error);
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validity_error(code: XmlParserErrors) -> XmlError {
        XmlError::new(
            XmlErrorDomain::XmlFromValid,
            code,
            XmlErrorLevel::XmlErrError,
            "ID x already defined",
        )
    }

    #[test]
    fn error_without_handler_stops() {
        let mut diag = XmlDiagnostics::default();
        let res = diag.report(validity_error(XmlParserErrors::XmlDTDIDRedefined));
        assert!(res.is_err());
        assert_eq!(diag.nb_errors(), 1);
    }

    #[test]
    fn collector_absorbs_errors() {
        let collector = XmlErrorCollector::new();
        let mut diag = XmlDiagnostics::default();
        diag.set_handler(Some(Box::new(collector.clone())));
        assert!(
            diag.report(validity_error(XmlParserErrors::XmlDTDIDRedefined))
                .is_ok()
        );
        let warning = XmlError::new(
            XmlErrorDomain::XmlFromValid,
            XmlParserErrors::XmlDTDAttributeRedefined,
            XmlErrorLevel::XmlErrWarning,
            "Attribute a of element e: already defined",
        );
        assert!(diag.report(warning).is_ok());
        assert_eq!(collector.len(), 2);
        assert_eq!(collector.of_kind(XmlErrorKind::ValidityWarning).len(), 1);
    }

    #[test]
    fn silenced_warnings_are_still_counted() {
        let collector = XmlErrorCollector::new();
        let mut diag = XmlDiagnostics::default();
        diag.set_handler(Some(Box::new(collector.clone())));
        diag.no_warning = true;
        let warning = XmlError::new(
            XmlErrorDomain::XmlFromParser,
            XmlParserErrors::XmlWarUndeclaredEntity,
            XmlErrorLevel::XmlErrWarning,
            "Entity 'e' not defined",
        );
        assert!(diag.report(warning).is_ok());
        assert_eq!(diag.nb_warnings(), 1);
        assert!(collector.is_empty());
    }

    #[test]
    fn fatal_always_stops() {
        let collector = XmlErrorCollector::new();
        let mut diag = XmlDiagnostics::default();
        diag.set_handler(Some(Box::new(collector.clone())));
        let fatal = XmlError::new(
            XmlErrorDomain::XmlFromParser,
            XmlParserErrors::XmlErrTagNameMismatch,
            XmlErrorLevel::XmlErrFatal,
            "Opening and ending tag mismatch: a and b",
        );
        assert!(diag.report(fatal).is_err());
        assert_eq!(
            collector.errors()[0].kind(),
            XmlErrorKind::WellFormedness
        );
    }

    #[test]
    fn error_code_conversion() {
        assert_eq!(
            XmlParserErrors::try_from(513).unwrap(),
            XmlParserErrors::XmlDTDIDRedefined
        );
        assert!(XmlParserErrors::try_from(-1).is_err());
    }

    #[test]
    fn display_format() {
        let err = validity_error(XmlParserErrors::XmlDTDIDRedefined)
            .with_location(Some("doc.xml"), 3, 7);
        assert_eq!(
            err.to_string(),
            "doc.xml:3:7: validity error : ID x already defined"
        );
    }
}
