//! Input decoding: encoding detection, the decoders backed by `encoding_rs`,
//! and the registry of custom decoders consulted for unknown encodings.
//!
//! The reader only ever decodes. Input bytes are turned into UTF-8 text
//! with normalized line ends before the scanner sees them.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt::Display,
    str::{FromStr, from_utf8},
};

use encoding_rs::{Decoder, DecoderResult, Encoding, UTF_16BE, UTF_16LE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlCharEncoding {
    None = 0,
    UTF8,
    UTF16LE,
    UTF16BE,
    UCS4LE,
    UCS4BE,
    EBCDIC,
    ISO8859_1,
    ASCII,
}

impl XmlCharEncoding {
    pub fn get_name(&self) -> Option<&'static str> {
        match *self {
            Self::UTF8 => Some("UTF-8"),
            Self::UTF16LE => Some("UTF-16LE"),
            Self::UTF16BE => Some("UTF-16BE"),
            Self::UCS4LE => Some("UCS-4LE"),
            Self::UCS4BE => Some("UCS-4BE"),
            Self::EBCDIC => Some("EBCDIC"),
            Self::ISO8859_1 => Some("ISO-8859-1"),
            Self::ASCII => Some("US-ASCII"),
            Self::None => None,
        }
    }

    /// Check if the characters of markup are encoded as in ASCII.
    pub fn is_ascii_compatible(&self) -> bool {
        matches!(
            self,
            Self::None | Self::UTF8 | Self::ISO8859_1 | Self::ASCII
        )
    }
}

impl FromStr for XmlCharEncoding {
    type Err = EncodingError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_uppercase().as_str() {
            "" => Ok(Self::None),
            "UTF-8" | "UTF8" => Ok(Self::UTF8),
            "UTF-16" | "UTF16" | "UTF-16LE" => Ok(Self::UTF16LE),
            "UTF-16BE" => Ok(Self::UTF16BE),
            "ISO-10646-UCS-4" | "UCS-4" | "UCS4" | "UCS-4BE" => Ok(Self::UCS4BE),
            "UCS-4LE" => Ok(Self::UCS4LE),
            "ISO-8859-1" | "ISO-LATIN-1" | "ISO LATIN 1" | "LATIN1" => Ok(Self::ISO8859_1),
            "US-ASCII" | "ASCII" => Ok(Self::ASCII),
            "EBCDIC" => Ok(Self::EBCDIC),
            _ => Err(EncodingError::Other {
                msg: "No encoding matches.".into(),
            }),
        }
    }
}

pub enum XmlCharEncodingHandler {
    Predefined(PredefinedEncodingHandler),
    Custom(CustomEncodingHandler),
}

impl XmlCharEncodingHandler {
    /// Decode as much of `src` as possible, appending the text to `dst`.
    ///
    /// Returns the number of bytes consumed. An incomplete sequence at the
    /// end of `src` is left unread unless `last` is set.
    pub fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        last: bool,
    ) -> Result<usize, EncodingError> {
        match self {
            Self::Predefined(handler) => handler.decode(src, dst, last),
            Self::Custom(handler) => {
                let read = (handler.decode)(src, dst)?;
                if last && read < src.len() {
                    return Err(EncodingError::Malformed {
                        read: src.len(),
                        write: dst.len(),
                        length: src.len() - read,
                        offset: 0,
                    });
                }
                Ok(read)
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Predefined(handler) => handler.name(),
            Self::Custom(handler) => handler.name(),
        }
    }

    fn is_utf16(&self) -> bool {
        let name = self.name();
        name.eq_ignore_ascii_case("UTF-16LE") || name.eq_ignore_ascii_case("UTF-16BE")
    }
}

pub struct PredefinedEncodingHandler {
    name: &'static str,
    decoder: Decoder,
}

impl PredefinedEncodingHandler {
    pub fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        last: bool,
    ) -> Result<usize, EncodingError> {
        let mut read = 0;
        loop {
            if let Some(needed) = self
                .decoder
                .max_utf8_buffer_length_without_replacement(src.len() - read)
            {
                dst.reserve(needed);
            }
            let (res, r) = self
                .decoder
                .decode_to_string_without_replacement(&src[read..], dst, last);
            read += r;
            match res {
                DecoderResult::InputEmpty => return Ok(read),
                DecoderResult::OutputFull => dst.reserve(src.len() - read + 16),
                DecoderResult::Malformed(length, offset) => {
                    return Err(EncodingError::Malformed {
                        read,
                        write: dst.len(),
                        length: length as usize,
                        offset: offset as usize,
                    });
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl From<&'static Encoding> for PredefinedEncodingHandler {
    fn from(value: &'static Encoding) -> Self {
        Self {
            name: value.name(),
            decoder: value.new_decoder_without_bom_handling(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EncodingError {
    /// Malformed byte sequence is found.
    ///
    /// The input and output buffer have consumed `read` and `write` bytes respectively.
    /// Malformed sequence occurs `input[read-length-offset..read-offset]`.
    Malformed {
        read: usize,
        write: usize,
        length: usize,
        offset: usize,
    },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl EncodingError {
    pub fn malformed(&self) -> bool {
        matches!(self, EncodingError::Malformed { .. })
    }
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encoding Error: ")?;
        match self {
            Self::Malformed {
                read,
                length,
                offset,
                ..
            } => {
                let start = read.saturating_sub(length + offset);
                write!(
                    f,
                    "Malformed byte sequence occurs at {}..={}",
                    start,
                    (start + length).saturating_sub(1)
                )
            }
            Self::Other { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Decode the longest decodable prefix of `src` into `dst`.
///
/// Returns the number of bytes consumed. Bytes that may start a sequence
/// completed by later input must be left unread.
pub type DecoderFunc = fn(src: &[u8], dst: &mut String) -> Result<usize, EncodingError>;

#[derive(Debug, Clone)]
pub struct CustomEncodingHandler {
    /// the name of this encoding
    name: Cow<'static, str>,
    /// decode the byte sequece `src` of this encoding to the UTF-8 string `dst`.
    decode: DecoderFunc,
}

impl CustomEncodingHandler {
    pub fn new(name: &str, decode: DecoderFunc) -> Self {
        Self {
            name: name.to_uppercase().into(),
            decode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn decode_latin1(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    dst.extend(src.iter().map(|&b| b as char));
    Ok(src.len())
}

fn decode_ascii(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    if let Some(pos) = src.iter().position(|b| !b.is_ascii()) {
        dst.extend(src[..pos].iter().map(|&b| b as char));
        return Err(EncodingError::Malformed {
            read: pos + 1,
            write: dst.len(),
            length: 1,
            offset: 0,
        });
    }
    dst.extend(src.iter().map(|&b| b as char));
    Ok(src.len())
}

fn decode_ucs4(src: &[u8], dst: &mut String, be: bool) -> Result<usize, EncodingError> {
    let mut read = 0;
    for chunk in src.chunks_exact(4) {
        let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let code = if be {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        };
        let c = char::from_u32(code).ok_or(EncodingError::Malformed {
            read: read + 4,
            write: dst.len(),
            length: 4,
            offset: 0,
        })?;
        dst.push(c);
        read += 4;
    }
    Ok(read)
}

fn decode_ucs4be(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    decode_ucs4(src, dst, true)
}

fn decode_ucs4le(src: &[u8], dst: &mut String) -> Result<usize, EncodingError> {
    decode_ucs4(src, dst, false)
}

const ISO8859_1_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("ISO-8859-1"),
    decode: decode_latin1,
};

const ASCII_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("US-ASCII"),
    decode: decode_ascii,
};

const UCS4BE_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("UCS-4BE"),
    decode: decode_ucs4be,
};

const UCS4LE_HANDLER: CustomEncodingHandler = CustomEncodingHandler {
    name: Cow::Borrowed("UCS-4LE"),
    decode: decode_ucs4le,
};

/// Returns the handler of a detected encoding, `None` for UTF-8.
pub fn get_encoding_handler(enc: XmlCharEncoding) -> Option<XmlCharEncodingHandler> {
    match enc {
        XmlCharEncoding::None | XmlCharEncoding::UTF8 => None,
        XmlCharEncoding::UTF16LE => Some(XmlCharEncodingHandler::Predefined(UTF_16LE.into())),
        XmlCharEncoding::UTF16BE => Some(XmlCharEncodingHandler::Predefined(UTF_16BE.into())),
        XmlCharEncoding::UCS4BE => Some(XmlCharEncodingHandler::Custom(UCS4BE_HANDLER)),
        XmlCharEncoding::UCS4LE => Some(XmlCharEncodingHandler::Custom(UCS4LE_HANDLER)),
        XmlCharEncoding::ISO8859_1 => Some(XmlCharEncodingHandler::Custom(ISO8859_1_HANDLER)),
        XmlCharEncoding::ASCII => Some(XmlCharEncodingHandler::Custom(ASCII_HANDLER)),
        XmlCharEncoding::EBCDIC => None,
    }
}

/// Find a built-in handler for the encoding `name`.
///
/// Returns `Ok(None)` for UTF-8, and `Err` if nothing built in matches.
pub fn find_encoding_handler(name: &str) -> Result<Option<XmlCharEncodingHandler>, EncodingError> {
    if let Ok(enc) = name.parse::<XmlCharEncoding>() {
        if enc == XmlCharEncoding::UTF16LE && name.eq_ignore_ascii_case("UTF-16") {
            // the byte order was already settled by detection
            return Ok(get_encoding_handler(XmlCharEncoding::UTF16LE));
        }
        if enc != XmlCharEncoding::EBCDIC {
            return Ok(get_encoding_handler(enc));
        }
    }
    match Encoding::for_label(name.as_bytes()) {
        Some(enc) if enc == encoding_rs::UTF_8 => Ok(None),
        Some(enc) => Ok(Some(XmlCharEncodingHandler::Predefined(enc.into()))),
        None => Err(EncodingError::Other {
            msg: format!("Unsupported encoding {name}").into(),
        }),
    }
}

const MAX_ENCODING_HANDLERS: usize = 50;

/// The custom decoders known to one reader.
#[derive(Default)]
pub struct XmlEncodingRegistry {
    handlers: Vec<CustomEncodingHandler>,
    aliases: BTreeMap<String, String>,
}

impl XmlEncodingRegistry {
    /// Register a custom decoder.
    ///
    /// If too many handlers are registered (more than 50 handlers specifically), return `Err`.
    pub fn register(&mut self, handler: CustomEncodingHandler) -> Result<(), EncodingError> {
        if self.handlers.len() >= MAX_ENCODING_HANDLERS {
            return Err(EncodingError::Other {
                msg: "Too many CustomEncodingHandlers are registerd.".into(),
            });
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// If `alias` already exists as an alias, it is overwritten.
    ///
    /// # Note
    /// `alias` and `name` are stored after converted to uppercase.
    pub fn add_alias(&mut self, name: &str, alias: &str) {
        self.aliases
            .insert(alias.to_uppercase(), name.to_uppercase());
    }

    pub fn find(&self, name: &str) -> Option<XmlCharEncodingHandler> {
        let name = name.to_uppercase();
        let name = self.aliases.get(&name).unwrap_or(&name);
        self.handlers
            .iter()
            .find(|handler| handler.name().eq_ignore_ascii_case(name))
            .cloned()
            .map(XmlCharEncodingHandler::Custom)
    }
}

pub fn detect_encoding(input: &[u8]) -> XmlCharEncoding {
    match input {
        [0x00, 0x00, 0x00, 0x3C, ..] => XmlCharEncoding::UCS4BE,
        [0x3C, 0x00, 0x00, 0x00, ..] => XmlCharEncoding::UCS4LE,
        [0x4C, 0x6F, 0xA7, 0x94, ..] => XmlCharEncoding::EBCDIC,
        [0x3C, 0x3F, 0x78, 0x6D, ..] => XmlCharEncoding::UTF8,
        [0x3C, 0x00, 0x3F, 0x00, ..] => XmlCharEncoding::UTF16LE,
        [0x00, 0x3C, 0x00, 0x3F, ..] => XmlCharEncoding::UTF16BE,
        // UTF-8 BOM
        [0xEF, 0xBB, 0xBF, ..] => XmlCharEncoding::UTF8,
        // UTF-16 BOM (BE)
        [0xFE, 0xFF, ..] => XmlCharEncoding::UTF16BE,
        // UTF-16 BOM (LE)
        [0xFF, 0xFE, ..] => XmlCharEncoding::UTF16LE,
        _ => XmlCharEncoding::None,
    }
}

fn bom_length(input: &[u8]) -> usize {
    match input {
        [0xEF, 0xBB, 0xBF, ..] => 3,
        [0xFE, 0xFF, ..] | [0xFF, 0xFE, ..] => 2,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for enough bytes to detect the encoding.
    Sniffing,
    /// An XML or text declaration may follow; only it is decoded.
    Declaration,
    /// The declaration was decoded and is being read by the scanner.
    DeclarationRead,
    Body,
}

/// Turns the input bytes of one entity into text.
pub struct XmlInputDecoder {
    state: DecoderState,
    detected: XmlCharEncoding,
    handler: Option<XmlCharEncodingHandler>,
    pending: Vec<u8>,
    normalize_newlines: bool,
    pending_cr: bool,
    finished: bool,
}

impl XmlInputDecoder {
    /// A decoder for bytes of unknown encoding.
    pub fn new() -> Self {
        Self {
            state: DecoderState::Sniffing,
            detected: XmlCharEncoding::None,
            handler: None,
            pending: vec![],
            normalize_newlines: true,
            pending_cr: false,
            finished: false,
        }
    }

    /// A decoder for text that is already UTF-8 and line-normalized,
    /// such as the replacement text of an internal entity.
    pub fn utf8_text() -> Self {
        Self {
            state: DecoderState::Body,
            detected: XmlCharEncoding::UTF8,
            normalize_newlines: false,
            ..Self::new()
        }
    }

    pub fn encoding_name(&self) -> &str {
        match self.handler.as_ref() {
            Some(handler) => handler.name(),
            None => "UTF-8",
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Check if a declaration was decoded and is waiting for
    /// [`XmlInputDecoder::end_declaration`].
    pub fn declaration_pending(&self) -> bool {
        self.state == DecoderState::DeclarationRead
    }

    /// Switch to the encoding named by the declaration, if any, and release
    /// the rest of the input.
    pub fn end_declaration(&mut self, handler: Option<XmlCharEncodingHandler>) {
        if self.state != DecoderState::DeclarationRead && self.state != DecoderState::Declaration {
            return;
        }
        self.state = DecoderState::Body;
        let Some(handler) = handler else {
            return;
        };
        if !self.detected.is_ascii_compatible() {
            // a declaration in UTF-16 or UCS-4 cannot change the code unit width
            return;
        }
        if handler.is_utf16() {
            log::debug!(
                "ignoring declared encoding {} for {} content",
                handler.name(),
                self.encoding_name()
            );
            return;
        }
        log::debug!("switching encoding to {}", handler.name());
        self.handler = Some(handler);
    }

    /// Decode what is available into `out`.
    ///
    /// Returns `Ok(false)` if nothing can be decoded until more input arrives.
    pub fn decode(&mut self, out: &mut String, last: bool) -> Result<bool, EncodingError> {
        if self.finished {
            return Ok(false);
        }
        if self.state == DecoderState::Sniffing {
            if self.pending.len() < 4 && !last {
                return Ok(false);
            }
            self.detected = detect_encoding(&self.pending);
            if self.detected == XmlCharEncoding::EBCDIC {
                return Err(EncodingError::Other {
                    msg: "EBCDIC input is not supported".into(),
                });
            }
            let bom = bom_length(&self.pending);
            self.pending.drain(..bom);
            self.handler = get_encoding_handler(self.detected);
            // the declaration of wide encodings is decoded with the body
            self.state = if self.pending.starts_with(b"<?xml") {
                DecoderState::Declaration
            } else {
                DecoderState::Body
            };
        }

        let end = match self.state {
            DecoderState::Sniffing | DecoderState::DeclarationRead => return Ok(false),
            DecoderState::Declaration => {
                match memchr::memmem::find(&self.pending, b"?>") {
                    Some(pos) => {
                        self.state = DecoderState::DeclarationRead;
                        pos + 2
                    }
                    None if last => {
                        self.state = DecoderState::Body;
                        self.pending.len()
                    }
                    None => return Ok(false),
                }
            }
            DecoderState::Body => self.pending.len(),
        };
        let last = last && end == self.pending.len();

        let start = out.len();
        let read = match self.handler.as_mut() {
            Some(handler) => handler.decode(&self.pending[..end], out, last)?,
            None => decode_utf8(&self.pending[..end], out, last)?,
        };
        self.pending.drain(..read);
        self.finished = last;
        if self.normalize_newlines {
            self.normalize(out, start);
        }
        Ok(read > 0 || out.len() > start)
    }

    /// Check if undecoded input remains.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn normalize(&mut self, out: &mut String, start: usize) {
        if self.pending_cr {
            self.pending_cr = false;
            if out[start..].starts_with('\n') {
                out.remove(start);
            }
        }
        if !out[start..].contains('\r') {
            return;
        }
        let tail = out.split_off(start);
        let mut chars = tail.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\r' {
                out.push('\n');
                match chars.peek() {
                    Some('\n') => {
                        chars.next();
                    }
                    Some(_) => {}
                    None => self.pending_cr = true,
                }
            } else {
                out.push(c);
            }
        }
    }
}

impl Default for XmlInputDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_utf8(src: &[u8], dst: &mut String, last: bool) -> Result<usize, EncodingError> {
    match from_utf8(src) {
        Ok(s) => {
            dst.push_str(s);
            Ok(src.len())
        }
        Err(e) => {
            let valid = e.valid_up_to();
            // the prefix was just checked
            dst.push_str(from_utf8(&src[..valid]).unwrap_or_default());
            match e.error_len() {
                None if !last => Ok(valid),
                length => Err(EncodingError::Malformed {
                    read: valid + length.unwrap_or(src.len() - valid),
                    write: dst.len(),
                    length: length.unwrap_or(src.len() - valid),
                    offset: 0,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Result<String, EncodingError> {
        let mut decoder = XmlInputDecoder::new();
        let mut out = String::new();
        for chunk in chunks {
            decoder.feed(chunk);
            decoder.decode(&mut out, false)?;
            if decoder.declaration_pending() {
                decoder.end_declaration(None);
                decoder.decode(&mut out, false)?;
            }
        }
        decoder.decode(&mut out, true)?;
        Ok(out)
    }

    #[test]
    fn utf8_split_sequence() {
        let text = "<a>été</a>".as_bytes();
        let out = decode_all(&[&text[..4], &text[4..]]).unwrap();
        assert_eq!(out, "<a>été</a>");
    }

    #[test]
    fn newline_normalization_across_chunks() {
        let out = decode_all(&[b"<a>x\r", b"\ny\rz</a>"]).unwrap();
        assert_eq!(out, "<a>x\ny\nz</a>");
    }

    #[test]
    fn utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<a>é</a>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_all(&[&bytes]).unwrap(), "<a>é</a>");
    }

    #[test]
    fn declared_latin1() {
        let mut decoder = XmlInputDecoder::new();
        let mut out = String::new();
        decoder.feed(b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xE9</a>");
        decoder.decode(&mut out, false).unwrap();
        assert!(decoder.declaration_pending());
        assert!(out.ends_with("?>"));
        let handler = find_encoding_handler("ISO-8859-1").unwrap();
        decoder.end_declaration(handler);
        decoder.decode(&mut out, true).unwrap();
        assert!(out.ends_with("<a>é</a>"));
    }

    #[test]
    fn malformed_utf8() {
        assert!(decode_all(&[b"<a>\xFF</a>"]).unwrap_err().malformed());
    }

    #[test]
    fn registry_lookup_with_alias() {
        let mut registry = XmlEncodingRegistry::default();
        registry
            .register(CustomEncodingHandler::new("x-test", decode_latin1))
            .unwrap();
        registry.add_alias("x-test", "testing");
        assert!(registry.find("TESTING").is_some());
        assert!(registry.find("x-other").is_none());
        assert!(find_encoding_handler("x-test").is_err());
    }
}
