//! Character classes of XML 1.0 (Fifth Edition) and the lexical checks used
//! for attribute values of the tokenized types.

/// Check if `c` matches the `Char` production.
pub fn xml_is_char(c: u32) -> bool {
    matches!(c, 0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

/// Check if `c` matches the `S` production.
pub fn xml_is_blank_char(c: u32) -> bool {
    matches!(c, 0x20 | 0x9 | 0xA | 0xD)
}

/// Check if `c` matches the `PubidChar` production.
pub fn xml_is_pubid_char(c: u32) -> bool {
    matches!(c,
        0x20 | 0xD | 0xA
        | 0x61..=0x7A // 'a'..='z'
        | 0x41..=0x5A // 'A'..='Z'
        | 0x30..=0x39 // '0'..='9'
    ) || (c < 0x80 && b"-'()+,./:=?;!*#@$_%".contains(&(c as u8)))
}

/// Check if `c` matches the `NameStartChar` production.
pub fn xml_is_name_start_char(c: char) -> bool {
    matches!(c as u32,
        0x3A // ':'
        | 0x41..=0x5A // 'A'..='Z'
        | 0x5F // '_'
        | 0x61..=0x7A // 'a'..='z'
        | 0xC0..=0xD6
        | 0xD8..=0xF6
        | 0xF8..=0x2FF
        | 0x370..=0x37D
        | 0x37F..=0x1FFF
        | 0x200C..=0x200D
        | 0x2070..=0x218F
        | 0x2C00..=0x2FEF
        | 0x3001..=0xD7FF
        | 0xF900..=0xFDCF
        | 0xFDF0..=0xFFFD
        | 0x10000..=0xEFFFF
    )
}

/// Check if `c` matches the `NameChar` production.
pub fn xml_is_name_char(c: char) -> bool {
    xml_is_name_start_char(c)
        || matches!(c as u32,
            0x2D // '-'
            | 0x2E // '.'
            | 0x30..=0x39 // '0'..='9'
            | 0xB7
            | 0x300..=0x36F
            | 0x203F..=0x2040
        )
}

/// Check if `s` contains nothing but `S` characters.
pub fn xml_is_whitespace_only(s: &str) -> bool {
    s.bytes().all(|b| xml_is_blank_char(b as u32))
}

/// Check that a value conforms to the lexical space of Name
///
/// Returns `Ok` if this validates, `Err` otherwise.
pub fn validate_name(value: &str) -> Result<(), &'static str> {
    // First quick algorithm for ASCII range
    if value.is_ascii() {
        let mut bytes = value.bytes();
        if bytes
            .next()
            .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_' || b == b':')
            && bytes.all(|b| b.is_ascii_alphanumeric() || b"_-.:".contains(&b))
        {
            return Ok(());
        }
        return Err("Invalid Name");
    }

    let mut chars = value.chars();
    if chars.next().is_some_and(xml_is_name_start_char) && chars.all(xml_is_name_char) {
        Ok(())
    } else {
        Err("Invalid Name")
    }
}

/// Check that a value conforms to the lexical space of NCName
pub fn validate_ncname(value: &str) -> Result<(), &'static str> {
    if value.contains(':') {
        return Err("Invalid NCName");
    }
    validate_name(value).map_err(|_| "Invalid NCName")
}

/// Check that a value conforms to the lexical space of Names
pub fn validate_names(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("Invalid Names");
    }
    value
        .split('\x20')
        .try_for_each(validate_name)
        .map_err(|_| "Invalid Names")
}

/// Check that a value conforms to the lexical space of NMToken
pub fn validate_nmtoken(value: &str) -> Result<(), &'static str> {
    if !value.is_empty() && value.chars().all(xml_is_name_char) {
        Ok(())
    } else {
        Err("Invalid NMToken")
    }
}

/// Check that a value conforms to the lexical space of NMTokens
pub fn validate_nmtokens(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("Invalid NMTokens");
    }
    value
        .split('\x20')
        .try_for_each(validate_nmtoken)
        .map_err(|_| "Invalid NMTokens")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(validate_name("a").is_ok());
        assert!(validate_name("_x:y-1.2").is_ok());
        assert!(validate_name("été").is_ok());
        assert!(validate_name("1a").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("a b").is_err());
        assert!(validate_names("a b c").is_ok());
        assert!(validate_names("a  b").is_err());
        assert!(validate_ncname("a:b").is_err());
    }

    #[test]
    fn nmtokens() {
        assert!(validate_nmtoken("123").is_ok());
        assert!(validate_nmtoken("-x").is_ok());
        assert!(validate_nmtoken("a b").is_err());
        assert!(validate_nmtokens("1 2 3").is_ok());
        assert!(validate_nmtokens("").is_err());
    }

    #[test]
    fn chars() {
        assert!(xml_is_char(0x9));
        assert!(!xml_is_char(0x0));
        assert!(!xml_is_char(0xFFFE));
        assert!(xml_is_pubid_char('-' as u32));
        assert!(!xml_is_pubid_char('<' as u32));
        assert!(xml_is_whitespace_only(" \t\r\n"));
        assert!(!xml_is_whitespace_only(" x "));
    }
}
