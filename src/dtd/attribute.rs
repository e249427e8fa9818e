use std::{fmt, str::FromStr};

use crate::dict::XmlAtom;

/// The declared type of an attribute.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlAttributeType {
    XmlAttributeCDATA = 1,
    XmlAttributeID,
    XmlAttributeIDREF,
    XmlAttributeIDREFS,
    XmlAttributeEntity,
    XmlAttributeEntities,
    XmlAttributeNmtoken,
    XmlAttributeNmtokens,
    XmlAttributeEnumeration,
    XmlAttributeNotation,
}

impl XmlAttributeType {
    /// Check if values of this type are whitespace-normalized.
    pub fn is_tokenized(&self) -> bool {
        !matches!(self, Self::XmlAttributeCDATA)
    }
}

impl FromStr for XmlAttributeType {
    type Err = anyhow::Error;

    /// Parse the keyword of a `TokenizedType` or `StringType`.
    ///
    /// Enumerations have no keyword and are not produced here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CDATA" => Ok(Self::XmlAttributeCDATA),
            "ID" => Ok(Self::XmlAttributeID),
            "IDREF" => Ok(Self::XmlAttributeIDREF),
            "IDREFS" => Ok(Self::XmlAttributeIDREFS),
            "ENTITY" => Ok(Self::XmlAttributeEntity),
            "ENTITIES" => Ok(Self::XmlAttributeEntities),
            "NMTOKEN" => Ok(Self::XmlAttributeNmtoken),
            "NMTOKENS" => Ok(Self::XmlAttributeNmtokens),
            "NOTATION" => Ok(Self::XmlAttributeNotation),
            _ => Err(anyhow::anyhow!(
                "Invalid convert from value '{s}' to {}",
                std::any::type_name::<Self>()
            )),
        }
    }
}

impl fmt::Display for XmlAttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::XmlAttributeCDATA => "CDATA",
            Self::XmlAttributeID => "ID",
            Self::XmlAttributeIDREF => "IDREF",
            Self::XmlAttributeIDREFS => "IDREFS",
            Self::XmlAttributeEntity => "ENTITY",
            Self::XmlAttributeEntities => "ENTITIES",
            Self::XmlAttributeNmtoken => "NMTOKEN",
            Self::XmlAttributeNmtokens => "NMTOKENS",
            Self::XmlAttributeEnumeration => "ENUMERATION",
            Self::XmlAttributeNotation => "NOTATION",
        };
        f.write_str(s)
    }
}

/// The default declaration of an attribute.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlAttributeDefault {
    /// A plain default value.
    XmlAttributeNone = 1,
    XmlAttributeRequired,
    XmlAttributeImplied,
    XmlAttributeFixed,
}

impl fmt::Display for XmlAttributeDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::XmlAttributeNone => "",
            Self::XmlAttributeRequired => "#REQUIRED",
            Self::XmlAttributeImplied => "#IMPLIED",
            Self::XmlAttributeFixed => "#FIXED",
        };
        f.write_str(s)
    }
}

/// An Attribute declaration in a DTD.
#[derive(Debug, Clone)]
pub struct XmlAttributeDecl {
    /// Element holding the attribute
    pub elem: XmlAtom,
    pub name: XmlAtom,
    pub atype: XmlAttributeType,
    pub def: XmlAttributeDefault,
    /// The allowed values of NOTATION and enumerated types.
    pub tree: Option<Vec<String>>,
    pub default_value: Option<String>,
}

impl XmlAttributeDecl {
    /// Check if `value` is one of the allowed values of an enumerated type.
    ///
    /// Always `true` for types without an enumeration.
    pub fn allows(&self, value: &str) -> bool {
        self.tree
            .as_ref()
            .is_none_or(|tree| tree.iter().any(|v| v == value))
    }
}
