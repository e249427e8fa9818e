use std::any::type_name;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlEntityType {
    #[default]
    XmlInternalGeneralEntity = 1,
    XmlExternalGeneralParsedEntity = 2,
    XmlExternalGeneralUnparsedEntity = 3,
    XmlInternalParameterEntity = 4,
    XmlExternalParameterEntity = 5,
    XmlInternalPredefinedEntity = 6,
}

impl XmlEntityType {
    pub fn is_parameter(&self) -> bool {
        matches!(
            self,
            Self::XmlInternalParameterEntity | Self::XmlExternalParameterEntity
        )
    }

    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::XmlExternalGeneralParsedEntity
                | Self::XmlExternalGeneralUnparsedEntity
                | Self::XmlExternalParameterEntity
        )
    }
}

impl TryFrom<i32> for XmlEntityType {
    type Error = anyhow::Error;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::XmlInternalGeneralEntity),
            2 => Ok(Self::XmlExternalGeneralParsedEntity),
            3 => Ok(Self::XmlExternalGeneralUnparsedEntity),
            4 => Ok(Self::XmlInternalParameterEntity),
            5 => Ok(Self::XmlExternalParameterEntity),
            6 => Ok(Self::XmlInternalPredefinedEntity),
            _ => Err(anyhow::anyhow!(
                "Invalid convert from value '{value}' to {}",
                type_name::<Self>()
            )),
        }
    }
}

/// An entity declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlEntity {
    pub name: String,
    pub etype: XmlEntityType,
    /// The replacement text of internal entities.
    pub content: Option<String>,
    pub external_id: Option<String>,
    pub system_id: Option<String>,
    /// The base URI in scope at the declaration, for resolving `system_id`.
    pub base: Option<String>,
    /// The notation of an unparsed entity.
    pub notation: Option<String>,
}

impl XmlEntity {
    pub fn is_unparsed(&self) -> bool {
        self.etype == XmlEntityType::XmlExternalGeneralUnparsedEntity
    }
}

/// A notation declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNotation {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// Returns the replacement text of one of the five predefined entities.
pub fn xml_get_predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}
