use std::fmt::{self, Display};

/// Possible definitions of element content occurrences.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlElementContentOccur {
    #[default]
    XmlElementContentOnce = 1,
    XmlElementContentOpt,
    XmlElementContentMult,
    XmlElementContentPlus,
}

impl XmlElementContentOccur {
    /// Returns the suffix used in a content specification.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::XmlElementContentOnce => "",
            Self::XmlElementContentOpt => "?",
            Self::XmlElementContentMult => "*",
            Self::XmlElementContentPlus => "+",
        }
    }
}

/// The kind of a content particle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlElementContentType {
    XmlElementContentPCDATA,
    /// An element, by qualified name.
    XmlElementContentElement(String),
    XmlElementContentSeq(Vec<XmlElementContent>),
    XmlElementContentOr(Vec<XmlElementContent>),
}

/// An XML Element content as stored after parsing an element definition in a DTD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElementContent {
    pub typ: XmlElementContentType,
    pub ocur: XmlElementContentOccur,
}

impl XmlElementContent {
    pub fn pcdata() -> Self {
        Self {
            typ: XmlElementContentType::XmlElementContentPCDATA,
            ocur: XmlElementContentOccur::XmlElementContentOnce,
        }
    }

    pub fn element(name: impl Into<String>) -> Self {
        Self {
            typ: XmlElementContentType::XmlElementContentElement(name.into()),
            ocur: XmlElementContentOccur::XmlElementContentOnce,
        }
    }

    pub fn seq(children: Vec<XmlElementContent>) -> Self {
        Self {
            typ: XmlElementContentType::XmlElementContentSeq(children),
            ocur: XmlElementContentOccur::XmlElementContentOnce,
        }
    }

    pub fn or(children: Vec<XmlElementContent>) -> Self {
        Self {
            typ: XmlElementContentType::XmlElementContentOr(children),
            ocur: XmlElementContentOccur::XmlElementContentOnce,
        }
    }

    pub fn with_occur(mut self, ocur: XmlElementContentOccur) -> Self {
        self.ocur = ocur;
        self
    }

    /// Visit the names of every element this particle mentions.
    pub fn for_each_name(&self, f: &mut impl FnMut(&str)) {
        match &self.typ {
            XmlElementContentType::XmlElementContentPCDATA => {}
            XmlElementContentType::XmlElementContentElement(name) => f(name),
            XmlElementContentType::XmlElementContentSeq(children)
            | XmlElementContentType::XmlElementContentOr(children) => {
                for child in children {
                    child.for_each_name(f);
                }
            }
        }
    }

    fn write_to(&self, out: &mut String, englob: bool) {
        match &self.typ {
            XmlElementContentType::XmlElementContentPCDATA => out.push_str("#PCDATA"),
            XmlElementContentType::XmlElementContentElement(name) => out.push_str(name),
            XmlElementContentType::XmlElementContentSeq(children)
            | XmlElementContentType::XmlElementContentOr(children) => {
                let sep = if matches!(self.typ, XmlElementContentType::XmlElementContentSeq(_)) {
                    " , "
                } else {
                    " | "
                };
                if englob {
                    out.push('(');
                }
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(sep);
                    }
                    let nested = matches!(
                        child.typ,
                        XmlElementContentType::XmlElementContentSeq(_)
                            | XmlElementContentType::XmlElementContentOr(_)
                    );
                    child.write_to(out, nested);
                }
                if englob {
                    out.push(')');
                }
            }
        }
        out.push_str(self.ocur.suffix());
    }
}

impl Display for XmlElementContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out, true);
        if out.starts_with('(') {
            f.write_str(&out)
        } else {
            write!(f, "({out})")
        }
    }
}
