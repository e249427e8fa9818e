//! Whitespace-stripping rules.
//!
//! A rule names elements by expanded name, with `*` as a wildcard for the
//! local part or for the whole name, and says whether whitespace-only text
//! directly inside such elements is kept. The first matching rule wins, so
//! the set is kept sorted with the most specific rules first.

use std::fmt;

use anyhow::{Context, bail};

use crate::{chvalid::validate_ncname, dict::ExpandedName};

/// One `(namespace, local-name-or-wildcard, preserve)` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlWhitespaceRule {
    pub namespace: Option<String>,
    /// `None` matches every local name.
    pub local: Option<String>,
    pub preserve: bool,
}

impl XmlWhitespaceRule {
    pub fn new(namespace: Option<&str>, local: Option<&str>, preserve: bool) -> Self {
        Self {
            namespace: namespace.map(|s| s.to_owned()),
            local: local.map(|s| s.to_owned()),
            preserve,
        }
    }

    /// Parse a name test.
    ///
    /// Accepted forms are `local`, `{uri}local`, `{uri}*` and `*`. A bare `*`
    /// matches elements in every namespace.
    pub fn parse(test: &str, preserve: bool) -> anyhow::Result<Self> {
        if test == "*" {
            return Ok(Self {
                namespace: None,
                local: None,
                preserve,
            });
        }
        let (namespace, local) = match test.strip_prefix('{') {
            Some(rest) => {
                let close = rest
                    .find('}')
                    .with_context(|| format!("missing '}}' in name test '{test}'"))?;
                (Some(&rest[..close]), &rest[close + 1..])
            }
            None => (None, test),
        };
        if local == "*" {
            if namespace.is_none() {
                bail!("invalid name test '{test}'");
            }
            return Ok(Self::new(namespace, None, preserve));
        }
        if validate_ncname(local).is_err() {
            bail!("'{local}' is not a valid local name");
        }
        Ok(Self::new(namespace, Some(local), preserve))
    }

    /// `2` for `{ns}local`, `1` for `{ns}*`, `0` for `*`.
    fn priority(&self) -> u8 {
        match (&self.namespace, &self.local) {
            (_, Some(_)) => 2,
            (Some(_), None) => 1,
            (None, None) => 0,
        }
    }

    pub fn matches(&self, name: &ExpandedName) -> bool {
        match (&self.namespace, &self.local) {
            (None, None) => true,
            (namespace, None) => {
                name.namespace_uri().map(|uri| uri.as_str()) == namespace.as_deref()
            }
            (namespace, Some(local)) => name.is(namespace.as_deref(), local),
        }
    }
}

impl fmt::Display for XmlWhitespaceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.namespace, &self.local) {
            (None, None) => f.write_str("*"),
            (Some(ns), None) => write!(f, "{{{ns}}}*"),
            (Some(ns), Some(local)) => write!(f, "{{{ns}}}{local}"),
            (None, Some(local)) => f.write_str(local),
        }
    }
}

/// An ordered set of [`XmlWhitespaceRule`]s.
#[derive(Debug, Clone, Default)]
pub struct XmlWhitespaceRules {
    rules: Vec<XmlWhitespaceRule>,
}

impl XmlWhitespaceRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule behind every rule at least as specific.
    pub fn add(&mut self, rule: XmlWhitespaceRule) {
        let priority = rule.priority();
        let at = self
            .rules
            .iter()
            .position(|r| r.priority() < priority)
            .unwrap_or(self.rules.len());
        self.rules.insert(at, rule);
    }

    /// Add `xsl:strip-space` style tests.
    pub fn strip(&mut self, test: &str) -> anyhow::Result<()> {
        self.add(XmlWhitespaceRule::parse(test, false)?);
        Ok(())
    }

    /// Add `xsl:preserve-space` style tests.
    pub fn preserve(&mut self, test: &str) -> anyhow::Result<()> {
        self.add(XmlWhitespaceRule::parse(test, true)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[XmlWhitespaceRule] {
        &self.rules
    }

    /// Whether whitespace in `name` is preserved, or `None` if no rule applies.
    pub fn lookup(&self, name: &ExpandedName) -> Option<bool> {
        self.rules
            .iter()
            .find(|rule| rule.matches(name))
            .map(|rule| rule.preserve)
    }
}
