//! Distinguished names. A `Dn` keeps the text it was parsed from for display, and a
//! normalised form that drives equality, hashing and ordering.
//!
//! Ordering compares RDNs starting from the root, so every subtree of the directory is a
//! contiguous range when `Dn` is used as a map key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::be::SearchScope;
use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Ava {
    attr: AttrString,
    value: String,
    norm_value: String,
}

impl Ava {
    pub fn attr(&self) -> &str {
        self.attr.as_str()
    }

    /// The unescaped value as it was supplied.
    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    pub fn normalized_value(&self) -> &str {
        self.norm_value.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct Rdn {
    raw: String,
    avas: Vec<Ava>,
    norm: String,
}

impl Rdn {
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    pub fn normalized(&self) -> &str {
        self.norm.as_str()
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone)]
pub struct Dn {
    raw: String,
    // Leaf first, as written.
    rdns: Vec<Rdn>,
    norm: String,
}

/// Lowercase, trim and collapse internal runs of whitespace. This is the case ignore
/// normalisation used for attribute values throughout the server.
pub(crate) fn normalize_case_ignore(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercase and collapse runs of whitespace without trimming, since an escaped leading or
/// trailing space in an RDN value is significant.
fn normalize_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_space = false;
    for c in value.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.extend(c.to_lowercase());
            in_space = false;
        }
    }
    out
}

/// Trim trailing whitespace unless the last whitespace character is escaped.
fn trim_raw_end(raw: &str) -> &str {
    let trimmed = raw.trim_end();
    let escapes = trimmed.chars().rev().take_while(|c| *c == '\\').count();
    if escapes % 2 == 1 {
        let ws_len = raw[trimmed.len()..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(0);
        &raw[..trimmed.len() + ws_len]
    } else {
        trimmed
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (idx, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, '\\' | ',' | '+' | '"' | '<' | '>' | ';' | '=')
            || (idx == 0 && (c == '#' || c == ' '))
            || (idx == last && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_valid_attr_type(attr: &str) -> bool {
    !attr.is_empty()
        && attr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

struct DnParser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> DnParser<'a> {
    fn new(input: &'a str) -> Self {
        DnParser {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.input.len())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c == ' ') {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<Vec<Rdn>, OperationError> {
        let mut rdns = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.offset();
            let mut avas = Vec::with_capacity(1);
            let terminator = loop {
                avas.push(self.parse_ava()?);
                match self.peek() {
                    Some('+') => {
                        self.pos += 1;
                        self.skip_whitespace();
                    }
                    other => break other,
                }
            };
            let end = self.offset();
            rdns.push(Rdn::from_avas(
                trim_raw_end(&self.input[start..end]).to_string(),
                avas,
            ));

            match terminator {
                Some(',') | Some(';') => {
                    self.pos += 1;
                }
                None => break,
                Some(_) => return Err(OperationError::InvalidDnSyntax),
            }
        }
        Ok(rdns)
    }

    fn parse_ava(&mut self) -> Result<Ava, OperationError> {
        let attr_start = self.offset();
        while !matches!(self.peek(), Some('=') | None) {
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Err(OperationError::InvalidDnSyntax);
        }
        let attr = self.input[attr_start..self.offset()].trim().to_lowercase();
        if !is_valid_attr_type(&attr) {
            return Err(OperationError::InvalidDnSyntax);
        }
        // Consume '='
        self.pos += 1;
        self.skip_whitespace();

        let value = if self.peek() == Some('"') {
            self.pos += 1;
            let v = self.parse_value(true)?;
            if self.peek() != Some('"') {
                return Err(OperationError::InvalidDnSyntax);
            }
            self.pos += 1;
            self.skip_whitespace();
            v
        } else {
            self.parse_value(false)?
        };

        let norm_value = normalize_rdn_value(&value);
        Ok(Ava {
            attr: AttrString::from(attr),
            value,
            norm_value,
        })
    }

    fn hex_digit(&self, offset: usize) -> Option<u8> {
        self.chars
            .get(self.pos + offset)
            .and_then(|(_, c)| c.to_digit(16))
            .and_then(|d| u8::try_from(d).ok())
    }

    fn parse_value(&mut self, quoted: bool) -> Result<String, OperationError> {
        let mut bytes: Vec<u8> = Vec::new();
        // Length of the value up to and including the last character that must be kept,
        // so unescaped trailing spaces can be dropped.
        let mut keep = 0;
        loop {
            let Some(c) = self.peek() else {
                if quoted {
                    return Err(OperationError::InvalidDnSyntax);
                }
                break;
            };
            match c {
                '"' if quoted => break,
                ',' | ';' | '+' if !quoted => break,
                '\\' => {
                    if let (Some(hi), Some(lo)) = (self.hex_digit(1), self.hex_digit(2)) {
                        bytes.push((hi << 4) | lo);
                        self.pos += 3;
                    } else {
                        let Some((_, escaped)) = self.chars.get(self.pos + 1) else {
                            return Err(OperationError::InvalidDnSyntax);
                        };
                        let mut buf = [0; 4];
                        bytes.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes());
                        self.pos += 2;
                    }
                    keep = bytes.len();
                }
                _ => {
                    let mut buf = [0; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    self.pos += 1;
                    if c != ' ' || quoted {
                        keep = bytes.len();
                    }
                }
            }
        }
        bytes.truncate(keep);
        String::from_utf8(bytes).map_err(|_| OperationError::InvalidDnSyntax)
    }
}

impl Rdn {
    fn from_avas(raw: String, mut avas: Vec<Ava>) -> Self {
        avas.sort_by(|a, b| {
            a.attr
                .cmp(&b.attr)
                .then_with(|| a.norm_value.cmp(&b.norm_value))
        });
        let norm = avas
            .iter()
            .map(|ava| format!("{}={}", ava.attr, escape_value(&ava.norm_value)))
            .collect::<Vec<_>>()
            .join("+");
        Rdn { raw, avas, norm }
    }
}

impl Dn {
    /// The zero length DN at the top of the tree.
    pub fn root() -> Self {
        Dn {
            raw: String::new(),
            rdns: Vec::new(),
            norm: String::new(),
        }
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let raw = rdns
            .iter()
            .map(|r| r.raw.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let norm = rdns
            .iter()
            .map(|r| r.norm.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Dn { raw, rdns, norm }
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The DN as supplied, minus surrounding whitespace.
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    pub fn normalized(&self) -> &str {
        self.norm.as_str()
    }

    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Number of RDNs.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Dn::from_rdns(self.rdns[1..].to_vec()))
        }
    }

    /// True when self is `base` or lies beneath it.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        self.rdns.len() >= base.rdns.len()
            && self
                .rdns
                .iter()
                .rev()
                .zip(base.rdns.iter().rev())
                .all(|(a, b)| a.norm == b.norm)
    }

    /// The DN with its leading RDN replaced by `rdn`, under the same parent.
    pub fn with_rdn(&self, rdn: &str) -> Result<Dn, OperationError> {
        let parsed = Dn::from_str(rdn)?;
        if self.is_root() || parsed.depth() != 1 {
            return Err(OperationError::InvalidDnSyntax);
        }
        let mut rdns = parsed.rdns;
        rdns.extend(self.rdns[1..].iter().cloned());
        Ok(Dn::from_rdns(rdns))
    }

    /// Move this DN from beneath `old_base` to beneath `new_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        if !self.is_descendant_of(old_base) {
            return None;
        }
        let extra = self.rdns.len() - old_base.rdns.len();
        let mut rdns = self.rdns[..extra].to_vec();
        rdns.extend(new_base.rdns.iter().cloned());
        Some(Dn::from_rdns(rdns))
    }

    pub fn is_within_scope(&self, base: &Dn, scope: SearchScope) -> bool {
        if !self.is_descendant_of(base) {
            return false;
        }
        let extra = self.rdns.len() - base.rdns.len();
        match scope {
            SearchScope::Base => extra == 0,
            SearchScope::OneLevel => extra == 1,
            SearchScope::Subtree => true,
            SearchScope::Subordinate => extra > 0,
        }
    }
}

impl FromStr for Dn {
    type Err = OperationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = trim_raw_end(value.trim_start());
        if trimmed.is_empty() {
            return Ok(Dn::root());
        }
        let rdns = DnParser::new(trimmed).parse()?;
        let norm = rdns
            .iter()
            .map(|r| r.norm.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Ok(Dn {
            raw: trimmed.to_string(),
            rdns,
            norm,
        })
    }
}

impl TryFrom<&str> for Dn {
    type Error = OperationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Dn::from_str(value)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state)
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rdns
            .iter()
            .rev()
            .map(|r| r.norm.as_str())
            .cmp(other.rdns.iter().rev().map(|r| r.norm.as_str()))
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
