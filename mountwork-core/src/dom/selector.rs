//! Selector Matching
//!
//! A small matcher for the selectors components are declared with. It
//! understands compound selectors built from:
//!
//! - a type selector (`div`) or the universal selector (`*`)
//! - class selectors (`.widget`)
//! - ID selectors (`#main`)
//! - attribute presence (`[data-component]`) and equality
//!   (`[data-kind=card]`, `[data-kind="card"]`)
//!
//! and comma-separated lists of them. Combinators (descendant, child,
//! sibling) are rejected.

use indexmap::IndexMap;
use thiserror::Error;

/// Why a selector could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorParseError {
    #[error("empty selector")]
    Empty,

    #[error("combinators are not supported in '{0}'")]
    Combinator(String),

    #[error("unexpected character '{found}' in '{selector}'")]
    Unexpected { selector: String, found: char },

    #[error("unterminated attribute selector in '{0}'")]
    UnterminatedAttribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeTest {
    Present(String),
    Equals(String, String),
}

/// One compound selector: every part must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

impl Compound {
    fn matches(&self, tag: &str, attributes: &IndexMap<String, String>) -> bool {
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if let Some(id) = &self.id {
            if attributes.get("id").map(String::as_str) != Some(id.as_str()) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let class_attr = attributes.get("class").map(String::as_str).unwrap_or("");
            let has_all = self
                .classes
                .iter()
                .all(|class| class_attr.split_ascii_whitespace().any(|c| c == class));
            if !has_all {
                return false;
            }
        }

        self.attributes.iter().all(|test| match test {
            AttributeTest::Present(name) => attributes.contains_key(name),
            AttributeTest::Equals(name, value) => {
                attributes.get(name).map(String::as_str) == Some(value.as_str())
            }
        })
    }
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    compounds: Vec<Compound>,
}

impl SelectorList {
    /// Parse a selector string.
    pub fn parse(source: &str) -> Result<Self, SelectorParseError> {
        let mut compounds = Vec::new();
        for part in source.split(',') {
            compounds.push(parse_compound(part.trim(), source)?);
        }
        Ok(Self { compounds })
    }

    /// Whether an element with this tag and attributes matches any entry.
    pub fn matches(&self, tag: &str, attributes: &IndexMap<String, String>) -> bool {
        self.compounds.iter().any(|c| c.matches(tag, attributes))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(part: &str, source: &str) -> Result<Compound, SelectorParseError> {
    if part.is_empty() {
        return Err(SelectorParseError::Empty);
    }
    if part.contains(|c: char| c.is_whitespace() || c == '>' || c == '+' || c == '~') {
        return Err(SelectorParseError::Combinator(source.to_string()));
    }

    let chars: Vec<char> = part.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if chars[0] == '*' {
        pos = 1;
    } else if is_ident_char(chars[0]) {
        compound.tag = Some(take_ident(&chars, &mut pos));
    }

    while pos < chars.len() {
        let unexpected = |found| SelectorParseError::Unexpected {
            selector: source.to_string(),
            found,
        };

        match chars[pos] {
            '.' => {
                pos += 1;
                let class = take_ident(&chars, &mut pos);
                if class.is_empty() {
                    return Err(unexpected('.'));
                }
                compound.classes.push(class);
            }
            '#' => {
                pos += 1;
                let id = take_ident(&chars, &mut pos);
                if id.is_empty() {
                    return Err(unexpected('#'));
                }
                compound.id = Some(id);
            }
            '[' => {
                let close = chars[pos..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|offset| pos + offset)
                    .ok_or_else(|| SelectorParseError::UnterminatedAttribute(source.to_string()))?;
                let body: String = chars[pos + 1..close].iter().collect();
                compound.attributes.push(parse_attribute(&body, source)?);
                pos = close + 1;
            }
            other => return Err(unexpected(other)),
        }
    }

    Ok(compound)
}

fn parse_attribute(body: &str, source: &str) -> Result<AttributeTest, SelectorParseError> {
    match body.split_once('=') {
        None if !body.is_empty() && body.chars().all(is_ident_char) => {
            Ok(AttributeTest::Present(body.to_string()))
        }
        Some((name, value)) if !name.is_empty() && name.chars().all(is_ident_char) => {
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            Ok(AttributeTest::Equals(name.to_string(), value.to_string()))
        }
        _ => Err(SelectorParseError::Unexpected {
            selector: source.to_string(),
            found: '[',
        }),
    }
}
