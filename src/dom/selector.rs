//! Selector engine - the CSS subset the elements query with.
//!
//! Supported grammar:
//!
//! ```text
//! list      := complex ("," complex)*
//! complex   := [">"] compound (combinator compound)*
//! combinator:= whitespace | ">"
//! compound  := "*" | type? (#id | .class | [attr] | [attr=value] | :scope | :root | :not(list))*
//! ```
//!
//! A complex selector starting with `>` is relative to `:scope`, so
//! `"> li"` and `":scope > li"` are the same selector.
//!
//! Matching runs right-to-left: the rightmost compound is tested against the
//! candidate node, then combinators walk up the ancestor chain.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

use super::node::{NodeId, Tree};

// =============================================================================
// Errors
// =============================================================================

/// Selector parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character {found:?} at offset {offset} in {input:?}")]
    Unexpected {
        input: String,
        offset: usize,
        found: char,
    },
    #[error("unterminated {what} in {input:?}")]
    Unterminated { input: String, what: &'static str },
    #[error("unsupported pseudo-class :{name}")]
    UnsupportedPseudo { name: String },
}

// =============================================================================
// AST
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple {
    Universal,
    Type(String),
    Id(String),
    Class(String),
    Attribute { name: String, value: Option<String> },
    Scope,
    Root,
    Not(Vec<Complex>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    simples: Vec<Simple>,
}

/// One compound plus the combinator linking it to the compound on its left.
/// The leftmost part's combinator is never read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    combinator: Combinator,
    compound: Compound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<Part>,
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    list: Vec<Complex>,
}

impl Selector {
    /// Parse a selector list.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let list = Parser::new(input).parse_list(None)?;
        Ok(Self {
            source: input.trim().to_string(),
            list,
        })
    }

    /// `*` - matches every element.
    pub fn universal() -> Self {
        Self::single("*", Simple::Universal)
    }

    /// A bare type selector such as `input-scope`.
    pub fn type_selector(tag: &str) -> Self {
        Self::single(tag, Simple::Type(tag.to_ascii_lowercase()))
    }

    /// `[name]` - elements carrying the attribute.
    pub fn has_attribute(name: &str) -> Self {
        Self::single(
            &format!("[{name}]"),
            Simple::Attribute {
                name: name.to_ascii_lowercase(),
                value: None,
            },
        )
    }

    /// Selector list matching anything either side matches.
    pub fn or(mut self, other: Selector) -> Self {
        self.source = format!("{}, {}", self.source, other.source);
        self.list.extend(other.list);
        self
    }

    /// The text this selector was built from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn single(source: &str, simple: Simple) -> Self {
        Self {
            source: source.to_string(),
            list: vec![Complex {
                parts: vec![Part {
                    combinator: Combinator::Descendant,
                    compound: Compound {
                        simples: vec![simple],
                    },
                }],
            }],
        }
    }

    /// Does `node` match, with `:scope` bound to `scope` (the root when `None`)?
    pub(crate) fn matches_in(&self, tree: &Tree, node: NodeId, scope: Option<NodeId>) -> bool {
        tree.is_element(node)
            && self
                .list
                .iter()
                .any(|complex| match_part(tree, node, &complex.parts, complex.parts.len() - 1, scope))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Matching
// =============================================================================

fn match_part(tree: &Tree, node: NodeId, parts: &[Part], i: usize, scope: Option<NodeId>) -> bool {
    let part = &parts[i];
    if !match_compound(tree, node, &part.compound, scope) {
        return false;
    }
    if i == 0 {
        return true;
    }
    match part.combinator {
        Combinator::Child => tree
            .parent_element(node)
            .is_some_and(|parent| match_part(tree, parent, parts, i - 1, scope)),
        Combinator::Descendant => {
            let mut current = tree.parent_element(node);
            while let Some(ancestor) = current {
                if match_part(tree, ancestor, parts, i - 1, scope) {
                    return true;
                }
                current = tree.parent_element(ancestor);
            }
            false
        }
    }
}

fn match_compound(tree: &Tree, node: NodeId, compound: &Compound, scope: Option<NodeId>) -> bool {
    compound.simples.iter().all(|simple| match simple {
        Simple::Universal => true,
        Simple::Type(tag) => tree.tag(node) == Some(tag.as_str()),
        Simple::Id(id) => tree.attribute(node, "id") == Some(id.as_str()),
        Simple::Class(class) => tree
            .attribute(node, "class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class)),
        Simple::Attribute { name, value } => match (tree.attribute(node, name), value) {
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
            (None, _) => false,
        },
        Simple::Scope => node == scope.unwrap_or_else(|| tree.root()),
        Simple::Root => node == tree.root(),
        Simple::Not(list) => !list
            .iter()
            .any(|complex| match_part(tree, node, &complex.parts, complex.parts.len() - 1, scope)),
    })
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |&(i, _)| i)
    }

    fn unexpected(&mut self, found: char) -> SelectorError {
        SelectorError::Unexpected {
            input: self.input.to_string(),
            offset: self.offset(),
            found,
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
            skipped = true;
        }
        skipped
    }

    /// Parse until end of input, or until `close` (consumed) inside `:not(...)`.
    fn parse_list(&mut self, close: Option<char>) -> Result<Vec<Complex>, SelectorError> {
        let mut list = Vec::new();
        loop {
            list.push(self.parse_complex(close)?);
            match self.peek() {
                Some(',') => {
                    self.chars.next();
                }
                Some(c) if Some(c) == close => {
                    self.chars.next();
                    return Ok(list);
                }
                None if close.is_none() => return Ok(list),
                None => {
                    return Err(SelectorError::Unterminated {
                        input: self.input.to_string(),
                        what: ":not(...)",
                    });
                }
                Some(c) => return Err(self.unexpected(c)),
            }
        }
    }

    fn parse_complex(&mut self, close: Option<char>) -> Result<Complex, SelectorError> {
        self.skip_whitespace();
        let mut parts = Vec::new();

        // A leading `>` is relative to :scope.
        if self.peek() == Some('>') {
            parts.push(Part {
                combinator: Combinator::Descendant,
                compound: Compound {
                    simples: vec![Simple::Scope],
                },
            });
        }

        let mut combinator = Combinator::Descendant;
        loop {
            if self.peek() == Some('>') {
                if parts.is_empty() {
                    return Err(self.unexpected('>'));
                }
                self.chars.next();
                self.skip_whitespace();
                combinator = Combinator::Child;
            }

            let compound = self.parse_compound()?;
            if compound.simples.is_empty() {
                return match self.peek() {
                    None if parts.is_empty() => Err(SelectorError::Empty),
                    None => Err(SelectorError::Unterminated {
                        input: self.input.to_string(),
                        what: "combinator",
                    }),
                    Some(c) => Err(self.unexpected(c)),
                };
            }
            parts.push(Part {
                combinator,
                compound,
            });

            let had_space = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some(c) if Some(c) == close => break,
                Some('>') => continue,
                Some(_) if had_space => combinator = Combinator::Descendant,
                Some(c) => return Err(self.unexpected(c)),
            }
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut simples = Vec::new();
        match self.peek() {
            Some('*') => {
                self.chars.next();
                simples.push(Simple::Universal);
            }
            Some(c) if is_ident_char(c) => {
                simples.push(Simple::Type(self.ident().to_ascii_lowercase()));
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.chars.next();
                    let id = self.required_ident()?;
                    simples.push(Simple::Id(id));
                }
                Some('.') => {
                    self.chars.next();
                    let class = self.required_ident()?;
                    simples.push(Simple::Class(class));
                }
                Some('[') => {
                    self.chars.next();
                    simples.push(self.attribute()?);
                }
                Some(':') => {
                    self.chars.next();
                    simples.push(self.pseudo()?);
                }
                _ => break,
            }
        }
        Ok(Compound { simples })
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|&c| is_ident_char(c)) {
            out.push(c);
            self.chars.next();
        }
        out
    }

    fn required_ident(&mut self) -> Result<String, SelectorError> {
        let ident = self.ident();
        if ident.is_empty() {
            return Err(match self.peek() {
                Some(c) => self.unexpected(c),
                None => SelectorError::Unterminated {
                    input: self.input.to_string(),
                    what: "identifier",
                },
            });
        }
        Ok(ident)
    }

    fn attribute(&mut self) -> Result<Simple, SelectorError> {
        self.skip_whitespace();
        let name = self.required_ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        let value = match self.peek() {
            Some(']') => None,
            Some('=') => {
                self.chars.next();
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.chars.next();
                        let mut value = String::new();
                        loop {
                            match self.chars.next() {
                                Some((_, c)) if c == quote => break,
                                Some((_, c)) => value.push(c),
                                None => {
                                    return Err(SelectorError::Unterminated {
                                        input: self.input.to_string(),
                                        what: "quoted string",
                                    });
                                }
                            }
                        }
                        value
                    }
                    _ => self.required_ident()?,
                };
                self.skip_whitespace();
                Some(value)
            }
            Some(c) => return Err(self.unexpected(c)),
            None => {
                return Err(SelectorError::Unterminated {
                    input: self.input.to_string(),
                    what: "attribute selector",
                });
            }
        };
        match self.chars.next() {
            Some((_, ']')) => Ok(Simple::Attribute { name, value }),
            Some((offset, found)) => Err(SelectorError::Unexpected {
                input: self.input.to_string(),
                offset,
                found,
            }),
            None => Err(SelectorError::Unterminated {
                input: self.input.to_string(),
                what: "attribute selector",
            }),
        }
    }

    fn pseudo(&mut self) -> Result<Simple, SelectorError> {
        let name = self.required_ident()?.to_ascii_lowercase();
        match name.as_str() {
            "scope" => Ok(Simple::Scope),
            "root" => Ok(Simple::Root),
            "not" => {
                match self.chars.next() {
                    Some((_, '(')) => {}
                    Some((offset, found)) => {
                        return Err(SelectorError::Unexpected {
                            input: self.input.to_string(),
                            offset,
                            found,
                        });
                    }
                    None => {
                        return Err(SelectorError::Unterminated {
                            input: self.input.to_string(),
                            what: ":not(...)",
                        });
                    }
                }
                let list = self.parse_list(Some(')'))?;
                Ok(Simple::Not(list))
            }
            _ => Err(SelectorError::UnsupportedPseudo { name }),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
