//! Parser & matcher for the CSS selector subset used by the exchange adapters:
//! `tag`, `*`, `.class`, `#id`, `[attr]`, `[attr="v"]`, `[attr*="v"]`, `[attr^="v"]`, descendant
//! (whitespace) & child (`>`) combinators, and comma separated selector lists.

use smol_str::SmolStr;
use std::{iter::Peekable, str::CharIndices};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unexpected '{found}' at position {position}")]
    Unexpected { found: char, position: usize },

    #[error("unexpected end of selector")]
    UnexpectedEnd,
}

/// Node view required to match a [`SelectorList`].
pub trait Matchable: Sized {
    fn tag_name(&self) -> SmolStr;
    fn class_contains(&self, class: &str) -> bool;
    fn attr(&self, name: &str) -> Option<String>;
    fn parent_node(&self) -> Option<Self>;
}

/// Comma separated list of selectors; matches if any selector matches.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, Eq, PartialEq)]
struct Complex {
    /// Left to right. The [`Combinator`] relates a compound to the one on its left.
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
struct Compound {
    tag: Option<SmolStr>,
    conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Condition {
    Class(SmolStr),
    Attr {
        name: SmolStr,
        operator: Option<(AttrOperator, String)>,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum AttrOperator {
    Equals,
    Contains,
    Prefix,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser {
            chars: input.char_indices().peekable(),
        };

        let mut selectors = vec![parser.complex()?];
        while parser.eat(',') {
            selectors.push(parser.complex()?);
        }

        match parser.chars.next() {
            None => Ok(Self(selectors)),
            Some((position, found)) => Err(SelectorError::Unexpected { found, position }),
        }
    }

    pub fn matches<M>(&self, node: &M) -> bool
    where
        M: Matchable,
    {
        self.0
            .iter()
            .any(|complex| matches_part(node, &complex.parts, complex.parts.len() - 1))
    }
}

fn matches_part<M>(node: &M, parts: &[(Combinator, Compound)], index: usize) -> bool
where
    M: Matchable,
{
    let (combinator, compound) = &parts[index];
    if !compound.matches(node) {
        return false;
    }
    if index == 0 {
        return true;
    }

    match combinator {
        Combinator::Child => node
            .parent_node()
            .is_some_and(|parent| matches_part(&parent, parts, index - 1)),
        Combinator::Descendant => {
            let mut ancestor = node.parent_node();
            while let Some(current) = ancestor {
                if matches_part(&current, parts, index - 1) {
                    return true;
                }
                ancestor = current.parent_node();
            }
            false
        }
    }
}

impl Compound {
    fn matches<M>(&self, node: &M) -> bool
    where
        M: Matchable,
    {
        if let Some(tag) = &self.tag
            && !tag.eq_ignore_ascii_case(&node.tag_name())
        {
            return false;
        }

        self.conditions.iter().all(|condition| match condition {
            Condition::Class(class) => node.class_contains(class),
            Condition::Attr { name, operator } => match (node.attr(name), operator) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some((AttrOperator::Equals, value))) => actual == *value,
                (Some(actual), Some((AttrOperator::Contains, value))) => {
                    !value.is_empty() && actual.contains(value.as_str())
                }
                (Some(actual), Some((AttrOperator::Prefix, value))) => {
                    !value.is_empty() && actual.starts_with(value.as_str())
                }
            },
        })
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.conditions.is_empty()
    }
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn complex(&mut self) -> Result<Complex, SelectorError> {
        self.skip_whitespace();

        let mut parts = vec![(Combinator::Descendant, self.compound()?)];
        loop {
            let had_whitespace = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.chars.next();
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(found) => {
                    return Err(SelectorError::Unexpected {
                        found,
                        position: self.position(),
                    });
                }
            };
            parts.push((combinator, self.compound()?));
        }

        Ok(Complex { parts })
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut universal = false;

        match self.peek() {
            Some('*') => {
                self.chars.next();
                universal = true;
            }
            Some(next) if is_ident(next) => compound.tag = Some(self.ident()?),
            _ => {}
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.chars.next();
                    compound.conditions.push(Condition::Class(self.ident()?));
                }
                Some('#') => {
                    self.chars.next();
                    compound.conditions.push(Condition::Attr {
                        name: SmolStr::new_static("id"),
                        operator: Some((AttrOperator::Equals, self.ident()?.to_string())),
                    });
                }
                Some('[') => {
                    self.chars.next();
                    compound.conditions.push(self.attribute()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() && !universal {
            return match self.chars.peek() {
                Some(&(position, found)) => Err(SelectorError::Unexpected { found, position }),
                None => Err(SelectorError::Empty),
            };
        }

        Ok(compound)
    }

    fn attribute(&mut self) -> Result<Condition, SelectorError> {
        self.skip_whitespace();
        let name = self.ident()?;
        self.skip_whitespace();

        let operator = match self.chars.next() {
            Some((_, ']')) => return Ok(Condition::Attr { name, operator: None }),
            Some((_, '=')) => AttrOperator::Equals,
            Some((position, symbol @ ('*' | '^'))) => {
                if !self.eat('=') {
                    return Err(SelectorError::Unexpected {
                        found: symbol,
                        position,
                    });
                }
                if symbol == '*' {
                    AttrOperator::Contains
                } else {
                    AttrOperator::Prefix
                }
            }
            Some((position, found)) => return Err(SelectorError::Unexpected { found, position }),
            None => return Err(SelectorError::UnexpectedEnd),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.chars.next();
                let mut value = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, next)) if next == quote => break value,
                        Some((_, next)) => value.push(next),
                        None => return Err(SelectorError::UnexpectedEnd),
                    }
                }
            }
            _ => self.ident()?.to_string(),
        };

        self.skip_whitespace();
        match self.chars.next() {
            Some((_, ']')) => Ok(Condition::Attr {
                name,
                operator: Some((operator, value)),
            }),
            Some((position, found)) => Err(SelectorError::Unexpected { found, position }),
            None => Err(SelectorError::UnexpectedEnd),
        }
    }

    fn ident(&mut self) -> Result<SmolStr, SelectorError> {
        let mut ident = String::new();
        while let Some(next) = self.peek().filter(|next| is_ident(*next)) {
            ident.push(next);
            self.chars.next();
        }

        if ident.is_empty() {
            return match self.chars.peek() {
                Some(&(position, found)) => Err(SelectorError::Unexpected { found, position }),
                None => Err(SelectorError::UnexpectedEnd),
            };
        }

        Ok(SmolStr::new(ident))
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
            skipped = true;
        }
        skipped
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, next)| *next)
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map(|(position, _)| *position).unwrap_or_default()
    }
}

fn is_ident(next: char) -> bool {
    next.is_alphanumeric() || next == '-' || next == '_'
}
