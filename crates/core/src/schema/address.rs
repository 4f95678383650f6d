//! Structural field addresses: dotted names plus `[n]` occurrence indices,
//! e.g. `content[2].photoBlock.alt`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("field address cannot be empty")]
    Empty,
    #[error("invalid field address `{address}`: {reason}")]
    Invalid { address: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldAddress {
    segments: Vec<Segment>,
}

impl FieldAddress {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Field(name.to_string()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// True when the address names an element occurrence (`reviews[1]`).
    pub fn is_occurrence(&self) -> bool {
        matches!(self.last(), Some(Segment::Index(_)))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl FromStr for FieldAddress {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().is_empty() {
            return Err(AddressError::Empty);
        }
        let invalid = |reason| AddressError::Invalid {
            address: input.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        for part in input.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if name.is_empty() {
                return Err(invalid("empty field name"));
            }
            if name.contains(']') {
                return Err(invalid("unbalanced `]`"));
            }
            segments.push(Segment::Field(name.to_string()));

            while !rest.is_empty() {
                let Some(close) = rest.find(']') else {
                    return Err(invalid("unterminated `[`"));
                };
                if !rest.starts_with('[') {
                    return Err(invalid("text after index"));
                }
                let index: usize = rest[1..close]
                    .parse()
                    .map_err(|_| invalid("index is not a non-negative integer"))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
            }
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if i == 0 => write!(f, "{name}")?,
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_block_address() {
        let addr: FieldAddress = "content[2].photoBlock.alt".parse().unwrap();
        assert_eq!(
            addr.segments(),
            &[
                Segment::Field("content".into()),
                Segment::Index(2),
                Segment::Field("photoBlock".into()),
                Segment::Field("alt".into()),
            ]
        );
        assert_eq!(addr.to_string(), "content[2].photoBlock.alt");
    }

    #[test]
    fn parse_consecutive_indices() {
        let addr: FieldAddress = "grid[1][0].cell".parse().unwrap();
        assert_eq!(addr.to_string(), "grid[1][0].cell");
        assert!(!addr.is_occurrence());
        assert!(addr.parent().unwrap().is_occurrence());
    }

    #[test]
    fn builder_matches_parser() {
        let built = FieldAddress::root().field("reviews").index(1).field("rating");
        assert_eq!(built, "reviews[1].rating".parse().unwrap());
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!("".parse::<FieldAddress>(), Err(AddressError::Empty));
        assert!("a..b".parse::<FieldAddress>().is_err());
        assert!("a[x]".parse::<FieldAddress>().is_err());
        assert!("a[1".parse::<FieldAddress>().is_err());
        assert!("a[1]b".parse::<FieldAddress>().is_err());
        assert!("[1]".parse::<FieldAddress>().is_err());
    }
}
