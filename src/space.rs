//! Hierarchical naming for nested buckets.
//!
//! A [`Space`] is the path of [`TrackUnit`]s from the root bucket down to a
//! nested one. It drives table aliasing and result-column naming:
//!
//! ```text
//!   book -> author:editor:ed          qualified: book__author:editor:ed
//!                                     display:   book__ed
//!   Address("name", that space)       alias:     ed__name
//! ```
//!
//! Equality and hashing use the qualified form, so two spaces built from the
//! same units compare equal no matter how they were assembled.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between path segments in qualified and display names.
pub const SEPARATOR: &str = "__";

/// Separator between the parts of a single unit: `name:qualifier:label`.
const PART_SEPARATOR: char = ':';

/// One path segment: a table name with optional qualifier and label.
///
/// The qualifier selects which foreign key column relates this unit to its
/// parent (`{qualifier}_id`); the label renames the unit in output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrackUnit {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TrackUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            label: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// `name[:qualifier[:label]]`, emitting only the parts needed.
    pub fn qualified_name(&self) -> String {
        match (&self.qualifier, &self.label) {
            (None, None) => self.name.clone(),
            (Some(q), None) => format!("{}{}{}", self.name, PART_SEPARATOR, q),
            (q, Some(l)) => format!(
                "{}{sep}{}{sep}{}",
                self.name,
                q.as_deref().unwrap_or(""),
                l,
                sep = PART_SEPARATOR
            ),
        }
    }

    /// First non-empty of label, qualifier, name.
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.qualifier.as_deref())
            .unwrap_or(&self.name)
    }

    /// Whether this unit needs its own table alias.
    pub fn is_aliased(&self) -> bool {
        self.qualifier.is_some() || self.label.is_some()
    }

    /// The same table without qualifier or label.
    pub fn bare(&self) -> Self {
        Self::new(self.name.clone())
    }

    fn parse(part: &str) -> Self {
        let mut pieces = part.splitn(3, PART_SEPARATOR);
        let name = pieces.next().unwrap_or_default().to_string();
        let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        let qualifier = non_empty(pieces.next());
        let label = non_empty(pieces.next());
        Self {
            name,
            qualifier,
            label,
        }
    }
}

impl fmt::Display for TrackUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Ordered path of units from the root bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Space {
    track: Vec<TrackUnit>,
}

impl Space {
    pub fn new(track: Vec<TrackUnit>) -> Self {
        Self { track }
    }

    pub fn root(unit: TrackUnit) -> Self {
        Self { track: vec![unit] }
    }

    /// Parse `a__b:q__c:q:l` into units. The empty string is the empty space.
    pub fn parse(value: &str) -> Self {
        if value.is_empty() {
            return Self::default();
        }
        Self {
            track: value.split(SEPARATOR).map(TrackUnit::parse).collect(),
        }
    }

    pub fn units(&self) -> &[TrackUnit] {
        &self.track
    }

    pub fn len(&self) -> usize {
        self.track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track.is_empty()
    }

    /// Innermost unit.
    pub fn last_unit(&self) -> Option<&TrackUnit> {
        self.track.last()
    }

    /// Bare table name of the innermost unit, or `""` for the empty space.
    pub fn last(&self) -> &str {
        self.track.last().map(|u| u.name.as_str()).unwrap_or("")
    }

    /// Units in `[start, end)`. Out-of-range bounds are clamped.
    pub fn slice(&self, start: usize, end: Option<usize>) -> Space {
        let end = end.unwrap_or(self.track.len()).min(self.track.len());
        let start = start.min(end);
        Space {
            track: self.track[start..end].to_vec(),
        }
    }

    /// This space with one more unit appended.
    pub fn child(&self, unit: TrackUnit) -> Space {
        let mut track = self.track.clone();
        track.push(unit);
        Space { track }
    }

    pub fn qualified_name(&self) -> String {
        self.track
            .iter()
            .map(TrackUnit::qualified_name)
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, unit) in self.track.iter().enumerate() {
            if i > 0 {
                f.write_str(SEPARATOR)?;
            }
            f.write_str(unit.display_name())?;
        }
        Ok(())
    }
}

impl PartialEq for Space {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name() == other.qualified_name()
    }
}

impl Eq for Space {}

impl Hash for Space {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualified_name().hash(state);
    }
}

impl FromStr for Space {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Space::parse(s))
    }
}

impl Add<&Space> for &Space {
    type Output = Space;

    fn add(self, rhs: &Space) -> Space {
        let mut track = self.track.clone();
        track.extend(rhs.track.iter().cloned());
        Space { track }
    }
}

impl Add<&str> for &Space {
    type Output = Space;

    fn add(self, rhs: &str) -> Space {
        self + &Space::parse(rhs)
    }
}

impl From<TrackUnit> for Space {
    fn from(unit: TrackUnit) -> Self {
        Space::root(unit)
    }
}

/// A column (or any named leaf) inside a space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub space: Space,
}

impl Address {
    pub fn new(name: impl Into<String>, space: Space) -> Self {
        Self {
            name: name.into(),
            space,
        }
    }

    pub fn qualified_name(&self) -> String {
        if self.space.is_empty() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.space.qualified_name(), SEPARATOR, self.name)
        }
    }

    /// Result-column alias: display form relative to the root unit.
    ///
    /// Columns of the root bucket are named by themselves; nested ones carry
    /// the display path below the root, e.g. `author__name`.
    pub fn alias(&self) -> String {
        if self.space.len() > 1 {
            Address::new(self.name.clone(), self.space.slice(1, None)).to_string()
        } else {
            self.name.clone()
        }
    }

    /// Reverse of [`Address::alias`] for the given root space.
    ///
    /// Path segments are read back as bare units, so this round-trips for
    /// spaces whose nested units carry no qualifier or label.
    pub fn from_alias(root: &Space, alias: &str) -> Address {
        let mut parts: Vec<&str> = alias.split(SEPARATOR).collect();
        let name = parts.pop().unwrap_or_default().to_string();
        let nested = parts.into_iter().map(TrackUnit::new).collect();
        Address::new(name, root + &Space::new(nested))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.space.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}{}{}", self.space, SEPARATOR, self.name)
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name() == other.qualified_name()
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualified_name().hash(state);
    }
}
