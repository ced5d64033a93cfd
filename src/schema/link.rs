//! Relationships between two spaces.

use std::fmt;

use crate::space::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkKind::ManyToOne => "m2o",
            LinkKind::OneToMany => "o2m",
            LinkKind::ManyToMany => "m2m",
        })
    }
}

/// A resolved relationship. Addresses are column addresses in the spaces
/// the link was resolved for (interim columns live in the junction's own
/// single-unit space).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Source owns a foreign key to the target: `source.fk = target.key`.
    ManyToOne { source: Address, target: Address },
    /// Target owns a foreign key to the source: `source.key = target.fk`.
    OneToMany { source: Address, target: Address },
    /// A junction table owns keys to both sides.
    ManyToMany {
        source: Address,
        interim_source: Address,
        interim_target: Address,
        target: Address,
    },
}

impl Link {
    pub fn kind(&self) -> LinkKind {
        match self {
            Link::ManyToOne { .. } => LinkKind::ManyToOne,
            Link::OneToMany { .. } => LinkKind::OneToMany,
            Link::ManyToMany { .. } => LinkKind::ManyToMany,
        }
    }

    /// Column on the source side of the relationship.
    pub fn source(&self) -> &Address {
        match self {
            Link::ManyToOne { source, .. }
            | Link::OneToMany { source, .. }
            | Link::ManyToMany { source, .. } => source,
        }
    }

    /// Column on the target side of the relationship.
    pub fn target(&self) -> &Address {
        match self {
            Link::ManyToOne { target, .. }
            | Link::OneToMany { target, .. }
            | Link::ManyToMany { target, .. } => target,
        }
    }

    /// Junction table name, for many-to-many links.
    pub fn interim(&self) -> Option<&str> {
        match self {
            Link::ManyToMany { interim_source, .. } => Some(interim_source.space.last()),
            _ => None,
        }
    }

    /// Whether the target is fetched by a secondary statement instead of a join.
    pub fn is_deferred(&self) -> bool {
        !matches!(self, Link::ManyToOne { .. })
    }

    /// Stable identity used to deduplicate joins.
    pub fn identity(&self) -> String {
        format!(
            "{}:{}->{}",
            self.kind(),
            self.source().qualified_name(),
            self.target().qualified_name()
        )
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::ManyToMany {
                source,
                interim_source,
                interim_target,
                target,
            } => write!(
                f,
                "{} {} = {} / {} = {}",
                self.kind(),
                source,
                interim_source,
                interim_target,
                target
            ),
            _ => write!(f, "{} {} = {}", self.kind(), self.source(), self.target()),
        }
    }
}
