//! Realized dynamic column membership.
//!
//! A [`DynamicColumns`] mapping records, for one physical unit, which members
//! of each dynamic group were actually written. It is stored as a single
//! key/value entry in the Parquet footer under [`DYNAMIC_COLUMNS_KEY`] using
//! the textual form `group:member1,member2;group2:member`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Footer metadata key holding the serialized [`DynamicColumns`].
pub const DYNAMIC_COLUMNS_KEY: &str = "dynamic_columns";

const GROUP_SEPARATOR: char = ';';
const MEMBER_SEPARATOR: char = ',';
const NAME_SEPARATOR: char = ':';

/// Failure to parse or build a [`DynamicColumns`] mapping.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseDynamicColumnsError {
    #[error("group entry {entry:?} is missing ':'")]
    MissingSeparator { entry: String },

    #[error("group entry {entry:?} has an empty group name")]
    EmptyGroup { entry: String },

    #[error("group {group:?} appears more than once")]
    DuplicateGroup { group: String },

    #[error("member {member:?} appears more than once in group {group:?}")]
    DuplicateMember { group: String, member: String },

    #[error("group {group:?} has an empty member name")]
    EmptyMember { group: String },

    #[error("name {name:?} contains one of the reserved characters ':', ',' or ';'")]
    ReservedCharacter { name: String },
}

/// Mapping from dynamic group name to its realized member names.
///
/// Groups are kept sorted by name. Members keep the order they were
/// inserted in, and that order survives a serialize/deserialize round trip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicColumns {
    groups: BTreeMap<String, Vec<String>>,
}

impl DynamicColumns {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the members of `group`, replacing any previous entry.
    pub fn insert<I, S>(&mut self, group: impl Into<String>, members: I) -> Result<(), ParseDynamicColumnsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = group.into();
        check_group(&group, &group)?;
        let mut seen = BTreeSet::new();
        let mut list = Vec::new();
        for member in members {
            let member = member.into();
            check_member(&group, &member)?;
            if !seen.insert(member.clone()) {
                return Err(ParseDynamicColumnsError::DuplicateMember { group, member });
            }
            list.push(member);
        }
        self.groups.insert(group, list);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_group<I, S>(mut self, group: impl Into<String>, members: I) -> Result<Self, ParseDynamicColumnsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(group, members)?;
        Ok(self)
    }

    /// Appends `member` to `group` unless it is already present.
    pub fn insert_member(
        &mut self,
        group: impl Into<String>,
        member: impl Into<String>,
    ) -> Result<(), ParseDynamicColumnsError> {
        let group = group.into();
        let member = member.into();
        check_group(&group, &group)?;
        check_member(&group, &member)?;
        let members = self.groups.entry(group).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
        Ok(())
    }

    /// Returns the members realized for `group`.
    pub fn get(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Returns true if `member` is realized in `group`.
    pub fn contains(&self, group: &str, member: &str) -> bool {
        self.groups
            .get(group)
            .map(|members| members.iter().any(|m| m == member))
            .unwrap_or(false)
    }

    /// Returns the group names in sorted order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Iterates over `(group, members)` pairs in group order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(group, members)| (group.as_str(), members.as_slice()))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Encodes the mapping in its footer form.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Parses the footer form produced by [`serialize`](Self::serialize).
    pub fn deserialize(raw: &str) -> Result<Self, ParseDynamicColumnsError> {
        let mut columns = DynamicColumns::new();
        if raw.is_empty() {
            return Ok(columns);
        }
        for entry in raw.split(GROUP_SEPARATOR) {
            let (group, members) = entry.split_once(NAME_SEPARATOR).ok_or_else(|| {
                ParseDynamicColumnsError::MissingSeparator {
                    entry: entry.to_string(),
                }
            })?;
            if group.is_empty() {
                return Err(ParseDynamicColumnsError::EmptyGroup {
                    entry: entry.to_string(),
                });
            }
            if columns.groups.contains_key(group) {
                return Err(ParseDynamicColumnsError::DuplicateGroup {
                    group: group.to_string(),
                });
            }
            let members: Vec<&str> = if members.is_empty() {
                Vec::new()
            } else {
                members.split(MEMBER_SEPARATOR).collect()
            };
            columns.insert(group, members)?;
        }
        Ok(columns)
    }

    /// Merges several mappings into one.
    ///
    /// Each group of the result holds the sorted, de-duplicated members
    /// realized in any of the inputs.
    pub fn union<'a, I>(mappings: I) -> DynamicColumns
    where
        I: IntoIterator<Item = &'a DynamicColumns>,
    {
        let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for mapping in mappings {
            for (group, members) in mapping.iter() {
                merged
                    .entry(group.to_string())
                    .or_default()
                    .extend(members.iter().cloned());
            }
        }
        DynamicColumns {
            groups: merged
                .into_iter()
                .map(|(group, members)| (group, members.into_iter().collect()))
                .collect(),
        }
    }
}

impl fmt::Display for DynamicColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (group, members)) in self.groups.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", GROUP_SEPARATOR)?;
            }
            write!(f, "{}{}", group, NAME_SEPARATOR)?;
            for (j, member) in members.iter().enumerate() {
                if j > 0 {
                    write!(f, "{}", MEMBER_SEPARATOR)?;
                }
                f.write_str(member)?;
            }
        }
        Ok(())
    }
}

fn is_reserved(c: char) -> bool {
    c == GROUP_SEPARATOR || c == MEMBER_SEPARATOR || c == NAME_SEPARATOR
}

fn check_group(group: &str, entry: &str) -> Result<(), ParseDynamicColumnsError> {
    if group.is_empty() {
        return Err(ParseDynamicColumnsError::EmptyGroup {
            entry: entry.to_string(),
        });
    }
    if group.chars().any(is_reserved) {
        return Err(ParseDynamicColumnsError::ReservedCharacter {
            name: group.to_string(),
        });
    }
    Ok(())
}

fn check_member(group: &str, member: &str) -> Result<(), ParseDynamicColumnsError> {
    if member.is_empty() {
        return Err(ParseDynamicColumnsError::EmptyMember {
            group: group.to_string(),
        });
    }
    if member.chars().any(is_reserved) {
        return Err(ParseDynamicColumnsError::ReservedCharacter {
            name: member.to_string(),
        });
    }
    Ok(())
}
