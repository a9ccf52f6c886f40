//! Audience resolver: turns an audience specification into recipients.
//!
//! Resolution is split in two steps:
//! 1. `Audience::from_spec` validates the loosely-typed specification
//! 2. `AudienceResolver::resolve` binds it to a directory snapshot and a
//!    channel, returning a [`Resolution`]
//!
//! A `Resolution` is lazy and restartable: every call to `iter()` walks the
//! snapshot from the start, so two passes always agree.

use std::sync::Arc;

use rollcall_common::error::AppError;
use rollcall_common::types::{
    AudienceSpecification, Channel, ListEntry, Member, Recipient, TargetType,
};

use crate::dedup::normalize_address;
use crate::directory::{Directory, DirectoryHandle};

/// A validated audience.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    Role(String),
    Region {
        region: String,
        role_scope: Option<String>,
    },
    User(String),
    CustomList(Vec<ListEntry>),
}

impl Audience {
    /// Validate a specification.
    pub fn from_spec(spec: &AudienceSpecification) -> Result<Self, AppError> {
        if spec.explicit_list.is_some() && spec.target_type != TargetType::CustomList {
            return Err(AppError::Validation(format!(
                "explicit_list is only allowed for custom_list targets, not '{}'",
                spec.target_type
            )));
        }

        let audience = match spec.target_type {
            TargetType::All => Audience::All,
            TargetType::Role => Audience::Role(required_value(spec)?),
            TargetType::Region => Audience::Region {
                region: required_value(spec)?,
                role_scope: spec
                    .role_scope
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
            },
            TargetType::User => Audience::User(required_value(spec)?),
            TargetType::CustomList => {
                let list = spec.explicit_list.clone().ok_or_else(|| {
                    AppError::Validation("custom_list target requires explicit_list".to_string())
                })?;
                Audience::CustomList(list)
            }
        };

        Ok(audience)
    }
}

fn required_value(spec: &AudienceSpecification) -> Result<String, AppError> {
    spec.target_value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "'{}' target requires a non-empty target_value",
                spec.target_type
            ))
        })
}

/// Resolves audiences against the current member directory.
#[derive(Debug, Clone, Default)]
pub struct AudienceResolver {
    directory: DirectoryHandle,
}

impl AudienceResolver {
    pub fn new(directory: DirectoryHandle) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &DirectoryHandle {
        &self.directory
    }

    /// Bind `spec` to the current directory snapshot for `channel`.
    ///
    /// Fails with `Validation` for malformed specifications and with
    /// `Resolution` when a user target does not identify exactly one member.
    /// A filter that matches nobody is not an error here.
    pub fn resolve(
        &self,
        spec: &AudienceSpecification,
        channel: Channel,
    ) -> Result<Resolution, AppError> {
        let audience = Audience::from_spec(spec)?;
        let directory = self.directory.snapshot();

        let source = match audience {
            Audience::All => Source::Filter(Filter::All),
            Audience::Role(role) => Source::Filter(Filter::Role(role)),
            Audience::Region { region, role_scope } => {
                let consistent = role_scope
                    .as_deref()
                    .is_none_or(|role| region_offered_for_role(&directory, &region, role));
                if consistent {
                    Source::Filter(Filter::Region(region))
                } else {
                    tracing::debug!(
                        region = %region,
                        role_scope = ?role_scope,
                        "Region not offered for role, resolving to nobody"
                    );
                    Source::Filter(Filter::Nobody)
                }
            }
            Audience::User(key) => Source::Member(find_user(&directory, &key)?),
            Audience::CustomList(list) => Source::List(list),
        };

        Ok(Resolution {
            directory,
            source,
            channel,
        })
    }
}

/// A bound audience. Iterate it with [`Resolution::iter`].
#[derive(Debug, Clone)]
pub struct Resolution {
    directory: Arc<Directory>,
    source: Source,
    channel: Channel,
}

#[derive(Debug, Clone)]
enum Source {
    Filter(Filter),
    Member(usize),
    List(Vec<ListEntry>),
}

#[derive(Debug, Clone)]
enum Filter {
    All,
    Role(String),
    Region(String),
    Nobody,
}

impl Filter {
    fn matches(&self, member: &Member) -> bool {
        match self {
            Filter::All => true,
            Filter::Role(role) => same_label(member.role.as_deref(), role),
            Filter::Region(region) => same_label(member.region.as_deref(), region),
            Filter::Nobody => false,
        }
    }
}

/// Lazy pass over a resolution.
pub type Recipients<'a> = Box<dyn Iterator<Item = Recipient> + 'a>;

impl Resolution {
    /// Start a fresh pass over the resolved recipients.
    pub fn iter(&self) -> Recipients<'_> {
        let channel = self.channel;
        match &self.source {
            Source::Filter(filter) => Box::new(
                self.directory
                    .eligible()
                    .filter(move |m| filter.matches(m))
                    .filter_map(move |m| member_recipient(m, channel)),
            ),
            Source::Member(index) => Box::new(
                self.directory
                    .members()
                    .get(*index)
                    .and_then(|m| member_recipient(m, channel))
                    .into_iter(),
            ),
            Source::List(list) => Box::new(list.iter().map(list_recipient)),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl<'a> IntoIterator for &'a Resolution {
    type Item = Recipient;
    type IntoIter = Recipients<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn member_recipient(member: &Member, channel: Channel) -> Option<Recipient> {
    let address = member.address_for(channel)?;
    Some(Recipient::new(
        member.id.clone(),
        address,
        member.display_name.clone(),
    ))
}

fn list_recipient(entry: &ListEntry) -> Recipient {
    let address = entry.address().trim();
    let display_name = entry
        .display_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(address);
    Recipient::new(normalize_address(address), address, display_name)
}

fn same_label(value: Option<&str>, wanted: &str) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case(wanted.trim()))
}

/// A region is offered under a role when some eligible member holds both.
fn region_offered_for_role(directory: &Directory, region: &str, role: &str) -> bool {
    directory
        .eligible()
        .any(|m| same_label(m.role.as_deref(), role) && same_label(m.region.as_deref(), region))
}

fn find_user(directory: &Directory, key: &str) -> Result<usize, AppError> {
    let normalized = normalize_address(key);
    let matches: Vec<usize> = directory
        .members()
        .iter()
        .enumerate()
        .filter(|(_, m)| m.active)
        .filter(|(_, m)| {
            m.id == key
                || m.email
                    .as_deref()
                    .is_some_and(|e| normalize_address(e) == normalized)
        })
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [index] => Ok(*index),
        [] => Err(AppError::Resolution(format!(
            "No member matches user '{}'",
            key
        ))),
        many => Err(AppError::Resolution(format!(
            "User '{}' matches {} members",
            key,
            many.len()
        ))),
    }
}
