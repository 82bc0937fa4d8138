//! Contacts known to the bot: friends, groups and group members.

use serde::{Deserialize, Serialize};

/// A member's role inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Member,
    Administrator,
    Owner,
}

/// A friend of the bot account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub remark: String,
}

impl Friend {
    /// URL of the friend's avatar image.
    pub fn avatar_url(&self) -> String {
        format!("https://q4.qlogo.cn/g?b=qq&nk={}&s=140", self.id)
    }
}

/// A group the bot account is in, with the bot's own permission there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub permission: Permission,
}

impl Group {
    /// URL of the group's avatar image.
    pub fn avatar_url(&self) -> String {
        format!("https://p.qlogo.cn/gh/{0}/{0}/", self.id)
    }
}

/// A member of some group.
///
/// `group` is a snapshot of the owning group taken when the payload was
/// produced; it is for lookup only and carries no ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    #[serde(default)]
    pub member_name: String,
    pub permission: Permission,
    pub group: Group,
}

impl Member {
    /// URL of the member's avatar image.
    pub fn avatar_url(&self) -> String {
        format!("https://q4.qlogo.cn/g?b=qq&nk={}&s=140", self.id)
    }
}

/// Editable part of a member's profile, used by `memberInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSetting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_title: Option<String>,
}

/// Group-wide settings, used by `groupConfig`.
///
/// Fields left `None` are not sent, so the same type serves partial updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSetting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confess_talk: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_member_invite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_chat: Option<bool>,
}

// =============================================================================
// Target
// =============================================================================

/// Anything an API call can address: a bare id or a contact entity.
///
/// Every command that takes a target accepts `impl Into<Target>`, and
/// [`Target::id`] is the only place the entity forms are reduced to a number.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Id(i64),
    Friend(&'a Friend),
    Group(&'a Group),
    Member(&'a Member),
}

impl Target<'_> {
    /// Resolves the target to its numeric id.
    pub fn id(self) -> i64 {
        match self {
            Target::Id(id) => id,
            Target::Friend(friend) => friend.id,
            Target::Group(group) => group.id,
            Target::Member(member) => member.id,
        }
    }
}

impl From<i64> for Target<'_> {
    fn from(id: i64) -> Self {
        Target::Id(id)
    }
}

impl<'a> From<&'a Friend> for Target<'a> {
    fn from(friend: &'a Friend) -> Self {
        Target::Friend(friend)
    }
}

impl<'a> From<&'a Group> for Target<'a> {
    fn from(group: &'a Group) -> Self {
        Target::Group(group)
    }
}

impl<'a> From<&'a Member> for Target<'a> {
    fn from(member: &'a Member) -> Self {
        Target::Member(member)
    }
}
