//! The inbound event taxonomy.
//!
//! Each payload pushed by mirai-api-http carries a `type` discriminator that
//! maps one-to-one onto an [`Event`] variant and an [`EventKind`]. Payloads
//! with a discriminator this client does not know decode to
//! [`Event::Unknown`] so a newer server never breaks the stream.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{Friend, Group, Member, Permission};
use super::message::MessageChain;

// =============================================================================
// Payload structs
// =============================================================================

/// Bot account came online, went offline or re-logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotStatusEvent {
    pub qq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotGroupPermissionChangeEvent {
    pub origin: Permission,
    #[serde(alias = "new")]
    pub current: Permission,
    pub group: Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotMuteEvent {
    pub duration_seconds: i64,
    pub operator: Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotUnmuteEvent {
    pub operator: Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotJoinGroupEvent {
    pub group: Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecallEvent {
    pub author_id: i64,
    pub message_id: i64,
    pub time: i64,
    pub group: Group,
    #[serde(default)]
    pub operator: Option<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRecallEvent {
    pub author_id: i64,
    pub message_id: i64,
    pub time: i64,
    pub operator: i64,
}

/// A group setting changed from `origin` to `current`.
///
/// `operator` is absent when the bot itself made the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChangeEvent<T> {
    pub origin: T,
    #[serde(alias = "new")]
    pub current: T,
    pub group: Group,
    #[serde(default)]
    pub operator: Option<Member>,
    #[serde(default)]
    pub is_by_bot: bool,
}

/// A member joined, left or was unmuted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEvent {
    pub member: Member,
    #[serde(default)]
    pub operator: Option<Member>,
}

/// A member's card, title or permission changed from `origin` to `current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberChangeEvent<T> {
    pub origin: T,
    #[serde(alias = "new")]
    pub current: T,
    pub member: Member,
    #[serde(default)]
    pub operator: Option<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMuteEvent {
    pub duration_seconds: i64,
    pub member: Member,
    #[serde(default)]
    pub operator: Option<Member>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendMessage {
    pub message_chain: MessageChain,
    pub sender: Friend,
}

/// A group message, or a temporary session message started from a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub message_chain: MessageChain,
    pub sender: Member,
}

/// Someone asked to become the bot's friend.
///
/// The ids are needed verbatim to answer the request later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFriendRequestEvent {
    #[serde(rename = "eventId")]
    pub request_id: i64,
    #[serde(rename = "fromId")]
    pub supplicant: i64,
    /// Group the request came through, 0 if none.
    #[serde(rename = "groupId", default)]
    pub source_group: i64,
    #[serde(rename = "nick", default)]
    pub nickname: String,
    #[serde(default)]
    pub message: String,
}

/// Someone asked to join a group the bot administers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJoinRequestEvent {
    #[serde(rename = "eventId")]
    pub request_id: i64,
    #[serde(rename = "fromId")]
    pub supplicant: i64,
    #[serde(rename = "groupId")]
    pub source_group: i64,
    #[serde(rename = "groupName", default)]
    pub group_name: String,
    #[serde(rename = "nick", default)]
    pub nickname: String,
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Request answers
// =============================================================================

/// Answer to a [`NewFriendRequestEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewFriendRequestResponse {
    Accept,
    Refuse,
    RefuseAndBlacklist,
}

impl NewFriendRequestResponse {
    pub fn operate(self) -> i32 {
        match self {
            Self::Accept => 0,
            Self::Refuse => 1,
            Self::RefuseAndBlacklist => 2,
        }
    }
}

/// Answer to a [`MemberJoinRequestEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberJoinRequestResponse {
    Accept,
    Refuse,
    Ignore,
    RefuseAndBlacklist,
    IgnoreAndBlacklist,
}

impl MemberJoinRequestResponse {
    pub fn operate(self) -> i32 {
        match self {
            Self::Accept => 0,
            Self::Refuse => 1,
            Self::Ignore => 2,
            Self::RefuseAndBlacklist => 3,
            Self::IgnoreAndBlacklist => 4,
        }
    }
}

// =============================================================================
// Event
// =============================================================================

macro_rules! events {
    ($($(#[$meta:meta])* $variant:ident($payload:ty)),* $(,)?) => {
        /// A decoded inbound event.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type")]
        pub enum Event {
            $($(#[$meta])* $variant($payload),)*
            /// Event with a discriminator this client does not know.
            #[serde(untagged)]
            Unknown(Value),
        }

        /// The discriminator of an [`Event`], used as the dispatch key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $($variant,)*
            Unknown,
        }

        impl EventKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant,)* EventKind::Unknown];

            /// The wire discriminator for this kind.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventKind::$variant => stringify!($variant),)*
                    EventKind::Unknown => "Unknown",
                }
            }

            /// Looks up a kind by its wire discriminator.
            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $(stringify!($variant) => Some(EventKind::$variant),)*
                    _ => None,
                }
            }
        }

        impl Event {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Event::$variant(_) => EventKind::$variant,)*
                    Event::Unknown(_) => EventKind::Unknown,
                }
            }
        }
    };
}

events! {
    BotOnlineEvent(BotStatusEvent),
    BotOfflineEventActive(BotStatusEvent),
    BotOfflineEventForce(BotStatusEvent),
    BotOfflineEventDropped(BotStatusEvent),
    BotReloginEvent(BotStatusEvent),
    BotGroupPermissionChangeEvent(BotGroupPermissionChangeEvent),
    BotMuteEvent(BotMuteEvent),
    BotUnmuteEvent(BotUnmuteEvent),
    BotJoinGroupEvent(BotJoinGroupEvent),
    GroupRecallEvent(GroupRecallEvent),
    FriendRecallEvent(FriendRecallEvent),
    GroupNameChangeEvent(GroupChangeEvent<String>),
    GroupEntranceAnnouncementChangeEvent(GroupChangeEvent<String>),
    GroupMuteAllEvent(GroupChangeEvent<bool>),
    GroupAllowAnonymousChatEvent(GroupChangeEvent<bool>),
    GroupAllowConfessTalkEvent(GroupChangeEvent<bool>),
    GroupAllowMemberInviteEvent(GroupChangeEvent<bool>),
    MemberJoinEvent(MemberEvent),
    MemberLeaveEventKick(MemberEvent),
    MemberLeaveEventQuit(MemberEvent),
    MemberCardChangeEvent(MemberChangeEvent<String>),
    MemberSpecialTitleChangeEvent(MemberChangeEvent<String>),
    MemberPermissionChangeEvent(MemberChangeEvent<Permission>),
    MemberMuteEvent(MemberMuteEvent),
    MemberUnmuteEvent(MemberEvent),
    FriendMessage(FriendMessage),
    GroupMessage(GroupMessage),
    TempMessage(GroupMessage),
    NewFriendRequestEvent(NewFriendRequestEvent),
    MemberJoinRequestEvent(MemberJoinRequestEvent),
}

impl EventKind {
    /// Kinds that carry a message chain.
    pub const MESSAGES: &'static [EventKind] = &[
        EventKind::FriendMessage,
        EventKind::GroupMessage,
        EventKind::TempMessage,
    ];

    pub fn is_message(self) -> bool {
        Self::MESSAGES.contains(&self)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// The message chain of a message event.
    pub fn message_chain(&self) -> Option<&MessageChain> {
        match self {
            Event::FriendMessage(m) => Some(&m.message_chain),
            Event::GroupMessage(m) | Event::TempMessage(m) => Some(&m.message_chain),
            _ => None,
        }
    }

    pub fn message_chain_mut(&mut self) -> Option<&mut MessageChain> {
        match self {
            Event::FriendMessage(m) => Some(&mut m.message_chain),
            Event::GroupMessage(m) | Event::TempMessage(m) => Some(&mut m.message_chain),
            _ => None,
        }
    }

    /// Id of whoever sent a message event.
    pub fn sender_id(&self) -> Option<i64> {
        match self {
            Event::FriendMessage(m) => Some(m.sender.id),
            Event::GroupMessage(m) | Event::TempMessage(m) => Some(m.sender.id),
            _ => None,
        }
    }

    /// Plain text of a message event, empty for other events.
    pub fn plain_text(&self) -> String {
        self.message_chain()
            .map(MessageChain::plain_text)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_tags_roundtrip() {
        for kind in EventKind::ALL {
            if *kind == EventKind::Unknown {
                assert_eq!(EventKind::from_tag("Unknown"), None);
            } else {
                assert_eq!(EventKind::from_tag(kind.as_str()), Some(*kind));
            }
        }
    }

    #[test]
    fn test_decode_friend_request() {
        let event: Event = serde_json::from_value(json!({
            "type": "NewFriendRequestEvent",
            "eventId": 12345678,
            "fromId": 123,
            "groupId": 0,
            "nick": "carol",
            "message": "hi"
        }))
        .unwrap();

        let Event::NewFriendRequestEvent(request) = event else {
            panic!("wrong variant");
        };
        assert_eq!(request.request_id, 12345678);
        assert_eq!(request.supplicant, 123);
        assert_eq!(request.source_group, 0);
        assert_eq!(request.nickname, "carol");
    }

    #[test]
    fn test_decode_group_change_accepts_legacy_field() {
        let event: Event = serde_json::from_value(json!({
            "type": "GroupMuteAllEvent",
            "origin": false,
            "new": true,
            "group": { "id": 1, "name": "g", "permission": "OWNER" },
            "operator": null
        }))
        .unwrap();

        let Event::GroupMuteAllEvent(change) = event else {
            panic!("wrong variant");
        };
        assert!(change.current);
        assert!(change.operator.is_none());
        assert!(!change.is_by_bot);
    }

    #[test]
    fn test_request_response_codes() {
        assert_eq!(NewFriendRequestResponse::RefuseAndBlacklist.operate(), 2);
        assert_eq!(MemberJoinRequestResponse::Ignore.operate(), 2);
        assert_eq!(MemberJoinRequestResponse::IgnoreAndBlacklist.operate(), 4);
    }
}
