//! Data types mirroring the mirai-api-http JSON shapes.

pub mod entity;
pub mod event;
pub mod message;

pub use entity::{Friend, Group, GroupSetting, Member, MemberSetting, Permission, Target};
pub use event::{
    BotGroupPermissionChangeEvent, BotJoinGroupEvent, BotMuteEvent, BotStatusEvent,
    BotUnmuteEvent, Event, EventKind, FriendMessage, FriendRecallEvent, GroupChangeEvent,
    GroupMessage, GroupRecallEvent, MemberChangeEvent, MemberEvent, MemberJoinRequestEvent,
    MemberJoinRequestResponse, MemberMuteEvent, NewFriendRequestEvent, NewFriendRequestResponse,
};
pub use message::{
    AppData, AtData, Component, FaceData, ImageData, ImageScope, JsonData, MessageChain,
    PlainData, PokeData, PokeKind, QuoteData, SourceData, XmlData,
};
