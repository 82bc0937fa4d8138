//! REST paths of mirai-api-http, relative to the configured base url.

pub const VERIFY: &str = "/verify";
pub const BIND: &str = "/bind";
pub const RELEASE: &str = "/release";

pub const SEND_FRIEND_MESSAGE: &str = "/sendFriendMessage";
pub const SEND_GROUP_MESSAGE: &str = "/sendGroupMessage";
pub const SEND_TEMP_MESSAGE: &str = "/sendTempMessage";
pub const RECALL: &str = "/recall";
pub const UPLOAD_IMAGE: &str = "/uploadImage";
pub const FETCH_MESSAGE: &str = "/fetchMessage";
pub const MESSAGE_FROM_ID: &str = "/messageFromId";

pub const FRIEND_LIST: &str = "/friendList";
pub const GROUP_LIST: &str = "/groupList";
pub const MEMBER_LIST: &str = "/memberList";

pub const MUTE_ALL: &str = "/muteAll";
pub const UNMUTE_ALL: &str = "/unmuteAll";
pub const MUTE: &str = "/mute";
pub const UNMUTE: &str = "/unmute";
pub const KICK: &str = "/kick";
pub const QUIT: &str = "/quit";
pub const MEMBER_INFO: &str = "/memberInfo";
pub const GROUP_CONFIG: &str = "/groupConfig";

pub const RESP_NEW_FRIEND_REQUEST: &str = "/resp/newFriendRequestEvent";
pub const RESP_MEMBER_JOIN_REQUEST: &str = "/resp/memberJoinRequestEvent";

pub const CONFIG: &str = "/config";

/// Which events a websocket stream subscribes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Listen {
    /// Messages and events.
    #[default]
    All,
    /// Non-message events only.
    Event,
    /// Messages only.
    Message,
}

impl Listen {
    pub fn as_str(self) -> &'static str {
        match self {
            Listen::All => "all",
            Listen::Event => "event",
            Listen::Message => "message",
        }
    }
}

/// Path and query string of the event stream for one session.
pub fn event_stream(listen: Listen, session_key: &str, qq: i64) -> String {
    format!("/{}?sessionKey={session_key}&qq={qq}", listen.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_stream_path() {
        assert_eq!(
            event_stream(Listen::Message, "abc", 10001),
            "/message?sessionKey=abc&qq=10001"
        );
        assert_eq!(event_stream(Listen::default(), "k", 1), "/all?sessionKey=k&qq=1");
    }
}
