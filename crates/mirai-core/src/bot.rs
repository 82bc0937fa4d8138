//! The command facade.
//!
//! [`Bot`] wraps every REST endpoint behind a strongly-typed method. All of
//! them go through [`Bot::call`], which retries once after a fresh handshake
//! when the first attempt fails with a network, authentication or session
//! error. Other errors reach the caller unchanged. Such a failure also marks
//! the session lost, so the event source attached to it is restarted.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mirai_core::{Bot, MessageChain, MessageTarget};
//!
//! let bot = Bot::new(transport, "INITKEY", 10001);
//! bot.handshake().await?;
//! let id = bot
//!     .send_group_message(123456, MessageChain::new().at(10002).plain(" hi"), None)
//!     .await?;
//! bot.recall(id).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Instrument, Span, debug, warn};

use crate::decode::decode;
use crate::endpoints;
use crate::error::{ApiError, ApiResult};
use crate::model::{
    Component, Event, Friend, Group, GroupSetting, ImageData, ImageScope, Member,
    MemberJoinRequestEvent, MemberJoinRequestResponse, MemberSetting, MessageChain,
    NewFriendRequestEvent, NewFriendRequestResponse, Target,
};
use crate::session::Session;
use crate::transport::BoxedTransport;

/// Shortest mute the server accepts.
pub const MUTE_MIN: Duration = Duration::from_secs(60);
/// Longest mute the server accepts (30 days).
pub const MUTE_MAX: Duration = Duration::from_secs(2_592_000);

/// Clamps a mute duration into the accepted range, in whole seconds.
pub fn clamp_mute(duration: Duration) -> u64 {
    duration.clamp(MUTE_MIN, MUTE_MAX).as_secs()
}

// =============================================================================
// MessageTarget
// =============================================================================

/// Where an outgoing message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    Friend(i64),
    Group(i64),
    /// Temporary session with a member, started from a group.
    Temp { group: i64, qq: i64 },
}

impl MessageTarget {
    pub fn friend<'a>(friend: impl Into<Target<'a>>) -> Self {
        Self::Friend(friend.into().id())
    }

    pub fn group<'a>(group: impl Into<Target<'a>>) -> Self {
        Self::Group(group.into().id())
    }

    pub fn temp<'a, 'b>(group: impl Into<Target<'a>>, member: impl Into<Target<'b>>) -> Self {
        Self::Temp {
            group: group.into().id(),
            qq: member.into().id(),
        }
    }

    /// Temporary session with a member of the group the member belongs to.
    pub fn temp_with(member: &Member) -> Self {
        Self::Temp {
            group: member.group.id,
            qq: member.id,
        }
    }

    /// Value of the `type` field when uploading an image for this target.
    pub fn upload_kind(self) -> &'static str {
        match self {
            Self::Friend(_) => "friend",
            Self::Group(_) => "group",
            Self::Temp { .. } => "temp",
        }
    }

    /// Image id scope accepted by this target.
    pub fn image_scope(self) -> ImageScope {
        match self {
            Self::Group(_) => ImageScope::Group,
            Self::Friend(_) | Self::Temp { .. } => ImageScope::Friend,
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            Self::Friend(_) => endpoints::SEND_FRIEND_MESSAGE,
            Self::Group(_) => endpoints::SEND_GROUP_MESSAGE,
            Self::Temp { .. } => endpoints::SEND_TEMP_MESSAGE,
        }
    }

    fn address(self) -> Value {
        match self {
            Self::Friend(id) | Self::Group(id) => json!({ "target": id }),
            Self::Temp { group, qq } => json!({ "qq": qq, "group": group }),
        }
    }
}

/// Server-side settings of the mirai-api-http session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_websocket: Option<bool>,
}

// =============================================================================
// Bot
// =============================================================================

/// A bot account reachable through mirai-api-http.
pub struct Bot {
    session: Session,
    transport: BoxedTransport,
    span: Span,
}

/// Reads the `data` field of a response, or the whole response if it has
/// none.
fn payload<T: DeserializeOwned>(mut response: Value) -> ApiResult<T> {
    let data = match response.get_mut("data") {
        Some(data) => data.take(),
        None => response,
    };
    Ok(serde_json::from_value(data)?)
}

fn with_session_key(mut params: Value, key: String) -> Value {
    if let Value::Object(map) = &mut params {
        map.insert("sessionKey".to_string(), Value::String(key));
    }
    params
}

macro_rules! impl_api {
    // No return value
    ($(#[$meta:meta])* $verb:ident $name:ident => $path:expr, ($($key:literal: $arg:ident: $typ:ty),*) $(,)?) => {
        $(#[$meta])*
        pub async fn $name(&self, $($arg: $typ),*) -> ApiResult<()> {
            self.$verb($path, json!({ $($key: $arg),* })).await?;
            Ok(())
        }
    };
    // Returns a type T (deserialized from "data" or the full response)
    ($(#[$meta:meta])* $verb:ident $name:ident => $path:expr, ($($key:literal: $arg:ident: $typ:ty),*) -> $ret:ty $(,)?) => {
        $(#[$meta])*
        pub async fn $name(&self, $($arg: $typ),*) -> ApiResult<$ret> {
            let response = self.$verb($path, json!({ $($key: $arg),* })).await?;
            payload::<$ret>(response)
        }
    };
}

impl Bot {
    /// Creates a bot; no network traffic happens until [`Bot::handshake`].
    pub fn new(transport: BoxedTransport, verify_key: impl Into<String>, qq: i64) -> Self {
        Self {
            session: Session::new(Arc::clone(&transport), verify_key, qq),
            transport,
            span: tracing::info_span!("bot", qq),
        }
    }

    /// Replaces the span this bot logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn qq(&self) -> i64 {
        self.session.qq()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Authenticates and binds a fresh session.
    pub async fn handshake(&self) -> ApiResult<()> {
        self.session.handshake().instrument(self.span.clone()).await
    }

    /// Releases the session; a no-op if none is established.
    pub async fn release(&self) -> ApiResult<()> {
        self.session.release().instrument(self.span.clone()).await
    }

    /// Runs `request` with the current session key, retrying once after a
    /// fresh handshake if it fails with a transient error.
    ///
    /// A transient failure marks the session lost whether or not the retry
    /// succeeds.
    ///
    /// This is the single retry policy every facade method goes through; it
    /// is public so custom endpoints can use it too.
    pub async fn call<T, F, Fut>(&self, action: &str, request: F) -> ApiResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let first = match self.session.require_key() {
            Ok(key) => request(key).await,
            Err(e) => Err(e),
        };
        let error = match first {
            Err(e) if e.is_transient() => e,
            other => return other,
        };

        warn!(parent: &self.span, action, error = %error, "Call failed, re-handshaking and retrying once");
        if matches!(error, ApiError::Session(_)) {
            self.session.invalidate();
        }
        let recovered = self.handshake().await;
        self.session.mark_lost();
        recovered?;
        request(self.session.require_key()?).await
    }

    async fn get(&self, path: &'static str, query: Value) -> ApiResult<Value> {
        self.call(path, |key| {
            let transport = Arc::clone(&self.transport);
            let query = with_session_key(query.clone(), key);
            async move { transport.get(path, query).await }
        })
        .await
    }

    async fn post(&self, path: &'static str, body: Value) -> ApiResult<Value> {
        self.call(path, |key| {
            let transport = Arc::clone(&self.transport);
            let body = with_session_key(body.clone(), key);
            async move { transport.post(path, body).await }
        })
        .await
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Sends a message, returning the id of the sent message.
    ///
    /// Local images are uploaded first and image ids issued for the other
    /// kind of conversation are dropped. Source and quote components are
    /// never sent; use `quote` to reply to a message.
    pub async fn send_message(
        &self,
        target: MessageTarget,
        message: impl Into<MessageChain>,
        quote: Option<i64>,
    ) -> ApiResult<i64> {
        let chain = self.prepare_outbound(message.into(), target).await?;

        let mut body = target.address();
        body["messageChain"] = serde_json::to_value(&chain)?;
        if let Some(quote) = quote {
            body["quote"] = json!(quote);
        }

        let response = self.post(target.endpoint(), body).await?;
        response
            .get("messageId")
            .and_then(Value::as_i64)
            .ok_or_else(|| ApiError::Serialization("response has no messageId".into()))
    }

    pub async fn send_friend_message<'a>(
        &self,
        friend: impl Into<Target<'a>>,
        message: impl Into<MessageChain>,
        quote: Option<i64>,
    ) -> ApiResult<i64> {
        self.send_message(MessageTarget::friend(friend), message, quote)
            .await
    }

    pub async fn send_group_message<'a>(
        &self,
        group: impl Into<Target<'a>>,
        message: impl Into<MessageChain>,
        quote: Option<i64>,
    ) -> ApiResult<i64> {
        self.send_message(MessageTarget::group(group), message, quote)
            .await
    }

    pub async fn send_temp_message<'a, 'b>(
        &self,
        group: impl Into<Target<'a>>,
        member: impl Into<Target<'b>>,
        message: impl Into<MessageChain>,
        quote: Option<i64>,
    ) -> ApiResult<i64> {
        self.send_message(MessageTarget::temp(group, member), message, quote)
            .await
    }

    /// Answers a message event in the conversation it came from, optionally
    /// quoting it.
    pub async fn reply(
        &self,
        event: &Event,
        message: impl Into<MessageChain>,
        quote: bool,
    ) -> ApiResult<i64> {
        let target = match event {
            Event::FriendMessage(m) => MessageTarget::Friend(m.sender.id),
            Event::GroupMessage(m) => MessageTarget::Group(m.sender.group.id),
            Event::TempMessage(m) => MessageTarget::temp_with(&m.sender),
            other => {
                return Err(ApiError::InvalidArgument(format!(
                    "cannot reply to {}",
                    other.kind()
                )));
            }
        };
        let quote = if quote {
            event.message_chain().and_then(MessageChain::message_id)
        } else {
            None
        };
        self.send_message(target, message, quote).await
    }

    impl_api!(
        /// Recalls a message by id.
        post recall => endpoints::RECALL,
        ("target": message_id: i64)
    );

    /// Uploads a local image for use in a `kind` conversation.
    pub async fn upload_image(&self, target: MessageTarget, file: &Path) -> ApiResult<ImageData> {
        let kind = target.upload_kind();
        let response = self
            .call(endpoints::UPLOAD_IMAGE, |key| {
                let transport = Arc::clone(&self.transport);
                let fields = vec![
                    ("sessionKey".to_string(), key),
                    ("type".to_string(), kind.to_string()),
                ];
                async move {
                    transport
                        .upload_file(endpoints::UPLOAD_IMAGE, fields, "img", file)
                        .await
                }
            })
            .await?;
        debug!(parent: &self.span, kind, file = %file.display(), "Image uploaded");
        payload(response)
    }

    async fn prepare_outbound(
        &self,
        chain: MessageChain,
        target: MessageTarget,
    ) -> ApiResult<MessageChain> {
        let mut prepared = MessageChain::new();
        for component in chain {
            let component = match component {
                Component::Source(_) | Component::Quote(_) => continue,
                Component::Image(image) => Component::Image(self.prepare_image(image, target).await?),
                Component::FlashImage(image) => {
                    Component::FlashImage(self.prepare_image(image, target).await?)
                }
                other => other,
            };
            prepared.push(component);
        }
        Ok(prepared)
    }

    async fn prepare_image(&self, mut image: ImageData, target: MessageTarget) -> ApiResult<ImageData> {
        if let Some(scope) = image.scope()
            && scope != target.image_scope()
        {
            debug!(parent: &self.span, image_id = ?image.image_id, "Dropping image id issued for another scope");
            image.image_id = None;
        }
        if image.is_resolved() {
            image.path = None;
            return Ok(image);
        }
        match image.path.take() {
            Some(path) => self.upload_image(target, &path).await,
            None => Err(ApiError::InvalidArgument(
                "image has no id, url or local path".into(),
            )),
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Drains up to `count` queued payloads from the server, oldest first.
    pub async fn fetch_batch(&self, count: usize) -> ApiResult<Vec<Value>> {
        let response = self
            .get(endpoints::FETCH_MESSAGE, json!({ "count": count }))
            .await?;
        payload(response)
    }

    /// Like [`Bot::fetch_batch`], decoded into events.
    pub async fn fetch_message(&self, count: usize) -> ApiResult<Vec<Event>> {
        let batch = self.fetch_batch(count).await?;
        Ok(batch.into_iter().filter_map(decode).collect())
    }

    /// Looks up a cached message by id.
    pub async fn message_from_id(&self, message_id: i64) -> ApiResult<Option<Event>> {
        let response = self
            .get(endpoints::MESSAGE_FROM_ID, json!({ "id": message_id }))
            .await?;
        let raw: Value = payload(response)?;
        Ok(decode(raw))
    }

    // =========================================================================
    // Contacts
    // =========================================================================

    impl_api!(
        /// Lists the bot's friends.
        get friend_list => endpoints::FRIEND_LIST, () -> Vec<Friend>
    );

    impl_api!(
        /// Lists the groups the bot is in.
        get group_list => endpoints::GROUP_LIST, () -> Vec<Group>
    );

    /// Lists the members of a group.
    pub async fn member_list<'a>(&self, group: impl Into<Target<'a>>) -> ApiResult<Vec<Member>> {
        let response = self
            .get(endpoints::MEMBER_LIST, json!({ "target": group.into().id() }))
            .await?;
        payload(response)
    }

    // =========================================================================
    // Group management
    // =========================================================================

    pub async fn mute_all<'a>(&self, group: impl Into<Target<'a>>) -> ApiResult<()> {
        self.post(endpoints::MUTE_ALL, json!({ "target": group.into().id() }))
            .await?;
        Ok(())
    }

    pub async fn unmute_all<'a>(&self, group: impl Into<Target<'a>>) -> ApiResult<()> {
        self.post(endpoints::UNMUTE_ALL, json!({ "target": group.into().id() }))
            .await?;
        Ok(())
    }

    /// Mutes a member. The duration is clamped to one minute .. 30 days.
    pub async fn mute<'a, 'b>(
        &self,
        group: impl Into<Target<'a>>,
        member: impl Into<Target<'b>>,
        duration: Duration,
    ) -> ApiResult<()> {
        let body = json!({
            "target": group.into().id(),
            "memberId": member.into().id(),
            "time": clamp_mute(duration),
        });
        self.post(endpoints::MUTE, body).await?;
        Ok(())
    }

    pub async fn unmute<'a, 'b>(
        &self,
        group: impl Into<Target<'a>>,
        member: impl Into<Target<'b>>,
    ) -> ApiResult<()> {
        let body = json!({ "target": group.into().id(), "memberId": member.into().id() });
        self.post(endpoints::UNMUTE, body).await?;
        Ok(())
    }

    /// Removes a member from a group, with an optional farewell message.
    pub async fn kick<'a, 'b>(
        &self,
        group: impl Into<Target<'a>>,
        member: impl Into<Target<'b>>,
        message: &str,
    ) -> ApiResult<()> {
        let body = json!({
            "target": group.into().id(),
            "memberId": member.into().id(),
            "msg": message,
        });
        self.post(endpoints::KICK, body).await?;
        Ok(())
    }

    /// Makes the bot leave a group.
    pub async fn quit<'a>(&self, group: impl Into<Target<'a>>) -> ApiResult<()> {
        self.post(endpoints::QUIT, json!({ "target": group.into().id() }))
            .await?;
        Ok(())
    }

    pub async fn member_info<'a, 'b>(
        &self,
        group: impl Into<Target<'a>>,
        member: impl Into<Target<'b>>,
    ) -> ApiResult<MemberSetting> {
        let query = json!({ "target": group.into().id(), "memberId": member.into().id() });
        let response = self.get(endpoints::MEMBER_INFO, query).await?;
        payload(response)
    }

    pub async fn set_member_info<'a, 'b>(
        &self,
        group: impl Into<Target<'a>>,
        member: impl Into<Target<'b>>,
        info: &MemberSetting,
    ) -> ApiResult<()> {
        let body = json!({
            "target": group.into().id(),
            "memberId": member.into().id(),
            "info": info,
        });
        self.post(endpoints::MEMBER_INFO, body).await?;
        Ok(())
    }

    pub async fn group_config<'a>(&self, group: impl Into<Target<'a>>) -> ApiResult<GroupSetting> {
        let response = self
            .get(endpoints::GROUP_CONFIG, json!({ "target": group.into().id() }))
            .await?;
        payload(response)
    }

    /// Updates the settings that are `Some` in `config`.
    pub async fn set_group_config<'a>(
        &self,
        group: impl Into<Target<'a>>,
        config: &GroupSetting,
    ) -> ApiResult<()> {
        let body = json!({ "target": group.into().id(), "config": config });
        self.post(endpoints::GROUP_CONFIG, body).await?;
        Ok(())
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub async fn respond_friend_request(
        &self,
        request: &NewFriendRequestEvent,
        response: NewFriendRequestResponse,
        message: &str,
    ) -> ApiResult<()> {
        let body = json!({
            "eventId": request.request_id,
            "fromId": request.supplicant,
            "groupId": request.source_group,
            "operate": response.operate(),
            "message": message,
        });
        self.post(endpoints::RESP_NEW_FRIEND_REQUEST, body).await?;
        Ok(())
    }

    pub async fn respond_member_join_request(
        &self,
        request: &MemberJoinRequestEvent,
        response: MemberJoinRequestResponse,
        message: &str,
    ) -> ApiResult<()> {
        let body = json!({
            "eventId": request.request_id,
            "fromId": request.supplicant,
            "groupId": request.source_group,
            "operate": response.operate(),
            "message": message,
        });
        self.post(endpoints::RESP_MEMBER_JOIN_REQUEST, body).await?;
        Ok(())
    }

    // =========================================================================
    // Server config
    // =========================================================================

    impl_api!(
        /// Reads the session's server-side settings.
        get config => endpoints::CONFIG, () -> ServerConfig
    );

    /// Updates the session's server-side settings that are `Some`.
    pub async fn set_config(&self, config: &ServerConfig) -> ApiResult<()> {
        self.post(endpoints::CONFIG, serde_json::to_value(config)?)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot").field("session", &self.session).finish()
    }
}
