//! Raw payload to [`Event`] decoding.
//!
//! Decoding never fails: unknown discriminators and payloads that do not fit
//! their declared kind both come out as [`Event::Unknown`], and a malformed
//! message component only degrades that one component.

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::model::{Component, Event, EventKind, MessageChain};

/// Decodes one raw payload as pushed by the event stream or returned by
/// `fetchMessage`.
///
/// Returns `None` for authentication acknowledgements, which carry nothing
/// a handler could use.
pub fn decode(raw: Value) -> Option<Event> {
    let payload = unwrap_envelope(raw);

    let tag = payload.get("type").and_then(Value::as_str);
    if tag.is_none() && is_auth_ack(&payload) {
        debug!("Suppressing authentication acknowledgement");
        return None;
    }

    let Some(kind) = tag.and_then(EventKind::from_tag) else {
        debug!(tag = ?tag, "Unrecognized event kind, delivering as unknown");
        return Some(Event::Unknown(payload));
    };

    match serde_json::from_value::<Event>(payload.clone()) {
        Ok(mut event) => {
            if let Some(chain) = event.message_chain_mut() {
                strip_quote_mention(chain);
            }
            trace!(kind = %kind, "Decoded event");
            Some(event)
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "Failed to decode event, delivering as unknown");
            Some(Event::Unknown(payload))
        }
    }
}

/// Unwraps the `{ "syncId": .., "data": .. }` frame the websocket uses.
fn unwrap_envelope(raw: Value) -> Value {
    match raw {
        Value::Object(mut map) if map.contains_key("syncId") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn is_auth_ack(payload: &Value) -> bool {
    payload.get("session").is_some() || payload.get("code").is_some()
}

/// Drops the redundant mention the server emits after a quote.
///
/// When a chain reads `[Source, Quote, At, ..]` the `At` repeats the author
/// of the quoted message and is removed. A lone `" "` plain text left at the
/// same position afterwards is removed as well. Only index 2 is examined and
/// each step applies on its own.
pub fn strip_quote_mention(chain: &mut MessageChain) {
    let leads_with_quote = matches!(chain.get(0), Some(Component::Source(_)))
        && matches!(chain.get(1), Some(Component::Quote(_)));
    if !leads_with_quote {
        return;
    }

    if matches!(chain.get(2), Some(Component::At(_))) {
        chain.remove(2);
    }
    if chain.get(2).and_then(Component::as_plain) == Some(" ") {
        chain.remove(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group_message(chain: Value) -> Value {
        json!({
            "type": "GroupMessage",
            "messageChain": chain,
            "sender": {
                "id": 123,
                "memberName": "alice",
                "permission": "MEMBER",
                "group": { "id": 456, "name": "rustaceans", "permission": "ADMINISTRATOR" }
            }
        })
    }

    fn quote() -> Value {
        json!({
            "type": "Quote", "id": 9, "groupId": 456, "senderId": 42, "targetId": 456,
            "origin": [{ "type": "Plain", "text": "earlier" }]
        })
    }

    fn source() -> Value {
        json!({ "type": "Source", "id": 10, "time": 1600000000 })
    }

    #[test]
    fn test_strips_mention_and_space_after_quote() {
        let raw = group_message(json!([
            source(),
            quote(),
            { "type": "At", "target": 42, "display": "@bob" },
            { "type": "Plain", "text": " " },
            { "type": "Plain", "text": "hi" }
        ]));

        let event = decode(raw).unwrap();
        let chain = event.message_chain().unwrap();
        assert_eq!(chain.len(), 3);
        assert!(matches!(chain.get(0), Some(Component::Source(_))));
        assert!(matches!(chain.get(1), Some(Component::Quote(_))));
        assert_eq!(chain.get(2).and_then(Component::as_plain), Some("hi"));
    }

    #[test]
    fn test_strips_mention_without_space() {
        let raw = group_message(json!([
            source(),
            quote(),
            { "type": "At", "target": 42, "display": "@bob" },
            { "type": "Plain", "text": "hi" }
        ]));

        let event = decode(raw).unwrap();
        let chain = event.message_chain().unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.get(2).and_then(Component::as_plain), Some("hi"));
    }

    #[test]
    fn test_keeps_mention_without_quote() {
        let raw = group_message(json!([
            source(),
            { "type": "At", "target": 42, "display": "@bob" },
            { "type": "Plain", "text": " " }
        ]));

        let event = decode(raw).unwrap();
        assert_eq!(event.message_chain().unwrap().len(), 3);
    }

    #[test]
    fn test_lone_space_after_quote_is_removed_on_its_own() {
        let raw = group_message(json!([
            source(),
            quote(),
            { "type": "Plain", "text": " " },
            { "type": "At", "target": 42, "display": "@bob" }
        ]));

        let event = decode(raw).unwrap();
        let chain = event.message_chain().unwrap();
        assert_eq!(chain.len(), 3);
        assert!(matches!(chain.get(2), Some(Component::At(_))));
    }

    #[test]
    fn test_unknown_kind() {
        let raw = json!({ "type": "NudgeEvent", "fromId": 1 });
        let event = decode(raw.clone()).unwrap();
        assert_eq!(event.kind(), EventKind::Unknown);
        assert_eq!(event, Event::Unknown(raw));
    }

    #[test]
    fn test_missing_discriminator_is_unknown() {
        let event = decode(json!({ "foo": "bar" })).unwrap();
        assert_eq!(event.kind(), EventKind::Unknown);
    }

    #[test]
    fn test_malformed_component_keeps_sender() {
        let raw = group_message(json!([
            source(),
            { "type": "Image", "imageId": 17 },
            { "type": "Plain", "text": "caption" }
        ]));

        let event = decode(raw).unwrap();
        let Event::GroupMessage(message) = event else {
            panic!("expected a group message");
        };
        assert_eq!(message.sender.id, 123);
        assert_eq!(message.sender.group.id, 456);
        assert!(matches!(message.message_chain.get(1), Some(Component::Unknown(_))));
        assert_eq!(message.message_chain.plain_text(), "caption");
    }

    #[test]
    fn test_unwraps_websocket_envelope() {
        let raw = json!({
            "syncId": "-1",
            "data": { "type": "BotOnlineEvent", "qq": 10001 }
        });
        let event = decode(raw).unwrap();
        assert_eq!(event.kind(), EventKind::BotOnlineEvent);
    }

    #[test]
    fn test_suppresses_auth_ack() {
        let raw = json!({ "syncId": "", "data": { "code": 0, "session": "SESSION" } });
        assert!(decode(raw).is_none());
    }
}
