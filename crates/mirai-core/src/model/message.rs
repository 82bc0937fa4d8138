//! Message components and the message chain.
//!
//! A message is an ordered [`MessageChain`] of [`Component`]s. Inbound chains
//! start with a [`Component::Source`] carrying the message id and timestamp.
//!
//! # Example
//!
//! ```rust,ignore
//! use mirai_core::{Component, MessageChain};
//!
//! let chain = MessageChain::new()
//!     .at(10001000)
//!     .plain(" hello ")
//!     .face(178)
//!     .image_url("https://example.com/cat.png");
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

// ============================================================================
// Component
// ============================================================================

/// One atomic item of a message.
///
/// The `type` field selects the variant. Anything the client does not
/// recognize is kept as [`Component::Unknown`] with the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Component {
    /// Message id and timestamp, first item of every inbound chain.
    Source(SourceData),
    /// Plain text.
    Plain(PlainData),
    /// Mention of a single member.
    At(AtData),
    /// Mention of the whole group.
    AtAll,
    /// Built-in emoji face.
    Face(FaceData),
    /// Image.
    Image(ImageData),
    /// Image that can be viewed once.
    FlashImage(ImageData),
    /// Reply to an earlier message.
    Quote(QuoteData),
    /// XML card.
    Xml(XmlData),
    /// JSON card.
    Json(JsonData),
    /// Mini-app payload.
    App(AppData),
    /// Poke / nudge.
    Poke(PokeData),
    /// Unrecognized or malformed component, kept as received.
    #[serde(untagged)]
    Unknown(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceData {
    pub id: i64,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainData {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtData {
    pub target: i64,
    #[serde(default)]
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceData {
    pub face_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Image reference: a server-issued id, a remote url or a local file that
/// still has to be uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Which kind of conversation an image id was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageScope {
    Friend,
    Group,
}

impl ImageData {
    /// Scope encoded in the image id: `/…` ids are friend images, `{…}`
    /// ids group images.
    pub fn scope(&self) -> Option<ImageScope> {
        match self.image_id.as_deref()?.chars().next()? {
            '/' => Some(ImageScope::Friend),
            '{' => Some(ImageScope::Group),
            _ => None,
        }
    }

    /// Whether the image can be sent without uploading first.
    pub fn is_resolved(&self) -> bool {
        self.image_id.is_some() || self.url.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteData {
    /// Id of the quoted message.
    pub id: i64,
    pub group_id: i64,
    pub sender_id: i64,
    pub target_id: i64,
    /// Copy of the quoted message. Never contains a quote itself.
    #[serde(deserialize_with = "deserialize_origin")]
    pub origin: MessageChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlData {
    pub xml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonData {
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PokeKind {
    Poke,
    ShowLove,
    Like,
    Heartbroken,
    SixSixSix,
    FangDaZhao,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokeData {
    pub name: PokeKind,
}

fn deserialize_origin<'de, D>(deserializer: D) -> Result<MessageChain, D::Error>
where
    D: Deserializer<'de>,
{
    let mut chain = MessageChain::deserialize(deserializer)?;
    chain.0.retain(|c| !matches!(c, Component::Quote(_)));
    Ok(chain)
}

impl Component {
    /// Decodes one component, keeping it as [`Component::Unknown`] when the
    /// payload does not match its declared type.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(component) => component,
            Err(e) => {
                let kind = value.get("type").and_then(Value::as_str).unwrap_or("?");
                warn!(kind, error = %e, "Malformed message component, keeping it as received");
                Component::Unknown(value)
            }
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Component::Plain(PlainData { text: text.into() })
    }

    pub fn at(target: i64) -> Self {
        Component::At(AtData {
            target,
            display: String::new(),
        })
    }

    pub fn face(face_id: i32) -> Self {
        Component::Face(FaceData { face_id, name: None })
    }

    pub fn image_id(image_id: impl Into<String>) -> Self {
        Component::Image(ImageData {
            image_id: Some(image_id.into()),
            ..Default::default()
        })
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Component::Image(ImageData {
            url: Some(url.into()),
            ..Default::default()
        })
    }

    /// Image read from a local file; uploaded when the message is sent.
    pub fn image_path(path: impl Into<PathBuf>) -> Self {
        Component::Image(ImageData {
            path: Some(path.into()),
            ..Default::default()
        })
    }

    pub fn poke(kind: PokeKind) -> Self {
        Component::Poke(PokeData { name: kind })
    }

    /// Returns the text if this is a plain-text component.
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Component::Plain(data) => Some(&data.text),
            _ => None,
        }
    }

    /// The wire `type` tag of this component.
    pub fn kind(&self) -> &str {
        match self {
            Component::Source(_) => "Source",
            Component::Plain(_) => "Plain",
            Component::At(_) => "At",
            Component::AtAll => "AtAll",
            Component::Face(_) => "Face",
            Component::Image(_) => "Image",
            Component::FlashImage(_) => "FlashImage",
            Component::Quote(_) => "Quote",
            Component::Xml(_) => "Xml",
            Component::Json(_) => "Json",
            Component::App(_) => "App",
            Component::Poke(_) => "Poke",
            Component::Unknown(raw) => raw.get("type").and_then(Value::as_str).unwrap_or("Unknown"),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Source(_) => Ok(()),
            Component::Plain(data) => f.write_str(&data.text),
            Component::At(data) if data.display.is_empty() => write!(f, "@{}", data.target),
            Component::At(data) => f.write_str(&data.display),
            Component::AtAll => f.write_str("@all"),
            Component::Face(FaceData { name: Some(name), .. }) => write!(f, "[face:{name}]"),
            Component::Face(data) => write!(f, "[face:{}]", data.face_id),
            Component::Image(_) => f.write_str("[image]"),
            Component::FlashImage(_) => f.write_str("[flash image]"),
            Component::Quote(data) => write!(f, "[quote:{}]", data.id),
            Component::Xml(_) => f.write_str("[xml]"),
            Component::Json(_) => f.write_str("[json]"),
            Component::App(_) => f.write_str("[app]"),
            Component::Poke(data) => write!(f, "[poke:{:?}]", data.name),
            Component::Unknown(_) => write!(f, "[{}]", self.kind()),
        }
    }
}

// ============================================================================
// MessageChain
// ============================================================================

/// An ordered sequence of components forming one message.
///
/// Deserialization is lenient: each element is decoded on its own, and one
/// that fails becomes [`Component::Unknown`] instead of failing the chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MessageChain(pub(crate) Vec<Component>);

impl<'de> Deserialize<'de> for MessageChain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        Ok(Self(raw.into_iter().map(Component::from_value).collect()))
    }
}

impl MessageChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, component: Component) {
        self.0.push(component);
    }

    /// Appends a component, builder style.
    pub fn with(mut self, component: Component) -> Self {
        self.0.push(component);
        self
    }

    pub fn plain(self, text: impl Into<String>) -> Self {
        self.with(Component::plain(text))
    }

    pub fn at(self, target: i64) -> Self {
        self.with(Component::at(target))
    }

    pub fn at_all(self) -> Self {
        self.with(Component::AtAll)
    }

    pub fn face(self, face_id: i32) -> Self {
        self.with(Component::face(face_id))
    }

    pub fn image_id(self, image_id: impl Into<String>) -> Self {
        self.with(Component::image_id(image_id))
    }

    pub fn image_url(self, url: impl Into<String>) -> Self {
        self.with(Component::image_url(url))
    }

    pub fn image_path(self, path: impl Into<PathBuf>) -> Self {
        self.with(Component::image_path(path))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Component> {
        self.0.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.0.get(index)
    }

    pub fn as_slice(&self) -> &[Component] {
        &self.0
    }

    /// Metadata of an inbound message, if the chain leads with it.
    pub fn source(&self) -> Option<&SourceData> {
        match self.0.first()? {
            Component::Source(data) => Some(data),
            _ => None,
        }
    }

    /// Id of the message, needed to quote or recall it.
    pub fn message_id(&self) -> Option<i64> {
        self.source().map(|s| s.id)
    }

    /// The quoted message this one replies to, if any.
    pub fn quote(&self) -> Option<&QuoteData> {
        self.0.iter().find_map(|c| match c {
            Component::Quote(data) => Some(data),
            _ => None,
        })
    }

    /// Whether any component has the given wire type tag.
    pub fn has(&self, kind: &str) -> bool {
        self.0.iter().any(|c| c.kind() == kind)
    }

    /// First component with the given wire type tag.
    pub fn first(&self, kind: &str) -> Option<&Component> {
        self.0.iter().find(|c| c.kind() == kind)
    }

    /// All components with the given wire type tag.
    pub fn all<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Component> + 'a {
        self.0.iter().filter(move |c| c.kind() == kind)
    }

    /// Ids of everyone mentioned with a single-member @.
    pub fn at_targets(&self) -> Vec<i64> {
        self.0
            .iter()
            .filter_map(|c| match c {
                Component::At(data) => Some(data.target),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of all plain-text components.
    pub fn plain_text(&self) -> String {
        self.0.iter().filter_map(Component::as_plain).collect()
    }

    pub(crate) fn remove(&mut self, index: usize) -> Component {
        self.0.remove(index)
    }
}

impl fmt::Display for MessageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.0 {
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl From<&str> for MessageChain {
    fn from(text: &str) -> Self {
        Self(vec![Component::plain(text)])
    }
}

impl From<String> for MessageChain {
    fn from(text: String) -> Self {
        Self(vec![Component::plain(text)])
    }
}

impl From<Component> for MessageChain {
    fn from(component: Component) -> Self {
        Self(vec![component])
    }
}

impl From<Vec<Component>> for MessageChain {
    fn from(components: Vec<Component>) -> Self {
        Self(components)
    }
}

impl FromIterator<Component> for MessageChain {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for MessageChain {
    type Item = Component;
    type IntoIter = std::vec::IntoIter<Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a MessageChain {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_known_components() {
        let chain: MessageChain = serde_json::from_value(json!([
            { "type": "Source", "id": 7, "time": 1600000000 },
            { "type": "At", "target": 42, "display": "@bob" },
            { "type": "Plain", "text": " hi" },
            { "type": "Face", "faceId": 178, "name": "smile" },
            { "type": "AtAll" },
            { "type": "Poke", "name": "SixSixSix" }
        ]))
        .unwrap();

        assert_eq!(chain.len(), 6);
        assert_eq!(chain.message_id(), Some(7));
        assert_eq!(chain.at_targets(), vec![42]);
        assert_eq!(chain.plain_text(), " hi");
        assert!(chain.has("AtAll"));
        assert!(matches!(
            chain.get(5),
            Some(Component::Poke(PokeData { name: PokeKind::SixSixSix }))
        ));
    }

    #[test]
    fn test_unknown_and_malformed_components_are_kept() {
        let chain: MessageChain = serde_json::from_value(json!([
            { "type": "MarketFace", "id": 1 },
            { "type": "At" },
            { "type": "Plain", "text": "still here" }
        ]))
        .unwrap();

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.get(0).unwrap().kind(), "MarketFace");
        assert!(matches!(chain.get(1), Some(Component::Unknown(_))));
        assert_eq!(chain.get(1).unwrap().kind(), "At");
        assert_eq!(chain.plain_text(), "still here");
    }

    #[test]
    fn test_quote_origin_never_nests_quotes() {
        let component = Component::from_value(json!({
            "type": "Quote",
            "id": 1, "groupId": 2, "senderId": 3, "targetId": 2,
            "origin": [
                { "type": "Quote", "id": 0, "groupId": 2, "senderId": 3, "targetId": 2, "origin": [] },
                { "type": "Plain", "text": "original" }
            ]
        }));

        let Component::Quote(quote) = component else {
            panic!("expected a quote");
        };
        assert_eq!(quote.origin.len(), 1);
        assert_eq!(quote.origin.plain_text(), "original");
    }

    #[test]
    fn test_serialize_outbound_chain() {
        let chain = MessageChain::new()
            .at(42)
            .plain("hello")
            .image_id("{ABC}.png");
        assert_eq!(
            serde_json::to_value(&chain).unwrap(),
            json!([
                { "type": "At", "target": 42, "display": "" },
                { "type": "Plain", "text": "hello" },
                { "type": "Image", "imageId": "{ABC}.png" }
            ])
        );
    }

    #[test]
    fn test_unknown_serializes_as_received() {
        let raw = json!({ "type": "MusicShare", "kind": "NeteaseCloudMusic" });
        let component = Component::from_value(raw.clone());
        assert_eq!(serde_json::to_value(&component).unwrap(), raw);
    }

    #[test]
    fn test_image_scope() {
        let friend = ImageData {
            image_id: Some("/f8f1ab55-bf8e-4236-b55e-955848d7069f".into()),
            ..Default::default()
        };
        let group = ImageData {
            image_id: Some("{01E9451B-70ED-EAE3-B37C-101F1EEBF5B5}.png".into()),
            ..Default::default()
        };
        assert_eq!(friend.scope(), Some(ImageScope::Friend));
        assert_eq!(group.scope(), Some(ImageScope::Group));
        assert_eq!(ImageData::default().scope(), None);
    }

    #[test]
    fn test_display() {
        let chain = MessageChain::new().at(42).plain(" hi ").face(1);
        assert_eq!(chain.to_string(), "@42 hi [face:1]");
    }
}
