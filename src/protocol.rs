//! Control channel protocol
//!
//! Every websocket message in either direction is a JSON object with
//! `prefix` and `action` string fields. Inbound messages are parsed into a
//! [`Command`]; outbound broadcasts are built from the types below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw inbound message
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ControlMessage {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub action: String,
}

/// A parsed control command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Broadcast discoverable and active sources
    Refresh,
    /// Broadcast the current master volume
    RefreshVolume,
    /// Connect the source at this index of the last discovery snapshot
    ConnectSource(usize),
    /// Disconnect the stream in this registry slot
    DisconnectSource(usize),
    /// Persist active streams
    SaveStreams,
    /// Set the master gain
    SetMasterGain(f32),
}

impl ControlMessage {
    /// Parse a websocket text frame
    pub fn from_json(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Interpret the message. Unknown prefixes and malformed actions give
    /// `None` and are ignored by the control surface.
    pub fn command(&self) -> Option<Command> {
        let action = self.action.trim();
        match self.prefix.as_str() {
            "refresh" => match action {
                "refresh" => Some(Command::Refresh),
                "re_vol" => Some(Command::RefreshVolume),
                _ => None,
            },
            "connect_source" => action.parse().ok().map(Command::ConnectSource),
            "disconnect_source" => action.parse().ok().map(Command::DisconnectSource),
            "save_streams" => Some(Command::SaveStreams),
            "am" => action
                .parse::<f32>()
                .ok()
                .filter(|gain| gain.is_finite() && *gain >= 0.0)
                .map(Command::SetMasterGain),
            _ => None,
        }
    }
}

/// One entry of a `source_list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// `{prefix, action: "display", source_list: {index: {name, url?}}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceListMessage {
    pub prefix: String,
    pub action: String,
    pub source_list: BTreeMap<String, SourceEntry>,
}

impl SourceListMessage {
    /// Discovered sources not yet bridged, keyed by discovery index
    pub fn discovered(entries: impl IntoIterator<Item = (usize, SourceEntry)>) -> Self {
        Self::display("discover_source", entries)
    }

    /// Active streams, keyed by slot index
    pub fn playing(entries: impl IntoIterator<Item = (usize, SourceEntry)>) -> Self {
        Self::display("playing_source", entries)
    }

    fn display(prefix: &str, entries: impl IntoIterator<Item = (usize, SourceEntry)>) -> Self {
        Self {
            prefix: prefix.to_string(),
            action: "display".to_string(),
            source_list: entries
                .into_iter()
                .map(|(index, entry)| (index.to_string(), entry))
                .collect(),
        }
    }
}

/// `{prefix: "volume", action: "display", volume}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeMessage {
    pub prefix: String,
    pub action: String,
    pub volume: f32,
}

impl VolumeMessage {
    pub fn new(volume: f32) -> Self {
        Self {
            prefix: "volume".to_string(),
            action: "display".to_string(),
            volume,
        }
    }
}

/// Anything the control surface broadcasts
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Broadcast {
    Sources(SourceListMessage),
    Volume(VolumeMessage),
}

impl Broadcast {
    pub fn to_json(&self) -> String {
        // Serializing these plain structs cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<Command> {
        ControlMessage::from_json(text).and_then(|m| m.command())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(r#"{"prefix":"refresh","action":"refresh"}"#), Some(Command::Refresh));
        assert_eq!(parse(r#"{"prefix":"refresh","action":"re_vol"}"#), Some(Command::RefreshVolume));
        assert_eq!(
            parse(r#"{"prefix":"connect_source","action":"3"}"#),
            Some(Command::ConnectSource(3))
        );
        assert_eq!(
            parse(r#"{"prefix":"disconnect_source","action":"0"}"#),
            Some(Command::DisconnectSource(0))
        );
        assert_eq!(parse(r#"{"prefix":"save_streams"}"#), Some(Command::SaveStreams));
        assert_eq!(parse(r#"{"prefix":"am","action":"0.75"}"#), Some(Command::SetMasterGain(0.75)));
    }

    #[test]
    fn test_malformed_commands_are_ignored() {
        assert_eq!(parse("not json"), None);
        assert_eq!(parse(r#"{"prefix":"connect_source","action":"abc"}"#), None);
        assert_eq!(parse(r#"{"prefix":"disconnect_source","action":"-1"}"#), None);
        assert_eq!(parse(r#"{"prefix":"am","action":"-0.5"}"#), None);
        assert_eq!(parse(r#"{"prefix":"am","action":"NaN"}"#), None);
        assert_eq!(parse(r#"{"prefix":"refresh","action":"bogus"}"#), None);
        assert_eq!(parse(r#"{"prefix":"launch_missiles","action":"1"}"#), None);
    }

    #[test]
    fn test_source_list_shape() {
        let msg = SourceListMessage::discovered(vec![
            (0, SourceEntry { name: "CAM (Audio)".into(), url: Some("10.0.0.5:5961".into()) }),
            (2, SourceEntry { name: "Desk".into(), url: None }),
        ]);
        let json: serde_json::Value = serde_json::from_str(&Broadcast::Sources(msg).to_json()).unwrap();

        assert_eq!(json["prefix"], "discover_source");
        assert_eq!(json["action"], "display");
        assert_eq!(json["source_list"]["0"]["name"], "CAM (Audio)");
        assert_eq!(json["source_list"]["0"]["url"], "10.0.0.5:5961");
        assert!(json["source_list"]["2"].get("url").is_none());
        assert!(json["source_list"].get("1").is_none());
    }

    #[test]
    fn test_volume_message() {
        let json: serde_json::Value =
            serde_json::from_str(&Broadcast::Volume(VolumeMessage::new(0.5)).to_json()).unwrap();
        assert_eq!(json["prefix"], "volume");
        assert_eq!(json["volume"], 0.5);
    }
}
