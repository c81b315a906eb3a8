//! Chat text components.
//!
//! Only the two shapes the protocol core itself produces are modelled: a
//! literal string and a client-side translation key. The login phase carries
//! them as JSON, later phases as network NBT (a nameless root compound).

use crate::core::wire::ensure;
use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

const TAG_END: u8 = 0x00;
const TAG_STRING: u8 = 0x08;
const TAG_COMPOUND: u8 = 0x0A;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextComponent {
    Translate { translate: String },
    Text { text: String },
}

impl TextComponent {
    pub fn text(text: impl Into<String>) -> Self {
        TextComponent::Text { text: text.into() }
    }

    pub fn translate(key: impl Into<String>) -> Self {
        TextComponent::Translate {
            translate: key.into(),
        }
    }

    pub fn to_json(&self) -> String {
        match self {
            TextComponent::Text { text } => serde_json::json!({ "text": text }).to_string(),
            TextComponent::Translate { translate } => {
                serde_json::json!({ "translate": translate }).to_string()
            }
        }
    }

    /// Parse a JSON component. A bare JSON string is read as literal text.
    pub fn from_json(json: &str) -> Result<Self> {
        if let Ok(component) = serde_json::from_str::<TextComponent>(json) {
            return Ok(component);
        }
        serde_json::from_str::<String>(json)
            .map(TextComponent::text)
            .map_err(|e| ProtocolError::MalformedPacket(format!("Invalid text component: {e}")))
    }

    /// Write as a nameless NBT compound with a single string entry.
    pub fn write_nbt(&self, buf: &mut BytesMut) -> Result<()> {
        let (key, value) = match self {
            TextComponent::Text { text } => ("text", text),
            TextComponent::Translate { translate } => ("translate", translate),
        };
        buf.put_u8(TAG_COMPOUND);
        buf.put_u8(TAG_STRING);
        write_nbt_string(buf, key)?;
        write_nbt_string(buf, value)?;
        buf.put_u8(TAG_END);
        Ok(())
    }

    /// Read a nameless NBT root: either a bare string tag or a compound of strings.
    pub fn read_nbt(buf: &mut Bytes) -> Result<Self> {
        ensure(buf, 1)?;
        match buf.get_u8() {
            TAG_STRING => read_nbt_string(buf).map(TextComponent::text),
            TAG_COMPOUND => {
                let mut text = None;
                let mut translate = None;
                loop {
                    ensure(buf, 1)?;
                    match buf.get_u8() {
                        TAG_END => break,
                        TAG_STRING => {
                            let key = read_nbt_string(buf)?;
                            let value = read_nbt_string(buf)?;
                            match key.as_str() {
                                "text" => text = Some(value),
                                "translate" => translate = Some(value),
                                _ => {}
                            }
                        }
                        other => {
                            return Err(ProtocolError::MalformedPacket(format!(
                                "Unsupported NBT tag {other:#04x} in text component"
                            )))
                        }
                    }
                }
                match (translate, text) {
                    (Some(key), _) => Ok(TextComponent::translate(key)),
                    (None, Some(text)) => Ok(TextComponent::text(text)),
                    (None, None) => Ok(TextComponent::text("")),
                }
            }
            other => Err(ProtocolError::MalformedPacket(format!(
                "Unsupported NBT root tag {other:#04x}"
            ))),
        }
    }
}

fn write_nbt_string(buf: &mut BytesMut, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::StringTooLong {
        len: value.len(),
        max: u16::MAX as usize,
    })?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn read_nbt_string(buf: &mut Bytes) -> Result<String> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| ProtocolError::MalformedPacket(constants::ERR_INVALID_UTF8.into()))
}

impl fmt::Display for TextComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextComponent::Text { text } => f.write_str(text),
            TextComponent::Translate { translate } => write!(f, "<{translate}>"),
        }
    }
}
