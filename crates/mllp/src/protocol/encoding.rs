use bytes::Bytes;
use serde::Deserialize;

const REPLACEMENT: u8 = b'?';

/// The character set used to turn frame payloads into message text and back.
///
/// Characters that cannot be represented are replaced by `?` in both directions, the way a
/// 7-bit ASCII transport has always treated them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    #[serde(alias = "us-ascii")]
    Ascii,
    #[serde(alias = "iso-8859-1")]
    Latin1,
    #[serde(alias = "utf-8")]
    Utf8,
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Ascii => bytes.iter().map(|&b| if b.is_ascii() { char::from(b) } else { char::from(REPLACEMENT) }).collect(),
            Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn encode(self, text: &str) -> Bytes {
        match self {
            Self::Ascii => text.chars().map(|c| u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(REPLACEMENT)).collect(),
            Self::Latin1 => text.chars().map(|c| u8::try_from(c).unwrap_or(REPLACEMENT)).collect(),
            Self::Utf8 => Bytes::copy_from_slice(text.as_bytes()),
        }
    }
}
