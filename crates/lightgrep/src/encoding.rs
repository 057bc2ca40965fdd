//! Character encodings a keyword can be searched in
//!
//! Keywords are written as text; the encoding decides which byte sequences
//! each character turns into when the program is compiled.

use crate::byteset::ByteSet;
use crate::error::{LightgrepError, Result};

/// Supported keyword encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// 7-bit ASCII
    Ascii,
    /// ISO-8859-1, one byte per code point up to U+00FF
    Latin1,
    /// UTF-8
    Utf8,
    /// UTF-16, little-endian code units
    Utf16Le,
    /// UTF-16, big-endian code units
    Utf16Be,
}

impl Encoding {
    /// Look up an encoding by name, ignoring ASCII case
    pub fn from_name(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "ASCII" | "US-ASCII" => Ok(Encoding::Ascii),
            "ISO-8859-1" | "LATIN1" | "LATIN-1" => Ok(Encoding::Latin1),
            "UTF-8" | "UTF8" => Ok(Encoding::Utf8),
            "UTF-16LE" | "UTF16LE" => Ok(Encoding::Utf16Le),
            "UTF-16BE" | "UTF16BE" => Ok(Encoding::Utf16Be),
            _ => Err(LightgrepError::UnknownEncoding(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Ascii => "ASCII",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
        }
    }

    /// Encode a single character, or `None` if it is not representable
    pub fn encode(&self, c: char) -> Option<Vec<u8>> {
        match self {
            Encoding::Ascii => c.is_ascii().then(|| vec![c as u8]),
            Encoding::Latin1 => u8::try_from(u32::from(c)).ok().map(|b| vec![b]),
            Encoding::Utf8 => {
                let mut buf = [0u8; 4];
                Some(c.encode_utf8(&mut buf).as_bytes().to_vec())
            }
            Encoding::Utf16Le | Encoding::Utf16Be => {
                let mut units = [0u16; 2];
                let mut out = Vec::with_capacity(4);
                for unit in c.encode_utf16(&mut units).iter() {
                    let bytes = if *self == Encoding::Utf16Le {
                        unit.to_le_bytes()
                    } else {
                        unit.to_be_bytes()
                    };
                    out.extend_from_slice(&bytes);
                }
                Some(out)
            }
        }
    }

    /// Byte-set sequences matching any one character
    ///
    /// UTF-16 treats each 2-byte code unit as a character, so a surrogate
    /// pair counts as two.
    pub fn any_char(&self) -> Vec<Vec<ByteSet>> {
        let cont = ByteSet::range(0x80, 0xBF);
        match self {
            Encoding::Ascii => vec![vec![ByteSet::range(0x00, 0x7F)]],
            Encoding::Latin1 => vec![vec![ByteSet::full()]],
            Encoding::Utf8 => vec![
                vec![ByteSet::range(0x00, 0x7F)],
                vec![ByteSet::range(0xC2, 0xDF), cont],
                vec![ByteSet::range(0xE0, 0xEF), cont, cont],
                vec![ByteSet::range(0xF0, 0xF4), cont, cont, cont],
            ],
            Encoding::Utf16Le | Encoding::Utf16Be => vec![vec![ByteSet::full(), ByteSet::full()]],
        }
    }
}
