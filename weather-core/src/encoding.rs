//! Text encodings a weather provider may answer in.
//!
//! Names follow the provider configuration vocabulary (`Unicode`, `ASCII`,
//! `BigEndianUnicode`, `UTF32`, `UTF7`, `UTF8`). Decoding is strict: bytes that do not
//! form valid text in the selected encoding are an error rather than replacement characters.

use std::fmt;

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use thiserror::Error;

/// Modified base64 used inside UTF-7 shift sequences: no padding, trailing bits tolerated.
const UTF7_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// UTF-16 little endian, configured as `Unicode`.
    Utf16Le,
    /// UTF-16 big endian, configured as `BigEndianUnicode`.
    Utf16Be,
    /// UTF-32 little endian.
    Utf32,
    Ascii,
    Utf7,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct DecodeError(String);

impl TextEncoding {
    /// Resolve a configured encoding name. Unknown or blank names fall back to UTF-8.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "unicode" => TextEncoding::Utf16Le,
            "ascii" => TextEncoding::Ascii,
            "bigendianunicode" => TextEncoding::Utf16Be,
            "utf32" => TextEncoding::Utf32,
            "utf7" => TextEncoding::Utf7,
            _ => TextEncoding::Utf8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF8",
            TextEncoding::Utf16Le => "Unicode",
            TextEncoding::Utf16Be => "BigEndianUnicode",
            TextEncoding::Utf32 => "UTF32",
            TextEncoding::Ascii => "ASCII",
            TextEncoding::Utf7 => "UTF7",
        }
    }

    /// `charset` parameter for a `Content-Type` header; `None` for UTF-8, which is implied.
    pub fn charset(&self) -> Option<&'static str> {
        match self {
            TextEncoding::Utf8 => None,
            TextEncoding::Utf16Le => Some("utf-16"),
            TextEncoding::Utf16Be => Some("utf-16BE"),
            TextEncoding::Utf32 => Some("utf-32"),
            TextEncoding::Ascii => Some("us-ascii"),
            TextEncoding::Utf7 => Some("utf-7"),
        }
    }

    fn preamble(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            TextEncoding::Utf16Le => &[0xFF, 0xFE],
            TextEncoding::Utf16Be => &[0xFE, 0xFF],
            TextEncoding::Utf32 => &[0xFF, 0xFE, 0x00, 0x00],
            TextEncoding::Ascii | TextEncoding::Utf7 => &[],
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        let bytes = bytes.strip_prefix(self.preamble()).unwrap_or(bytes);

        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| DecodeError(format!("invalid UTF-8: {e}"))),
            TextEncoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            TextEncoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            TextEncoding::Utf32 => decode_utf32(bytes),
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(pos) => Err(DecodeError(format!(
                    "byte 0x{:02X} at offset {pos} is not ASCII",
                    bytes[pos]
                ))),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            TextEncoding::Utf7 => decode_utf7(bytes),
        }
    }

    /// Encode outgoing text. ASCII replaces unrepresentable characters with `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            TextEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            TextEncoding::Utf32 => text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect(),
            TextEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            TextEncoding::Utf7 => encode_utf7(text).into_bytes(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError(format!(
            "UTF-16 input has odd length {}",
            bytes.len()
        )));
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|e| DecodeError(format!("invalid UTF-16: {e}")))
}

fn decode_utf32(bytes: &[u8]) -> Result<String, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError(format!(
            "UTF-32 input length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    bytes
        .chunks_exact(4)
        .map(|quad| {
            let value = u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
            char::from_u32(value)
                .ok_or_else(|| DecodeError(format!("0x{value:08X} is not a Unicode scalar value")))
        })
        .collect()
}

fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

/// Characters written literally by the UTF-7 encoder (RFC 2152 set D plus whitespace).
fn is_utf7_direct(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'(),-./:? \t\r\n".contains(c)
}

fn decode_utf7(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if !b.is_ascii() {
            return Err(DecodeError(format!(
                "byte 0x{b:02X} at offset {i} is not valid UTF-7"
            )));
        }
        if b != b'+' {
            out.push(b as char);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && is_base64_char(bytes[end]) {
            end += 1;
        }

        if end == start {
            // "+-" is a literal plus; a bare "+" is tolerated the same way.
            out.push('+');
        } else {
            let raw = UTF7_BASE64
                .decode(&bytes[start..end])
                .map_err(|e| DecodeError(format!("malformed UTF-7 shift sequence at offset {i}: {e}")))?;
            out.push_str(&decode_utf16(&raw, u16::from_be_bytes)?);
        }

        i = end;
        if i < bytes.len() && bytes[i] == b'-' {
            i += 1;
        }
    }

    Ok(out)
}

fn encode_utf7(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending: Vec<u8> = Vec::new();

    let flush = |pending: &mut Vec<u8>, out: &mut String| {
        if !pending.is_empty() {
            out.push('+');
            out.push_str(&UTF7_BASE64.encode(pending.as_slice()));
            out.push('-');
            pending.clear();
        }
    };

    for c in text.chars() {
        if c == '+' {
            flush(&mut pending, &mut out);
            out.push_str("+-");
        } else if is_utf7_direct(c) {
            flush(&mut pending, &mut out);
            out.push(c);
        } else {
            let mut buf = [0u16; 2];
            for unit in c.encode_utf16(&mut buf) {
                pending.extend_from_slice(&unit.to_be_bytes());
            }
        }
    }
    flush(&mut pending, &mut out);

    out
}
