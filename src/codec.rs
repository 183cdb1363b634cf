use crate::models::{ListingBody, Page};
use crate::{EngineError, Result};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Characters dropped from the front of the reversed body. Observed on live indexes;
/// overridable through `CrawlConfig::codec`.
pub const DEFAULT_HEAD_SKIP: usize = 24;
/// Characters dropped from the back of the reversed body.
pub const DEFAULT_TAIL_SKIP: usize = 20;

/// Scrambling applied by the origin to listing bodies. Decoding is one-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum PayloadScheme {
    /// Body is served as-is.
    Plain,
    /// Reverse the body, drop `head_skip`/`tail_skip` characters, base64-decode.
    ReversedBase64 { head_skip: usize, tail_skip: usize },
    /// Base64-decode, then XOR with a repeating key.
    XorBase64 { key_hex: String },
}

impl Default for PayloadScheme {
    fn default() -> Self {
        Self::ReversedBase64 {
            head_skip: DEFAULT_HEAD_SKIP,
            tail_skip: DEFAULT_TAIL_SKIP,
        }
    }
}

impl PayloadScheme {
    /// XOR scheme whose key is the SHA-256 digest of `seed`.
    pub fn xor_from_seed(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        Self::XorBase64 {
            key_hex: hex::encode(digest),
        }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<String> {
        match self {
            Self::Plain => utf8(raw.to_vec()),
            Self::ReversedBase64 {
                head_skip,
                tail_skip,
            } => {
                let text = std::str::from_utf8(raw)
                    .map_err(|e| EngineError::Decode(format!("body is not utf-8: {e}")))?;
                let reversed: Vec<char> = text.trim().chars().rev().collect();
                let framing = head_skip
                    .checked_add(*tail_skip)
                    .ok_or_else(|| EngineError::Decode("scramble offsets overflow".to_string()))?;
                if reversed.len() < framing {
                    return Err(EngineError::Decode(format!(
                        "body too short to unscramble ({} chars)",
                        reversed.len()
                    )));
                }
                let middle: String = reversed[*head_skip..reversed.len() - tail_skip]
                    .iter()
                    .collect();
                utf8(decode_base64(&middle)?)
            }
            Self::XorBase64 { key_hex } => {
                let key = hex::decode(key_hex)
                    .map_err(|e| EngineError::Decode(format!("invalid xor key: {e}")))?;
                if key.is_empty() {
                    return Err(EngineError::Decode("xor key is empty".to_string()));
                }
                let text = std::str::from_utf8(raw)
                    .map_err(|e| EngineError::Decode(format!("body is not utf-8: {e}")))?;
                let bytes = decode_base64(text)?
                    .into_iter()
                    .zip(key.iter().cycle())
                    .map(|(b, k)| b ^ k)
                    .collect();
                utf8(bytes)
            }
        }
    }

    /// Unscramble and parse one listing page. Anything that is not the expected
    /// structure is a decode failure.
    pub fn decode_listing(&self, raw: &[u8]) -> Result<Page> {
        let text = self.decode(raw)?;
        let body: ListingBody = serde_json::from_str(&text)
            .map_err(|e| EngineError::Decode(format!("listing json: {e}")))?;
        Ok(Page::from(body))
    }
}

fn decode_base64(value: &str) -> Result<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .or_else(|_| STANDARD_NO_PAD.decode(compact.trim_end_matches('=').as_bytes()))
        .map_err(|e| EngineError::Decode(format!("base64: {e}")))
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| EngineError::Decode(format!("decoded text is not utf-8: {e}")))
}
