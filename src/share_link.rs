//! Share links: a position carried in the fragment of a URL.
//!
//! `<origin><path>#<percent-encoded FEN>`. Escaping follows the URI component
//! rules browsers use, so links produced here open in a browser surface and
//! vice versa.

use log::{debug, warn};

/// Characters left unescaped in a URI component
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')'
        )
}

/// Percent-escape every byte outside the unreserved set
pub fn encode_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 3);
    for &byte in text.as_bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Undo [`encode_component`]. `None` on a broken escape or non-UTF-8 result.
pub fn decode_component(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Scheme followed by ':' as in RFC 3986
fn has_scheme(link: &str) -> bool {
    let Some((scheme, rest)) = link.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
}

/// Encodes positions into links on a fixed base address and back
#[derive(Debug, Clone)]
pub struct ShareLinkCodec {
    base: String,
}

impl ShareLinkCodec {
    /// `base` is origin plus path; any fragment on it is dropped
    pub fn new(base: &str) -> Self {
        let base = base.split('#').next().unwrap_or_default().to_string();
        ShareLinkCodec { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn encode(&self, position: &str) -> String {
        format!("{}#{}", self.base, encode_component(position))
    }

    /// Position carried by a link, or `None` for a malformed link or an
    /// empty fragment. Never panics.
    pub fn decode(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if !has_scheme(link) {
            warn!("Rejecting share link without a scheme: {}", link);
            return None;
        }
        let (_, fragment) = link.split_once('#')?;
        if fragment.is_empty() {
            debug!("Share link has an empty fragment");
            return None;
        }
        match decode_component(fragment) {
            Some(position) if !position.trim().is_empty() => Some(position),
            Some(_) => None,
            None => {
                warn!("Share link fragment is not a valid escape sequence");
                None
            }
        }
    }
}

/// The surface's current address: a base plus an optional fragment
#[derive(Debug, Clone)]
pub struct AddressBar {
    base: String,
    fragment: Option<String>,
}

impl AddressBar {
    pub fn new(base: &str) -> Self {
        AddressBar {
            base: base.split('#').next().unwrap_or_default().to_string(),
            fragment: None,
        }
    }

    /// Replace the fragment with an escaped position
    pub fn set_position(&mut self, position: &str) {
        self.fragment = Some(encode_component(position));
    }

    pub fn clear(&mut self) {
        self.fragment = None;
    }

    pub fn href(&self) -> String {
        match &self.fragment {
            Some(fragment) => format!("{}#{}", self.base, fragment),
            None => self.base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::START_FEN;

    fn codec() -> ShareLinkCodec {
        ShareLinkCodec::new("https://chess.example/play")
    }

    #[test]
    fn encodes_like_a_uri_component() {
        let link = codec().encode(START_FEN);
        assert_eq!(
            link,
            "https://chess.example/play#rnbqkbnr%2Fpppppppp%2F8%2F8%2F8%2F8%2FPPPPPPPP%2FRNBQKBNR%20w%20KQkq%20-%200%201"
        );
    }

    #[test]
    fn decode_inverts_encode() {
        let codec = codec();
        assert_eq!(codec.decode(&codec.encode(START_FEN)).as_deref(), Some(START_FEN));
    }

    #[test]
    fn base_fragment_is_dropped() {
        let codec = ShareLinkCodec::new("https://chess.example/play#old");
        assert_eq!(codec.base(), "https://chess.example/play");
    }

    #[test]
    fn malformed_links_decode_to_none() {
        let codec = codec();
        assert_eq!(codec.decode("https://x/y#not a valid url fragment%"), None);
        assert_eq!(codec.decode("https://x/y#%zz"), None);
        assert_eq!(codec.decode("https://x/y#%+1"), None);
        assert_eq!(codec.decode("https://x/y#%C3%28"), None);
        assert_eq!(codec.decode("no scheme here#abc"), None);
        assert_eq!(codec.decode(""), None);
    }

    #[test]
    fn missing_or_empty_fragment_decodes_to_none() {
        let codec = codec();
        assert_eq!(codec.decode("https://x/y"), None);
        assert_eq!(codec.decode("https://x/y#"), None);
        assert_eq!(codec.decode("https://x/y#%20%20"), None);
    }

    #[test]
    fn decodes_links_from_other_bases() {
        let other = ShareLinkCodec::new("http://localhost:3000/");
        let link = other.encode("8/8/4k3/8/8/3K4/8/8 w - - 0 1");
        assert_eq!(
            codec().decode(&link).as_deref(),
            Some("8/8/4k3/8/8/3K4/8/8 w - - 0 1")
        );
    }

    #[test]
    fn address_bar_tracks_the_fragment() {
        let mut bar = AddressBar::new("https://chess.example/play");
        assert_eq!(bar.href(), "https://chess.example/play");
        bar.set_position("8/8 w");
        assert_eq!(bar.href(), "https://chess.example/play#8%2F8%20w");
        bar.clear();
        assert_eq!(bar.href(), "https://chess.example/play");
    }
}
