//! Byte class lookup tables used by the wire parser.
macro_rules! byte_map {
    {
        $(#[$meta:meta])*
        $vis:vis fn $fn_id:ident($byte:ident:$u8:ty) { $e:expr }
    } => {
        $(#[$meta])*
        $vis fn $fn_id($byte: $u8) -> bool {
            static PAT: [bool; 256] = {
                let mut bytes = [false; 256];
                let mut $byte = 0u8;
                const fn filter($byte: $u8) -> bool {
                    $e
                }
                loop {
                    bytes[$byte as usize] = filter($byte);
                    if $byte == 255 {
                        break;
                    }
                    $byte += 1;
                }
                bytes
            };
            PAT[$byte as usize]
        }
    };
}

byte_map! {
    /// token   = 1*tchar
    /// tchar   = "!" / "#" / "$" / "%" / "&" / "'" / "*"
    ///         / "+" / "-" / "." / "^" / "_" / "`" / "|" / "~"
    ///         / DIGIT / ALPHA
    #[inline(always)]
    pub fn is_token(byte: u8) {
        matches!(
            byte,
            | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*'
            | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
        || byte.is_ascii_alphanumeric()
    }
}

byte_map! {
    /// VCHAR = %x21-7E
    #[inline(always)]
    pub fn is_vchar(byte: u8) {
        matches!(byte, 0x21..=0x7e)
    }
}

byte_map! {
    /// request-target without URI grammar: VCHAR / obs-text
    #[inline(always)]
    pub fn is_request_target(byte: u8) {
        matches!(byte, 0x21..=0x7e | 0x80..=0xff)
    }
}

byte_map! {
    /// reason-phrase = *( HTAB / SP / VCHAR / obs-text )
    #[inline(always)]
    pub fn is_reason_phrase(byte: u8) {
        matches!(byte, b'\t' | b' ' | 0x21..=0x7e | 0x80..=0xff)
    }
}

byte_map! {
    /// field-vchar = VCHAR / obs-text, plus SP / HTAB inside the value
    #[inline(always)]
    pub fn is_field_value(byte: u8) {
        matches!(byte, b'\t' | b' ' | 0x21..=0x7e | 0x80..=0xff)
    }
}

byte_map! {
    #[inline(always)]
    pub fn is_field_value_ascii(byte: u8) {
        matches!(byte, b'\t' | b' ' | 0x21..=0x7e)
    }
}

byte_map! {
    #[inline(always)]
    pub fn is_field_value_cr(byte: u8) {
        matches!(byte, b'\t' | b'\r' | b' ' | 0x21..=0x7e | 0x80..=0xff)
    }
}

byte_map! {
    #[inline(always)]
    pub fn is_field_value_cr_ascii(byte: u8) {
        matches!(byte, b'\t' | b'\r' | b' ' | 0x21..=0x7e)
    }
}

/// Returns `true` for SP and HTAB.
#[inline(always)]
pub const fn is_ows(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t')
}

/// Returns `true` if `bytes` is a non-empty token.
pub fn is_token_str(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|&b| is_token(b))
}

/// Strip leading and trailing SP / HTAB.
pub fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !is_ows(*first) {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !is_ows(*last) {
            break;
        }
        bytes = rest;
    }
    bytes
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_token() {
        assert!(is_token_str(b"GET"));
        assert!(is_token_str(b"x-custom_Header.1~"));
        assert!(!is_token_str(b""));
        assert!(!is_token_str(b"GE T"));
        assert!(!is_token_str(b"a:b"));
        assert!(!is_token(0x80));
    }

    #[test]
    fn test_field_value_tables() {
        assert!(is_field_value(0xe9));
        assert!(!is_field_value_ascii(0xe9));
        assert!(!is_field_value(b'\r'));
        assert!(is_field_value_cr(b'\r'));
        assert!(!is_field_value_cr_ascii(0xe9));
        assert!(!is_field_value(0));
        assert!(!is_field_value(0x7f));
    }

    #[test]
    fn test_trim_ows() {
        assert_eq!(trim_ows(b" \tvalue \t"), b"value");
        assert_eq!(trim_ows(b"  "), b"");
        assert_eq!(trim_ows(b"a b"), b"a b");
    }
}
