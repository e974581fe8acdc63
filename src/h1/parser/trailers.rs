use super::context::Context;
use super::field::parse_header_fields;
use super::{ParseError, ParserConfig, RawHeader, SemanticError, normalize};
use crate::headers::{Headers, latin1_decode};

/// Fields that must not appear in a trailer section, nor be announced by `Trailer`.
pub const FORBIDDEN_TRAILER_FIELDS: &[&str] = &[
    "transfer-encoding",
    "content-length",
    "host",
    "cache-control",
    "expect",
    "max-forwards",
    "pragma",
    "range",
    "te",
    "authorization",
    "proxy-authenticate",
    "proxy-authorization",
    "www-authenticate",
    "content-encoding",
    "content-type",
    "content-range",
    "trailer",
];

/// Trailer section that follows the last chunk of a chunked body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTrailers {
    pub raw_headers: Vec<RawHeader>,
    pub headers: Headers,
}

/// Parse a complete trailer section.
///
/// `data` is either the lone empty line, or field lines followed by the empty line. Field
/// grammar and limits are the same as for a message head.
pub fn parse_trailers(data: &[u8], config: &ParserConfig) -> Result<ParsedTrailers, ParseError> {
    let empty = match data {
        b"\r\n" => true,
        b"\n" => config.allow_bare_lf,
        _ => false,
    };
    if empty {
        return Ok(ParsedTrailers::default());
    }

    let mut ctx = Context::new(data, config);
    ctx.verify_terminator()?;

    let raw_headers = parse_header_fields(&mut ctx, 0, 0)?;

    for (line, raw) in raw_headers.iter().enumerate() {
        let name = latin1_decode(&raw.name).to_ascii_lowercase();
        if FORBIDDEN_TRAILER_FIELDS.contains(&name.as_str()) {
            return Err(ParseError::new(
                SemanticError::ForbiddenTrailerField,
                format!("forbidden field in trailer section: {name:?}"),
                line,
                0,
            ));
        }
    }

    let headers = normalize(&raw_headers);

    Ok(ParsedTrailers { raw_headers, headers })
}
