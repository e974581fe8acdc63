use std::collections::{BTreeMap, BTreeSet};

use super::values::{comma_list, header_element, media_params, quoted_string};
use super::{FORBIDDEN_TRAILER_FIELDS, MessageKind, ParseError, ParserConfig, SemanticError};
use crate::headers::Headers;
use crate::http::{HttpDate, Version};

const KNOWN_CODINGS: &[&str] = &["chunked", "compress", "deflate", "gzip", "x-gzip", "x-compress"];

/// `type "/" subtype *( OWS ";" OWS parameter )`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lowercased `type/subtype`.
    pub media_type: String,
    pub params: BTreeMap<String, String>,
}

impl ContentType {
    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptEncodingItem {
    pub coding: String,
    pub q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptItem {
    pub media_range: String,
    pub q: f64,
    pub params: BTreeMap<String, String>,
}

/// `scheme [ SP credentials ]`, credentials are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub scheme: String,
    pub credentials: String,
}

/// Typed view of well-known header fields, derived once per message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedHeaders {
    pub content_length: Option<u64>,
    /// Lowercased codings in order of application.
    pub transfer_encoding: Option<Vec<String>>,
    pub host: Option<String>,
    /// Lowercased `Connection` tokens.
    pub connection: BTreeSet<String>,
    pub keep_alive: bool,
    pub content_type: Option<ContentType>,
    pub te: Option<Vec<String>>,
    pub upgrade: Option<Vec<String>>,
    pub trailer: Option<BTreeSet<String>>,
    pub expect: Option<String>,
    pub date: Option<HttpDate>,
    pub cache_control: Option<BTreeMap<String, Option<String>>>,
    pub accept_encoding: Option<Vec<AcceptEncodingItem>>,
    pub accept: Option<Vec<AcceptItem>>,
    pub authorization: Option<Authorization>,
}

impl PreparedHeaders {
    /// Returns `true` if the message is chunked framed.
    pub fn is_chunked(&self) -> bool {
        self.transfer_encoding
            .as_ref()
            .is_some_and(|codings| codings.last().is_some_and(|c| c == "chunked"))
    }

    /// Returns `true` if the client waits for `100 Continue` before sending content.
    pub fn expects_continue(&self) -> bool {
        self.expect.as_deref() == Some("100-continue")
    }
}

fn joined(headers: &Headers, name: &str) -> Option<String> {
    match headers.get_all(name) {
        [] => None,
        values => Some(values.join(", ")),
    }
}

/// Derive [`PreparedHeaders`], in a fixed order, then apply cross-field rules.
pub(super) fn prepare_headers(
    headers: &Headers,
    kind: MessageKind,
    version: Version,
    config: &ParserConfig,
) -> Result<PreparedHeaders, ParseError> {
    let mut prepared = PreparedHeaders {
        content_length: content_length(headers, config)?,
        transfer_encoding: transfer_encoding(headers, kind, version, config)?,
        host: host(headers, kind, version, config)?,
        ..Default::default()
    };

    connection(headers, version, &mut prepared);
    prepared.content_type = content_type(headers)?;
    prepared.te = joined(headers, "te").map(|te| {
        // parameters, including the weight, are not kept
        comma_list(&te)
            .map(|element| element.split(';').next().unwrap_or_default().trim().to_lowercase())
            .filter(|coding| !coding.is_empty())
            .collect()
    });
    prepared.upgrade = joined(headers, "upgrade").map(|v| comma_list(&v).map(str::to_owned).collect());
    prepared.trailer = trailer(headers)?;
    prepared.expect = expect(headers)?;
    prepared.date = date(headers)?;
    prepared.cache_control = cache_control(headers)?;
    prepared.accept_encoding = accept_encoding(headers)?;
    prepared.accept = accept(headers)?;
    prepared.authorization = authorization(headers)?;

    if prepared.content_length.is_some()
        && prepared.transfer_encoding.is_some()
        && !config.allow_content_length_with_te
    {
        return Err(ParseError::semantic(
            SemanticError::ContentLengthWithTransferEncoding,
            "Content-Length and Transfer-Encoding are both present",
        ));
    }

    Ok(prepared)
}

fn content_length(headers: &Headers, config: &ParserConfig) -> Result<Option<u64>, ParseError> {
    use SemanticError as E;

    let values = headers.get_all("content-length");
    if values.is_empty() {
        return Ok(None);
    }

    let mut parsed = Vec::with_capacity(values.len());

    for value in values {
        if config.reject_multi_value_content_length && value.contains(',') {
            return Err(ParseError::semantic(
                E::InvalidContentLength,
                format!("Content-Length with multiple values is forbidden: {value:?}"),
            ));
        }

        for part in value.split(',').map(str::trim) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::semantic(
                    E::InvalidContentLength,
                    format!("Content-Length value is not a valid non-negative integer: {part:?}"),
                ));
            }
            if config.max_content_length_str_len.is_some_and(|max| part.len() > max) {
                return Err(ParseError::semantic(
                    E::InvalidContentLength,
                    format!("Content-Length value string too long: {part:?}"),
                ));
            }
            let Ok(len) = part.parse::<u64>() else {
                return Err(ParseError::semantic(
                    E::InvalidContentLength,
                    format!("Content-Length value out of range: {part:?}"),
                ));
            };
            parsed.push(len);
        }
    }

    let unique = parsed.iter().collect::<BTreeSet<_>>();
    if unique.len() > 1 {
        return Err(ParseError::semantic(
            E::ConflictingContentLength,
            format!("conflicting Content-Length values: {unique:?}"),
        ));
    }

    if parsed.len() > 1 && !config.allow_multiple_content_lengths {
        return Err(ParseError::semantic(
            E::DuplicateContentLength,
            format!(
                "multiple Content-Length values (all {}), set allow_multiple_content_lengths to accept",
                parsed[0]
            ),
        ));
    }

    Ok(parsed.first().copied())
}

fn transfer_encoding(
    headers: &Headers,
    kind: MessageKind,
    version: Version,
    config: &ParserConfig,
) -> Result<Option<Vec<String>>, ParseError> {
    use SemanticError as E;

    let Some(combined) = joined(headers, "transfer-encoding") else {
        return Ok(None);
    };

    let codings = comma_list(&combined).map(str::to_lowercase).collect::<Vec<_>>();

    if codings.is_empty() {
        return Err(ParseError::semantic(
            E::InvalidTransferEncoding,
            "Transfer-Encoding header present but empty",
        ));
    }

    if version == Version::HTTP_10 && !config.allow_transfer_encoding_http10 {
        return Err(ParseError::semantic(
            E::TeInHttp10,
            "Transfer-Encoding is not defined for HTTP/1.0",
        ));
    }

    if !config.allow_unknown_transfer_encoding {
        if let Some(unknown) = codings.iter().find(|c| !KNOWN_CODINGS.contains(&c.as_str())) {
            return Err(ParseError::semantic(
                E::InvalidTransferEncoding,
                format!("unknown transfer-coding: {unknown:?}"),
            ));
        }
    }

    let chunked = codings.iter().filter(|c| *c == "chunked").count();

    if chunked > 0 {
        if codings.last().is_none_or(|c| c != "chunked") {
            return Err(ParseError::semantic(
                E::TeWithoutChunkedLast,
                "chunked must be the last transfer-coding",
            ));
        }
        if chunked > 1 {
            return Err(ParseError::semantic(
                E::InvalidTransferEncoding,
                "chunked appears more than once in Transfer-Encoding",
            ));
        }
    } else {
        match kind {
            MessageKind::Request => {
                return Err(ParseError::semantic(
                    E::TeWithoutChunkedLast,
                    "Transfer-Encoding in a request must include chunked as the last coding",
                ));
            }
            MessageKind::Response if !config.allow_te_without_chunked_in_response => {
                return Err(ParseError::semantic(
                    E::TeWithoutChunkedLast,
                    "Transfer-Encoding in a response without chunked, \
                     set allow_te_without_chunked_in_response to accept",
                ));
            }
            MessageKind::Response => {}
        }
    }

    Ok(Some(codings))
}

fn host(
    headers: &Headers,
    kind: MessageKind,
    version: Version,
    config: &ParserConfig,
) -> Result<Option<String>, ParseError> {
    use SemanticError as E;

    let values = headers.get_all("host");

    if kind == MessageKind::Request
        && version == Version::HTTP_11
        && values.is_empty()
        && !config.allow_missing_host
    {
        return Err(ParseError::semantic(
            E::MissingHostHeader,
            "Host header is required in HTTP/1.1 requests",
        ));
    }

    if values.len() > 1 {
        if !config.allow_multiple_hosts {
            return Err(ParseError::semantic(
                E::MultipleHostHeaders,
                format!("multiple Host headers found ({})", values.len()),
            ));
        }
        let unique = values.iter().collect::<BTreeSet<_>>();
        if unique.len() > 1 {
            return Err(ParseError::semantic(
                E::ConflictingHostHeaders,
                format!("multiple Host headers with different values: {unique:?}"),
            ));
        }
    }

    let Some(value) = values.first() else {
        return Ok(None);
    };
    let value = value.trim();

    if value.contains([' ', '\t']) {
        return Err(ParseError::semantic(E::InvalidHost, "whitespace not allowed in Host header"));
    }
    if let Some(i) = value.chars().position(|c| (c as u32) < 0x21) {
        return Err(ParseError::semantic(
            E::InvalidHost,
            format!("invalid character in Host header at position {i}"),
        ));
    }

    Ok(Some(value.to_owned()))
}

fn connection(headers: &Headers, version: Version, prepared: &mut PreparedHeaders) {
    prepared.connection = joined(headers, "connection")
        .map(|v| comma_list(&v).map(str::to_lowercase).collect())
        .unwrap_or_default();

    prepared.keep_alive = if prepared.connection.contains("close") {
        false
    } else if prepared.connection.contains("keep-alive") {
        true
    } else {
        version.is_persistent_by_default()
    };
}

fn content_type(headers: &Headers) -> Result<Option<ContentType>, ParseError> {
    use SemanticError as E;

    let Some(raw) = joined(headers, "content-type") else {
        return Ok(None);
    };

    let (media_type, params) = match raw.find(';') {
        Some(semi) => (raw[..semi].trim().to_lowercase(), media_params(&raw[semi..])),
        None => (raw.trim().to_lowercase(), BTreeMap::new()),
    };

    let Some((ty, subty)) = media_type.split_once('/') else {
        return Err(ParseError::semantic(
            E::InvalidContentType,
            format!("Content-Type missing \"/\" in media-type: {media_type:?}"),
        ));
    };
    if ty.is_empty() || subty.is_empty() {
        return Err(ParseError::semantic(
            E::InvalidContentType,
            format!("Content-Type has empty type or subtype: {media_type:?}"),
        ));
    }

    Ok(Some(ContentType { media_type, params }))
}

fn trailer(headers: &Headers) -> Result<Option<BTreeSet<String>>, ParseError> {
    let Some(raw) = joined(headers, "trailer") else {
        return Ok(None);
    };

    let fields = comma_list(&raw).map(str::to_lowercase).collect::<BTreeSet<_>>();

    if let Some(field) = fields.iter().find(|f| FORBIDDEN_TRAILER_FIELDS.contains(&f.as_str())) {
        return Err(ParseError::semantic(
            SemanticError::ForbiddenTrailerField,
            format!("forbidden field in Trailer header: {field:?}"),
        ));
    }

    Ok(Some(fields))
}

fn expect(headers: &Headers) -> Result<Option<String>, ParseError> {
    let Some(raw) = joined(headers, "expect") else {
        return Ok(None);
    };

    let value = raw.trim().to_lowercase();
    if value != "100-continue" {
        return Err(ParseError::semantic(
            SemanticError::InvalidExpect,
            format!("only \"100-continue\" is accepted for Expect, got {value:?}"),
        ));
    }

    Ok(Some(value))
}

fn date(headers: &Headers) -> Result<Option<HttpDate>, ParseError> {
    let Some(raw) = joined(headers, "date") else {
        return Ok(None);
    };

    match HttpDate::parse(&raw) {
        Ok(date) => Ok(Some(date)),
        Err(err) => Err(ParseError::semantic(
            SemanticError::InvalidDate,
            format!("cannot parse Date header: {err}"),
        )),
    }
}

fn cache_control(headers: &Headers) -> Result<Option<BTreeMap<String, Option<String>>>, ParseError> {
    let Some(raw) = joined(headers, "cache-control") else {
        return Ok(None);
    };

    let mut directives = BTreeMap::new();

    for part in comma_list(&raw) {
        let Some((name, value)) = part.split_once('=') else {
            directives.insert(part.to_lowercase(), None);
            continue;
        };

        let name = name.trim().to_lowercase();
        let value = value.trim();
        let value = if value.starts_with('"') {
            match quoted_string(value) {
                Ok((value, _)) => value,
                Err(_) => {
                    return Err(ParseError::semantic(
                        SemanticError::InvalidCacheControl,
                        format!("invalid quoted-string in Cache-Control directive: {name}"),
                    ));
                }
            }
        } else {
            value.to_owned()
        };

        directives.insert(name, Some(value));
    }

    Ok(Some(directives))
}

fn accept_encoding(headers: &Headers) -> Result<Option<Vec<AcceptEncodingItem>>, ParseError> {
    let Some(raw) = joined(headers, "accept-encoding") else {
        return Ok(None);
    };

    let mut items = Vec::new();

    for part in comma_list(&raw) {
        let Ok((coding, q, _)) = header_element(part) else {
            return Err(ParseError::semantic(
                SemanticError::InvalidAcceptEncoding,
                format!("invalid q-value in Accept-Encoding: {part:?}"),
            ));
        };
        if !coding.is_empty() {
            items.push(AcceptEncodingItem { coding, q });
        }
    }

    Ok(Some(items))
}

fn accept(headers: &Headers) -> Result<Option<Vec<AcceptItem>>, ParseError> {
    let Some(raw) = joined(headers, "accept") else {
        return Ok(None);
    };

    let mut items = Vec::new();

    for part in comma_list(&raw) {
        let Ok((media_range, q, params)) = header_element(part) else {
            return Err(ParseError::semantic(
                SemanticError::InvalidAccept,
                format!("invalid q-value in Accept: {part:?}"),
            ));
        };
        items.push(AcceptItem { media_range, q, params });
    }

    Ok(Some(items))
}

fn authorization(headers: &Headers) -> Result<Option<Authorization>, ParseError> {
    let Some(raw) = joined(headers, "authorization") else {
        return Ok(None);
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParseError::semantic(
            SemanticError::InvalidAuthorization,
            "Authorization header is present but empty",
        ));
    }

    let (scheme, credentials) = raw.split_once(' ').unwrap_or((raw, ""));

    Ok(Some(Authorization {
        scheme: scheme.to_owned(),
        credentials: credentials.to_owned(),
    }))
}
