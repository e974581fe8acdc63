use bytes::Bytes;

use super::{HeaderFieldError, ParseError, ParserConfig, RequestLine, StartLineError, StatusLine};
use crate::headers::latin1_decode;
use crate::http::Version;
use crate::matches;

fn error(code: StartLineError, message: impl Into<String>, offset: usize) -> ParseError {
    ParseError::new(code, message, 0, offset)
}

fn version_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// `method SP request-target SP HTTP-version`, exactly two SP.
pub(super) fn parse_request_line(
    line: &[u8],
    config: &ParserConfig,
) -> Result<RequestLine, ParseError> {
    use StartLineError as E;

    let Some(first_sp) = line.iter().position(|&b| b == b' ') else {
        return Err(error(E::MalformedRequestLine, "no SP found in request-line", 0));
    };
    let last_sp = line.iter().rposition(|&b| b == b' ').unwrap_or(first_sp);
    if first_sp == last_sp {
        return Err(error(
            E::MalformedRequestLine,
            "only one SP found in request-line, expected method SP target SP version",
            first_sp,
        ));
    }

    let spaces = line.iter().filter(|&&b| b == b' ').count();
    if spaces != 2 {
        return Err(error(
            E::MalformedRequestLine,
            format!("request-line contains {spaces} spaces, expected exactly 2"),
            0,
        ));
    }

    let method = &line[..first_sp];
    let target = &line[first_sp + 1..last_sp];
    let version = &line[last_sp + 1..];

    if method.is_empty() {
        return Err(error(E::InvalidMethod, "empty method in request-line", 0));
    }
    if !matches::is_token_str(method) {
        return Err(error(E::InvalidMethod, "method contains invalid character(s)", 0));
    }

    if target.is_empty() {
        return Err(error(E::InvalidRequestTarget, "empty request-target", first_sp + 1));
    }
    if config.reject_non_visible_ascii_request_target {
        if !target.iter().all(|&b| matches::is_vchar(b)) {
            return Err(error(
                E::InvalidRequestTarget,
                "request-target contains non-visible-ASCII character(s)",
                first_sp + 1,
            ));
        }
    } else if !target.iter().all(|&b| matches::is_request_target(b)) {
        return Err(error(
            E::InvalidRequestTarget,
            "request-target contains invalid character(s)",
            first_sp + 1,
        ));
    }

    let Some(version) = Version::from_bytes(version) else {
        return Err(error(
            E::UnsupportedHttpVersion,
            format!("unsupported HTTP version: {:?}", version_lossy(version)),
            last_sp + 1,
        ));
    };

    Ok(RequestLine {
        method: latin1_decode(method),
        target: Bytes::copy_from_slice(target),
        version,
    })
}

/// `HTTP-version SP status-code SP reason-phrase`, the second SP is required even when the
/// reason phrase is empty.
pub(super) fn parse_status_line(line: &[u8]) -> Result<StatusLine, ParseError> {
    use StartLineError as E;

    let Some(first_sp) = line.iter().position(|&b| b == b' ') else {
        return Err(error(E::MalformedStatusLine, "no SP found in status-line", 0));
    };

    let version = &line[..first_sp];
    let rest = &line[first_sp + 1..];

    let Some(second_sp) = rest.iter().position(|&b| b == b' ') else {
        return Err(error(
            E::MalformedStatusLine,
            "missing second SP in status-line, required before reason-phrase",
            first_sp + 1 + rest.len(),
        ));
    };

    let status = &rest[..second_sp];
    let reason = &rest[second_sp + 1..];

    let Some(version) = Version::from_bytes(version) else {
        return Err(error(
            E::UnsupportedHttpVersion,
            format!("unsupported HTTP version: {:?}", version_lossy(version)),
            0,
        ));
    };

    let &[a, b, c] = status else {
        return Err(error(
            E::InvalidStatusCode,
            format!("status code is not exactly 3 digits: {:?}", version_lossy(status)),
            first_sp + 1,
        ));
    };
    if ![a, b, c].iter().all(u8::is_ascii_digit) {
        return Err(error(
            E::InvalidStatusCode,
            format!("status code is not exactly 3 digits: {:?}", version_lossy(status)),
            first_sp + 1,
        ));
    }

    let code = (a - b'0') as u16 * 100 + (b - b'0') as u16 * 10 + (c - b'0') as u16;
    if !(100..=599).contains(&code) {
        return Err(error(
            E::InvalidStatusCode,
            format!("status code {code} out of range 100-599"),
            first_sp + 1,
        ));
    }

    let reason_offset = first_sp + 1 + second_sp + 1;
    if let Some(i) = reason.iter().position(|&b| !matches::is_reason_phrase(b)) {
        let byte = reason[i];
        if byte == 0 {
            return Err(ParseError::new(
                HeaderFieldError::NulInHeader,
                "NUL byte in reason-phrase",
                0,
                reason_offset + i,
            ));
        }
        return Err(error(
            E::MalformedStatusLine,
            format!("invalid character 0x{byte:02x} in reason-phrase"),
            reason_offset + i,
        ));
    }

    Ok(StatusLine {
        version,
        status: code,
        reason: latin1_decode(reason),
    })
}
