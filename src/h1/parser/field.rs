use bytes::Bytes;

use super::context::Context;
use super::{EncodingError, HeaderFieldError, ParseError, RawHeader};
use crate::matches;

/// Parse field lines from `start` until the empty line.
///
/// `first_line` is the logical line number of the first field, used in errors.
pub(super) fn parse_header_fields(
    ctx: &mut Context,
    start: usize,
    first_line: usize,
) -> Result<Vec<RawHeader>, ParseError> {
    use HeaderFieldError as E;

    let data = ctx.data;
    let config = ctx.config;
    let mut headers = Vec::new();
    let mut pos = start;
    ctx.line = first_line;

    while pos < data.len() {
        match &data[pos..] {
            [b'\r', b'\n', ..] => break,
            [b'\n', ..] if config.allow_bare_lf => break,
            _ => {}
        }

        if headers.len() >= config.max_header_count {
            return Err(ctx.error(
                E::TooManyHeaders,
                format!("exceeded maximum header count of {}", config.max_header_count),
                pos,
            ));
        }

        let line_end = ctx.find_line_end(pos)?;
        let mut next_pos = line_end + ctx.line_ending_len(line_end);
        let line = &data[pos..line_end];

        let too_long = |len: usize| config.max_header_length.is_some_and(|max| len > max);

        if too_long(line.len()) {
            return Err(ctx
                .error(E::InvalidFieldValue, "header line exceeds maximum length", next_pos)
                .with_length_exceeded());
        }

        // obs-fold, continuation lines start with SP or HTAB
        let mut unfolded: Option<Vec<u8>> = None;

        while let Some(&byte) = data.get(next_pos) {
            if !matches::is_ows(byte) {
                break;
            }
            if !config.allow_obs_fold {
                return Err(ctx.error(
                    E::ObsFoldNotAllowed,
                    "obsolete line folding encountered but not allowed",
                    next_pos,
                ));
            }

            let cont_end = ctx.find_line_end(next_pos)?;
            let cont = &data[next_pos..cont_end];
            let cont = match cont.iter().position(|&b| !matches::is_ows(b)) {
                Some(i) => &cont[i..],
                None => &[],
            };

            let buf = unfolded.get_or_insert_with(|| line.to_vec());
            buf.push(b' ');
            buf.extend_from_slice(cont);

            next_pos = cont_end + ctx.line_ending_len(cont_end);

            if too_long(buf.len()) {
                return Err(ctx
                    .error(
                        E::InvalidFieldValue,
                        "unfolded header line exceeds maximum length",
                        next_pos,
                    )
                    .with_length_exceeded());
            }
        }

        let header = match &unfolded {
            Some(buf) => parse_one_header(ctx, buf, pos)?,
            None => parse_one_header(ctx, line, pos)?,
        };
        headers.push(header);

        pos = next_pos;
        ctx.line += 1;
    }

    // with bare LF allowed, an empty line may appear before the end of the block
    let end = pos + ctx.line_ending_len(pos);
    if end < data.len() {
        return Err(ctx.error(
            E::TrailingData,
            format!("unexpected {} byte(s) after header terminator", data.len() - end),
            end,
        ));
    }

    Ok(headers)
}

/// Parse a single, already unfolded, `field-name ":" OWS field-value OWS` line.
fn parse_one_header(ctx: &Context, line: &[u8], line_start: usize) -> Result<RawHeader, ParseError> {
    use HeaderFieldError as E;

    let config = ctx.config;

    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return Err(ctx.error(E::MissingColon, "header line has no colon separator", line_start));
    };

    let mut name = &line[..colon];
    let value = &line[colon + 1..];

    let Some(&last) = name.last() else {
        return Err(ctx.error(E::EmptyFieldName, "empty field-name before colon", line_start));
    };

    if matches::is_ows(last) {
        if !config.allow_space_before_colon {
            return Err(ctx.error(
                E::SpaceBeforeColon,
                "whitespace between field-name and colon",
                line_start + name.len() - 1,
            ));
        }
        while let [rest @ .., last] = name {
            if !matches::is_ows(*last) {
                break;
            }
            name = rest;
        }
        if name.is_empty() {
            return Err(ctx.error(
                E::EmptyFieldName,
                "field-name is only whitespace before colon",
                line_start,
            ));
        }
    }

    if !matches::is_token_str(name) {
        for (i, &b) in name.iter().enumerate() {
            if b == 0 {
                return Err(ctx.error(E::NulInHeader, "NUL byte in field-name", line_start + i));
            }
            if b >= 0x80 {
                return Err(ParseError::new(
                    EncodingError::NonAsciiInFieldName,
                    format!("non-ASCII byte 0x{b:02x} in field-name"),
                    ctx.line,
                    line_start + i,
                ));
            }
            if !matches::is_token(b) {
                return Err(ctx.error(
                    E::InvalidFieldName,
                    format!("invalid character 0x{b:02x} in field-name"),
                    line_start + i,
                ));
            }
        }
    }

    let value = matches::trim_ows(value);
    let value_offset = line_start + colon + 1;

    if value.is_empty() && !config.allow_empty_header_values {
        return Err(ctx.error(E::InvalidFieldValue, "empty header field value not allowed", value_offset));
    }

    let allowed: fn(u8) -> bool = match (config.allow_bare_cr_in_value, config.reject_obs_text) {
        (false, false) => matches::is_field_value,
        (false, true) => matches::is_field_value_ascii,
        (true, false) => matches::is_field_value_cr,
        (true, true) => matches::is_field_value_cr_ascii,
    };

    if !value.iter().all(|&b| allowed(b)) {
        for (i, &b) in value.iter().enumerate() {
            match b {
                0 => {
                    return Err(ctx.error(E::NulInHeader, "NUL byte in field-value", value_offset + i));
                }
                b'\r' if !config.allow_bare_cr_in_value => {
                    return Err(ctx.error(
                        E::BareCarriageReturn,
                        "bare CR in field-value",
                        value_offset + i,
                    ));
                }
                b'\r' => {}
                _ if allowed(b) => {}
                0x80.. if config.reject_obs_text => {
                    return Err(ParseError::new(
                        EncodingError::ObsTextInFieldValue,
                        format!("obs-text byte 0x{b:02x} rejected by config"),
                        ctx.line,
                        value_offset + i,
                    ));
                }
                _ => {
                    return Err(ctx.error(
                        E::InvalidFieldValue,
                        format!("invalid character 0x{b:02x} in field-value"),
                        value_offset + i,
                    ));
                }
            }
        }
    }

    Ok(RawHeader {
        name: Bytes::copy_from_slice(name),
        value: Bytes::copy_from_slice(value),
    })
}
