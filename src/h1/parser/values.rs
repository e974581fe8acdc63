//! Helpers for list and parameter based field values.
use std::collections::BTreeMap;

/// Split a comma separated value into trimmed, non-empty elements.
pub(super) fn comma_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Malformed quoted-string.
#[derive(Debug)]
pub(super) struct InvalidQuotedString;

/// Parse a quoted-string at the start of `data`, returns the unescaped value and the remainder
/// after the closing DQUOTE.
pub(super) fn quoted_string(data: &str) -> Result<(String, &str), InvalidQuotedString> {
    let Some(rest) = data.strip_prefix('"') else {
        return Err(InvalidQuotedString);
    };

    let mut value = String::new();
    let mut chars = rest.char_indices();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' => return Ok((value, &rest[i + 1..])),
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => return Err(InvalidQuotedString),
            },
            _ => value.push(ch),
        }
    }

    Err(InvalidQuotedString)
}

/// Parse `;name=value` parameters of a media type or list element.
///
/// Names are lowercased, values may be tokens or quoted-strings. A parameter without `=` is
/// skipped, a malformed quoted-string ends parameter parsing.
pub(super) fn media_params(params: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut remaining = params.trim();

    while let Some(rest) = remaining.strip_prefix(';') {
        remaining = rest.trim();
        if remaining.is_empty() {
            break;
        }

        let segment_end = remaining.find(';').unwrap_or(remaining.len());
        let Some(eq) = remaining[..segment_end].find('=') else {
            if segment_end == remaining.len() {
                break;
            }
            remaining = &remaining[segment_end..];
            continue;
        };

        let name = remaining[..eq].trim().to_lowercase();
        remaining = remaining[eq + 1..].trim();

        let value = if remaining.starts_with('"') {
            let Ok((value, rest)) = quoted_string(remaining) else {
                break;
            };
            remaining = rest.trim();
            value
        } else {
            match remaining.find(';') {
                Some(semi) => {
                    let value = remaining[..semi].trim().to_owned();
                    remaining = &remaining[semi..];
                    value
                }
                None => {
                    let value = remaining.trim().to_owned();
                    remaining = "";
                    value
                }
            }
        };

        if !name.is_empty() {
            out.insert(name, value);
        }
    }

    out
}

/// Malformed `q` parameter.
#[derive(Debug)]
pub(super) struct InvalidQValue;

/// Split a list element like `token;q=0.5;param=val` into the lowercased token, the weight
/// defaulting to `1.0`, and the remaining parameters.
pub(super) fn header_element(
    element: &str,
) -> Result<(String, f64, BTreeMap<String, String>), InvalidQValue> {
    let Some(semi) = element.find(';') else {
        return Ok((element.trim().to_lowercase(), 1.0, BTreeMap::new()));
    };

    let token = element[..semi].trim().to_lowercase();
    let mut params = media_params(&element[semi..]);

    let q = match params.remove("q") {
        Some(q) => q.trim().parse::<f64>().map_err(|_| InvalidQValue)?,
        None => 1.0,
    };

    Ok((token, q, params))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_quoted_string() {
        assert_eq!(quoted_string(r#""abc" rest"#).unwrap(), ("abc".to_owned(), " rest"));
        assert_eq!(quoted_string(r#""a\"b\\c""#).unwrap(), (r#"a"b\c"#.to_owned(), ""));
        assert!(quoted_string(r#""open"#).is_err());
        assert!(quoted_string(r#""trailing\"#).is_err());
        assert!(quoted_string("bare").is_err());
    }

    #[test]
    fn test_media_params() {
        let params = media_params(r#"; Charset=UTF-8; boundary="a;b"; flag; x = y"#);
        assert_eq!(params.get("charset").map(String::as_str), Some("UTF-8"));
        assert_eq!(params.get("boundary").map(String::as_str), Some("a;b"));
        assert_eq!(params.get("x").map(String::as_str), Some("y"));
        assert!(!params.contains_key("flag"));
    }

    #[test]
    fn test_header_element() {
        let (token, q, params) = header_element("GZIP;q=0.5;level=1").unwrap();
        assert_eq!(token, "gzip");
        assert_eq!(q, 0.5);
        assert_eq!(params.len(), 1);

        let (token, q, _) = header_element(" br ").unwrap();
        assert_eq!(token, "br");
        assert_eq!(q, 1.0);

        assert!(header_element("gzip;q=high").is_err());
    }

    #[test]
    fn test_comma_list() {
        assert_eq!(comma_list(" a, ,b ,c,").collect::<Vec<_>>(), ["a", "b", "c"]);
    }
}
