use proptest::prelude::*;

use super::*;

fn parse(input: &[u8]) -> Result<ParsedMessage, ParseError> {
    parse_message(input, ParserMode::Auto, &ParserConfig::default())
}

fn parse_with(input: &[u8], config: ParserConfig) -> Result<ParsedMessage, ParseError> {
    parse_message(input, ParserMode::Auto, &config)
}

macro_rules! ok {
    ($e:expr) => {
        match $e {
            Ok(ok) => ok,
            Err(err) => panic!("unexpected `Err`: {err}"),
        }
    };
}

macro_rules! error_code {
    {
        $(#[config($config:expr)])?
        $($input:literal => $code:literal;)*
    } => {
        #[allow(unused_mut)]
        let mut base = ParserConfig::default();
        $( base = $config; )?
        $(
            match parse_with($input, base.clone()) {
                Ok(ok) => panic!("expected `{}` but parsed: {ok:?}", $code),
                Err(err) => assert_eq!(
                    err.code(),
                    $code,
                    "input: {:?}, error: {err}",
                    String::from_utf8_lossy($input),
                ),
            }
        )*
    };
}

#[test]
fn test_parse_request() {
    let msg = ok!(parse(
        b"GET /index.html?q=1 HTTP/1.1\r\n\
          Host: example.com\r\n\
          Accept: text/html;q=0.9, */*\r\n\
          Connection: close\r\n\
          \r\n"
    ));

    assert_eq!(msg.kind, MessageKind::Request);
    assert!(msg.status_line.is_none());

    let line = msg.request_line.as_ref().unwrap();
    assert_eq!(line.method, "GET");
    assert_eq!(line.target.as_ref(), b"/index.html?q=1");
    assert_eq!(line.version, Version::HTTP_11);

    assert_eq!(msg.raw_headers.len(), 3);
    assert_eq!(msg.raw_headers[0].name.as_ref(), b"Host");
    assert_eq!(msg.raw_headers[0].value.as_ref(), b"example.com");

    assert_eq!(msg.headers.get("host"), Ok(Some("example.com".to_owned())));
    assert_eq!(msg.prepared.host.as_deref(), Some("example.com"));
    assert!(!msg.prepared.keep_alive);
    assert!(msg.prepared.connection.contains("close"));

    let accept = msg.prepared.accept.as_ref().unwrap();
    assert_eq!(accept.len(), 2);
    assert_eq!(accept[0].media_range, "text/html");
    assert_eq!(accept[0].q, 0.9);
    assert_eq!(accept[1].media_range, "*/*");
    assert_eq!(accept[1].q, 1.0);
}

#[test]
fn test_parse_response() {
    let msg = ok!(parse(
        b"HTTP/1.1 404 Not Found\r\n\
          Content-Length: 0\r\n\
          Set-Cookie: a=1\r\n\
          Set-Cookie: b=2\r\n\
          \r\n"
    ));

    assert_eq!(msg.kind, MessageKind::Response);
    let line = msg.status_line.as_ref().unwrap();
    assert_eq!(line.status, 404);
    assert_eq!(line.reason, "Not Found");
    assert_eq!(msg.version(), Version::HTTP_11);
    assert_eq!(msg.prepared.content_length, Some(0));
    assert!(msg.headers.get("set-cookie").is_err());
    assert_eq!(msg.headers.get_all("set-cookie"), ["a=1", "b=2"]);

    let msg = ok!(parse(b"HTTP/1.0 204 \r\n\r\n"));
    assert_eq!(msg.status_line.unwrap().reason, "");

    // explicit mode overrides detection
    let err = parse_message(b"HTTP/1.1 200 OK\r\n\r\n", ParserMode::Request, &ParserConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StartLineError(StartLineError::InvalidMethod));
}

#[test]
fn test_start_line_errors() {
    error_code! {
        b"GET /\r\n\r\n" => "MALFORMED_REQUEST_LINE";
        b"GET\r\n\r\n" => "MALFORMED_REQUEST_LINE";
        b"GET  / HTTP/1.1\r\nHost: a\r\n\r\n" => "MALFORMED_REQUEST_LINE";
        b"GET / HTTP/1.1 \r\nHost: a\r\n\r\n" => "MALFORMED_REQUEST_LINE";
        b" / HTTP/1.1\r\nHost: a\r\n\r\n" => "INVALID_METHOD";
        b"G(T / HTTP/1.1\r\nHost: a\r\n\r\n" => "INVALID_METHOD";
        b"GET /\x7f HTTP/1.1\r\nHost: a\r\n\r\n" => "INVALID_REQUEST_TARGET";
        b"GET / HTTP/2.0\r\nHost: a\r\n\r\n" => "UNSUPPORTED_HTTP_VERSION";
        b"GET / http/1.1\r\nHost: a\r\n\r\n" => "UNSUPPORTED_HTTP_VERSION";
        b"HTTP/1.1 200\r\n\r\n" => "MALFORMED_STATUS_LINE";
        b"HTTP/1.1 200 O\x01K\r\n\r\n" => "MALFORMED_STATUS_LINE";
        b"HTTP/1.1 20 OK\r\n\r\n" => "INVALID_STATUS_CODE";
        b"HTTP/1.1 2x0 OK\r\n\r\n" => "INVALID_STATUS_CODE";
        b"HTTP/1.1 600 Nope\r\n\r\n" => "INVALID_STATUS_CODE";
        b"HTTP/1.1 099 Nope\r\n\r\n" => "INVALID_STATUS_CODE";
        b"HTTP/2.0 200 OK\r\n\r\n" => "UNSUPPORTED_HTTP_VERSION";
    }
    error_code! {
        #[config(ParserConfig { reject_non_visible_ascii_request_target: true, ..Default::default() })]
        b"GET /caf\xe9 HTTP/1.1\r\nHost: a\r\n\r\n" => "INVALID_REQUEST_TARGET";
    }

    // obs-text is a valid target byte by default
    let msg = ok!(parse(b"GET /caf\xe9 HTTP/1.1\r\nHost: a\r\n\r\n"));
    assert_eq!(msg.request_line.unwrap().target.as_ref(), b"/caf\xe9");
}

#[test]
fn test_header_field_errors() {
    error_code! {
        b"GET / HTTP/1.1\r\nHost: a\r\n\r\nextra" => "TRAILING_DATA";
        b"GET / HTTP/1.1\r\nHost: a\r\n\r\n\r\n" => "TRAILING_DATA";
        b"GET / HTTP/1.1\r\nHost: a\r\n" => "MISSING_TERMINATOR";
        b"" => "MISSING_TERMINATOR";
        b"GET / HTTP/1.1\nHost: a\r\n\r\n" => "BARE_LF";
        b"GET / HTTP/1.1\r\nHost: a\rb\r\n\r\n" => "BARE_CARRIAGE_RETURN";
        b"GET / HTTP/1.1\r\nHost: a\0\r\n\r\n" => "NUL_IN_HEADER";
        b"GET / HTTP/1.1\r\nHost a\r\n\r\n" => "MISSING_COLON";
        b"GET / HTTP/1.1\r\n: a\r\n\r\n" => "EMPTY_FIELD_NAME";
        b"GET / HTTP/1.1\r\nHost : a\r\n\r\n" => "SPACE_BEFORE_COLON";
        b"GET / HTTP/1.1\r\nHost\t: a\r\n\r\n" => "SPACE_BEFORE_COLON";
        b"GET / HTTP/1.1\r\nHo(st: a\r\n\r\n" => "INVALID_FIELD_NAME";
        b"GET / HTTP/1.1\r\n Host: a\r\n\r\n" => "INVALID_FIELD_NAME";
        b"GET / HTTP/1.1\r\nHost: a\x01\r\n\r\n" => "INVALID_FIELD_VALUE";
        b"GET / HTTP/1.1\r\nHost: a\x7f\r\n\r\n" => "INVALID_FIELD_VALUE";
        b"GET / HTTP/1.1\r\nHost: a\r\nX: one\r\n two\r\n\r\n" => "OBS_FOLD_NOT_ALLOWED";
    }
    error_code! {
        #[config(ParserConfig { max_header_count: 2, ..Default::default() })]
        b"GET / HTTP/1.1\r\nHost: a\r\nA: 1\r\nB: 2\r\n\r\n" => "TOO_MANY_HEADERS";
    }
    error_code! {
        #[config(ParserConfig { max_header_length: Some(10), ..Default::default() })]
        b"GET / HTTP/1.1\r\nHost: a\r\nX-Long: 0123456789\r\n\r\n" => "INVALID_FIELD_VALUE";
    }
    error_code! {
        #[config(ParserConfig { allow_empty_header_values: false, ..Default::default() })]
        b"GET / HTTP/1.1\r\nHost: a\r\nX-Empty:  \r\n\r\n" => "INVALID_FIELD_VALUE";
    }
    error_code! {
        #[config(ParserConfig { allow_space_before_colon: true, ..Default::default() })]
        b"GET / HTTP/1.1\r\n \t: a\r\n\r\n" => "EMPTY_FIELD_NAME";
    }
}

#[test]
fn test_length_exceeded() {
    let config = ParserConfig { max_header_length: Some(10), ..Default::default() };
    let err = parse_with(b"GET / HTTP/1.1\r\nHost: a\r\nX-Long: 0123456789\r\n\r\n", config.clone())
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_FIELD_VALUE");
    assert!(err.is_length_exceeded());

    let config = ParserConfig { allow_obs_fold: true, ..config };
    let err = parse_with(b"GET / HTTP/1.1\r\nHost: a\r\nX: 01234\r\n 56789\r\n\r\n", config)
        .unwrap_err();
    assert!(err.is_length_exceeded());

    let err = parse(b"GET / HTTP/1.1\r\nHost: a\x01\r\n\r\n").unwrap_err();
    assert_eq!(err.code(), "INVALID_FIELD_VALUE");
    assert!(!err.is_length_exceeded());
}

#[test]
fn test_encoding_errors() {
    error_code! {
        b"GET / HTTP/1.1\r\nH\xe9st: a\r\n\r\n" => "NON_ASCII_IN_FIELD_NAME";
    }
    error_code! {
        #[config(ParserConfig { reject_obs_text: true, ..Default::default() })]
        b"GET / HTTP/1.1\r\nHost: a\r\nX: caf\xe9\r\n\r\n" => "OBS_TEXT_IN_FIELD_VALUE";
    }

    let msg = ok!(parse(b"GET / HTTP/1.1\r\nHost: a\r\nX: caf\xe9\r\n\r\n"));
    assert_eq!(msg.headers.first("x"), Some("café"));

    let err = parse(b"GET / HTTP/1.1\r\nH\xe9st: a\r\n\r\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodingError(EncodingError::NonAsciiInFieldName));
}

#[test]
fn test_error_location() {
    let err = parse(b"GET / HTTP/1.1\r\nHost: a\r\nBad Name: x\r\n\r\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HeaderFieldError(HeaderFieldError::InvalidFieldName));
    assert_eq!(err.line(), 2);
    assert_eq!(err.offset(), 28);
    assert_eq!(
        err.to_string(),
        "[INVALID_FIELD_NAME] line 2, offset 28: invalid character 0x20 in field-name"
    );

    let err = parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\nxy").unwrap_err();
    assert_eq!((err.line(), err.offset()), (0, 27));
}

#[test]
fn test_semantic_errors() {
    error_code! {
        b"GET / HTTP/1.1\r\n\r\n" => "MISSING_HOST_HEADER";
        b"GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n" => "MULTIPLE_HOST_HEADERS";
        b"GET / HTTP/1.1\r\nHost: a\r\nHost: a\r\n\r\n" => "MULTIPLE_HOST_HEADERS";
        b"GET / HTTP/1.1\r\nHost: a b\r\n\r\n" => "INVALID_HOST";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\n" => "DUPLICATE_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5, 5\r\n\r\n" => "DUPLICATE_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n" => "CONFLICTING_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5, 6\r\n\r\n" => "CONFLICTING_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: -1\r\n\r\n" => "INVALID_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: abc\r\n\r\n" => "INVALID_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length:\r\n\r\n" => "INVALID_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 99999999999999999999999\r\n\r\n" => "INVALID_CONTENT_LENGTH";
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: gzip\r\n\r\n" => "TE_WITHOUT_CHUNKED_LAST";
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked, gzip\r\n\r\n" => "TE_WITHOUT_CHUNKED_LAST";
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked, chunked\r\n\r\n" => "INVALID_TRANSFER_ENCODING";
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: foo, chunked\r\n\r\n" => "INVALID_TRANSFER_ENCODING";
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: ,\r\n\r\n" => "INVALID_TRANSFER_ENCODING";
        b"POST / HTTP/1.0\r\nTransfer-Encoding: chunked\r\n\r\n" => "TE_IN_HTTP10";
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n" => "TE_WITHOUT_CHUNKED_LAST";
        b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n" => "CONTENT_LENGTH_WITH_TRANSFER_ENCODING";
        b"GET / HTTP/1.1\r\nHost: a\r\nContent-Type: text\r\n\r\n" => "INVALID_CONTENT_TYPE";
        b"GET / HTTP/1.1\r\nHost: a\r\nContent-Type: text/\r\n\r\n" => "INVALID_CONTENT_TYPE";
        b"GET / HTTP/1.1\r\nHost: a\r\nTrailer: Content-Length\r\n\r\n" => "FORBIDDEN_TRAILER_FIELD";
        b"GET / HTTP/1.1\r\nHost: a\r\nExpect: something\r\n\r\n" => "INVALID_EXPECT";
        b"GET / HTTP/1.1\r\nHost: a\r\nDate: yesterday\r\n\r\n" => "INVALID_DATE";
        b"GET / HTTP/1.1\r\nHost: a\r\nCache-Control: private=\"x\r\n\r\n" => "INVALID_CACHE_CONTROL";
        b"GET / HTTP/1.1\r\nHost: a\r\nAccept-Encoding: gzip;q=abc\r\n\r\n" => "INVALID_ACCEPT_ENCODING";
        b"GET / HTTP/1.1\r\nHost: a\r\nAccept: text/html;q=x\r\n\r\n" => "INVALID_ACCEPT";
        b"GET / HTTP/1.1\r\nHost: a\r\nAuthorization:   \r\n\r\n" => "INVALID_AUTHORIZATION";
    }
    error_code! {
        #[config(ParserConfig { allow_multiple_hosts: true, ..Default::default() })]
        b"GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n" => "CONFLICTING_HOST_HEADERS";
    }
    error_code! {
        #[config(ParserConfig { reject_multi_value_content_length: true, ..Default::default() })]
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5, 5\r\n\r\n" => "INVALID_CONTENT_LENGTH";
    }
    error_code! {
        #[config(ParserConfig { max_content_length_str_len: Some(3), ..Default::default() })]
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 1000\r\n\r\n" => "INVALID_CONTENT_LENGTH";
    }
    error_code! {
        #[config(ParserConfig { allow_multiple_content_lengths: true, ..Default::default() })]
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n" => "CONFLICTING_CONTENT_LENGTH";
    }
}

#[test]
fn test_content_length_with_transfer_encoding_allowed() {
    let config = ParserConfig { allow_content_length_with_te: true, ..Default::default() };
    let msg = ok!(parse_with(
        b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
        config
    ));
    assert_eq!(msg.prepared.content_length, Some(5));
    assert!(msg.prepared.is_chunked());
}

#[test]
fn test_relaxed_config() {
    let config = ParserConfig { allow_obs_fold: true, ..Default::default() };
    let msg = ok!(parse_with(
        b"GET / HTTP/1.1\r\nHost: a\r\nX-Long: one\r\n \t two\r\n\tthree\r\n\r\n",
        config
    ));
    assert_eq!(msg.headers.first("x-long"), Some("one two three"));

    let config = ParserConfig { allow_bare_lf: true, ..Default::default() };
    let msg = ok!(parse_with(b"GET / HTTP/1.1\nHost: a\n\n", config.clone()));
    assert_eq!(msg.prepared.host.as_deref(), Some("a"));
    error_code! {
        #[config(config.clone())]
        b"GET / HTTP/1.1\nHost: a\n" => "MISSING_TERMINATOR";
        b"GET / HTTP/1.1\nHost: a\n\nX-Smuggled: 1\n\n" => "TRAILING_DATA";
        b"GET / HTTP/1.1\r\nHost: a\r\n\nX: 1\n\n" => "TRAILING_DATA";
    }

    let config = ParserConfig { allow_space_before_colon: true, ..Default::default() };
    let msg = ok!(parse_with(b"GET / HTTP/1.1\r\nHost \t: a\r\n\r\n", config));
    assert_eq!(msg.raw_headers[0].name.as_ref(), b"Host");

    let config = ParserConfig { allow_bare_cr_in_value: true, ..Default::default() };
    let msg = ok!(parse_with(b"GET / HTTP/1.1\r\nHost: a\r\nX: a\rb\r\n\r\n", config));
    assert_eq!(msg.raw_headers[1].value.as_ref(), b"a\rb");

    let config = ParserConfig { allow_missing_host: true, ..Default::default() };
    let msg = ok!(parse_with(b"GET / HTTP/1.1\r\n\r\n", config));
    assert_eq!(msg.prepared.host, None);

    let config = ParserConfig { allow_multiple_content_lengths: true, ..Default::default() };
    let msg = ok!(parse_with(
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\n",
        config
    ));
    assert_eq!(msg.prepared.content_length, Some(5));

    let config = ParserConfig { allow_te_without_chunked_in_response: true, ..Default::default() };
    let msg = ok!(parse_with(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n", config));
    assert_eq!(msg.prepared.transfer_encoding, Some(vec!["gzip".to_owned()]));
    assert!(!msg.prepared.is_chunked());

    let config = ParserConfig { allow_transfer_encoding_http10: true, ..Default::default() };
    let msg = ok!(parse_with(b"POST / HTTP/1.0\r\nTransfer-Encoding: chunked\r\n\r\n", config));
    assert!(msg.prepared.is_chunked());
}

#[test]
fn test_keep_alive() {
    let keep_alive = |input: &[u8]| ok!(parse(input)).prepared.keep_alive;

    assert!(keep_alive(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n"));
    assert!(!keep_alive(b"GET / HTTP/1.0\r\n\r\n"));
    assert!(keep_alive(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n"));
    assert!(!keep_alive(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: upgrade, close\r\n\r\n"));
}

#[test]
fn test_prepared_fields() {
    let msg = ok!(parse(
        b"POST /upload HTTP/1.1\r\n\
          Host: example.com:8080\r\n\
          Content-Type: Multipart/Form-Data; boundary=\"abc;def\"; charset=utf-8\r\n\
          TE: trailers, deflate;q=0.5\r\n\
          Upgrade: websocket, h2c\r\n\
          Trailer: X-Checksum, x-trace\r\n\
          Expect: 100-Continue\r\n\
          Date: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
          Cache-Control: no-cache, max-age=60, private=\"x-id\"\r\n\
          Accept-Encoding: gzip;q=0.8, br, identity;q=0\r\n\
          Authorization: Basic dXNlcjpwYXNz\r\n\
          Transfer-Encoding: gzip, chunked\r\n\
          \r\n"
    ));
    let p = &msg.prepared;

    assert_eq!(p.host.as_deref(), Some("example.com:8080"));

    let content_type = p.content_type.as_ref().unwrap();
    assert_eq!(content_type.media_type, "multipart/form-data");
    assert_eq!(content_type.params.get("boundary").map(String::as_str), Some("abc;def"));
    assert_eq!(content_type.charset(), Some("utf-8"));

    assert_eq!(p.te.as_deref(), Some(&["trailers".to_owned(), "deflate".to_owned()][..]));
    assert_eq!(p.upgrade.as_deref(), Some(&["websocket".to_owned(), "h2c".to_owned()][..]));

    let trailer = p.trailer.as_ref().unwrap();
    assert!(trailer.contains("x-checksum") && trailer.contains("x-trace"));

    assert!(p.expects_continue());
    assert_eq!(p.date.unwrap().unix_timestamp(), 784111777);

    let cache_control = p.cache_control.as_ref().unwrap();
    assert_eq!(cache_control.get("no-cache"), Some(&None));
    assert_eq!(cache_control.get("max-age"), Some(&Some("60".to_owned())));
    assert_eq!(cache_control.get("private"), Some(&Some("x-id".to_owned())));

    let accept_encoding = p.accept_encoding.as_ref().unwrap();
    assert_eq!(accept_encoding.len(), 3);
    assert_eq!((accept_encoding[0].coding.as_str(), accept_encoding[0].q), ("gzip", 0.8));
    assert_eq!((accept_encoding[1].coding.as_str(), accept_encoding[1].q), ("br", 1.0));
    assert_eq!((accept_encoding[2].coding.as_str(), accept_encoding[2].q), ("identity", 0.0));

    let authorization = p.authorization.as_ref().unwrap();
    assert_eq!(authorization.scheme, "Basic");
    assert_eq!(authorization.credentials, "dXNlcjpwYXNz");

    assert_eq!(p.transfer_encoding, Some(vec!["gzip".to_owned(), "chunked".to_owned()]));
    assert!(p.is_chunked());
    assert_eq!(p.content_length, None);
}

#[test]
fn test_idempotent() {
    let input = b"POST /a HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\nAccept: */*\r\n\r\n";
    let parser = Parser::default();
    let first = ok!(parser.parse(input, ParserMode::Request));
    let second = ok!(parser.parse(input, ParserMode::Request));
    assert_eq!(first, second);
}

#[test]
fn test_trailers() {
    let config = ParserConfig::default();

    let trailers = ok!(parse_trailers(b"\r\n", &config));
    assert!(trailers.raw_headers.is_empty());
    assert!(trailers.headers.is_empty());

    let trailers = ok!(parse_trailers(b"X-Checksum: abc\r\nX-Trace: 1\r\n\r\n", &config));
    assert_eq!(trailers.headers.first("x-checksum"), Some("abc"));
    assert_eq!(trailers.raw_headers.len(), 2);

    let err = parse_trailers(b"X-Trace: 1\r\nContent-Length: 5\r\n\r\n", &config).unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN_TRAILER_FIELD");
    assert_eq!(err.line(), 1);

    let err = parse_trailers(b"X: a\r\n", &config).unwrap_err();
    assert_eq!(err.code(), "MISSING_TERMINATOR");

    let err = parse_trailers(b"X a\r\n\r\n", &config).unwrap_err();
    assert_eq!(err.code(), "MISSING_COLON");
}

// ===== Properties =====

prop_compose! {
    fn request_line()
        (
            method in "[A-Za-z!#$%&'*+.^_`|~-]{1,12}",
            target in "/[A-Za-z0-9._~%/?=&-]{0,40}",
            version in prop_oneof![Just(Version::HTTP_10), Just(Version::HTTP_11)],
        )
        -> (String, String, Version)
    {
        (method, target, version)
    }
}

proptest! {
    #[test]
    fn prop_request_line_round_trip((method, target, version) in request_line()) {
        let input = format!("{method} {target} {version}\r\nHost: h\r\n\r\n");
        let msg = parse(input.as_bytes()).unwrap();
        let line = msg.request_line.unwrap();
        prop_assert_eq!(line.method, method);
        prop_assert_eq!(line.target.as_ref(), target.as_bytes());
        prop_assert_eq!(line.version, version);
    }

    #[test]
    fn prop_content_length_values(values in prop::collection::vec(0u64..4, 1..5)) {
        let mut input = b"POST / HTTP/1.1\r\nHost: h\r\n".to_vec();
        for value in &values {
            input.extend_from_slice(format!("Content-Length: {value}\r\n").as_bytes());
        }
        input.extend_from_slice(b"\r\n");

        let distinct = values.iter().any(|v| *v != values[0]);
        let strict = parse(&input);
        let lenient = parse_with(
            &input,
            ParserConfig { allow_multiple_content_lengths: true, ..Default::default() },
        );

        if distinct {
            prop_assert_eq!(strict.unwrap_err().code(), "CONFLICTING_CONTENT_LENGTH");
            prop_assert_eq!(lenient.unwrap_err().code(), "CONFLICTING_CONTENT_LENGTH");
        } else if values.len() > 1 {
            prop_assert_eq!(strict.unwrap_err().code(), "DUPLICATE_CONTENT_LENGTH");
            prop_assert_eq!(lenient.unwrap().prepared.content_length, Some(values[0]));
        } else {
            prop_assert_eq!(strict.unwrap().prepared.content_length, Some(values[0]));
        }
    }

    #[test]
    fn prop_request_transfer_encoding_must_end_chunked(
        codings in prop::collection::vec(
            prop_oneof![Just("gzip"), Just("deflate"), Just("compress"), Just("chunked")],
            1..4,
        ),
    ) {
        let input = format!(
            "POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: {}\r\n\r\n",
            codings.join(", "),
        );
        let result = parse(input.as_bytes());
        let chunked = codings.iter().filter(|c| **c == "chunked").count();

        if codings.last() != Some(&"chunked") {
            prop_assert_eq!(result.unwrap_err().code(), "TE_WITHOUT_CHUNKED_LAST");
        } else if chunked > 1 {
            prop_assert_eq!(result.unwrap_err().code(), "INVALID_TRANSFER_ENCODING");
        } else {
            prop_assert!(result.unwrap().prepared.is_chunked());
        }
    }
}
