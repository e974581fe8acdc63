use crate::headers::{Headers, NoCombineError, latin1_decode, latin1_encode};

const fn is_send_sync<T: Send + Sync>() { }
const _: () = {
    is_send_sync::<Headers>();
    is_send_sync::<NoCombineError>();
};

#[test]
fn headers_combine() {
    let mut map = Headers::new();

    map.append("Accept", "text/html");
    map.append("content-type", "text/plain");
    map.append("ACCEPT", "application/json");

    assert_eq!(map.len(), 2);
    assert!(map.contains("accept"));
    assert!(map.contains("Content-Type"));
    assert!(!map.contains("host"));

    assert_eq!(map.get("accept"), Ok(Some("text/html, application/json".to_owned())));
    assert_eq!(map.get("content-type"), Ok(Some("text/plain".to_owned())));
    assert_eq!(map.get("host"), Ok(None));
    assert_eq!(map.get_all("Accept"), ["text/html", "application/json"]);
    assert_eq!(map.first("accept"), Some("text/html"));
    assert!(map.get_all("host").is_empty());

    assert_eq!(map.names().collect::<Vec<_>>(), ["accept", "content-type"]);
}

#[test]
fn headers_set_cookie() {
    let mut map = Headers::new();

    map.append("Set-Cookie", "a=1");
    map.append("x-id", "7");
    map.append("set-cookie", "b=2");

    let err = map.get("set-cookie").unwrap_err();
    assert_eq!(err.name(), "set-cookie");
    assert_eq!(map.get_all("set-cookie"), ["a=1", "b=2"]);

    let items = map.iter().map(|(k, v)| (k, v.into_owned())).collect::<Vec<_>>();
    assert_eq!(
        items,
        [
            ("set-cookie", "a=1".to_owned()),
            ("set-cookie", "b=2".to_owned()),
            ("x-id", "7".to_owned()),
        ]
    );
}

#[test]
fn headers_equality() {
    let mut a = Headers::new();
    let mut b = Headers::new();
    a.append("Host", "example.com");
    b.append("host", "example.com");
    assert_eq!(a, b);
    b.append("host", "other");
    assert_ne!(a, b);
}

#[test]
fn latin1() {
    assert_eq!(latin1_decode(b"caf\xe9"), "café");
    assert_eq!(latin1_encode("café"), b"caf\xe9");
    assert_eq!(latin1_encode("€"), b"?");
}
