use std::num::NonZeroU16;

/// HTTP [Status Code][rfc].
///
/// Any three digit code can be represented, only registered codes carry a reason phrase.
///
/// [rfc]: <https://datatracker.ietf.org/doc/html/rfc9110#name-status-codes>
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(NonZeroU16);

impl Default for StatusCode {
    #[inline]
    fn default() -> Self {
        Self::OK
    }
}

impl StatusCode {
    /// Create status code from integer, returns `None` if it is not a three digit code.
    #[inline]
    pub const fn from_u16(code: u16) -> Option<StatusCode> {
        match code {
            100..=999 => match NonZeroU16::new(code) {
                Some(code) => Some(StatusCode(code)),
                None => None,
            },
            _ => None,
        }
    }

    /// Returns status code value, e.g: `200`.
    #[inline]
    pub const fn as_u16(&self) -> u16 {
        self.0.get()
    }

    /// Returns reason phrase, or an empty string for unregistered codes.
    #[inline]
    pub const fn reason(&self) -> &'static str {
        match self.lookup() {
            Some((reason, _)) => reason,
            None => "",
        }
    }

    /// Returns the long description used in error pages.
    #[inline]
    pub const fn explain(&self) -> &'static str {
        match self.lookup() {
            Some((_, explain)) => explain,
            None => "",
        }
    }

    /// Returns `true` if responses with this status never carry content.
    #[inline]
    pub const fn is_bodiless(&self) -> bool {
        matches!(self.0.get(), 100..=199 | 204 | 205 | 304)
    }
}

macro_rules! status_code {
    (
        $(
            $int:literal $id:ident $msg:literal $explain:literal;
        )*
    ) => {
        impl StatusCode {
            const fn lookup(&self) -> Option<(&'static str, &'static str)> {
                match self.0.get() {
                    $(
                        $int => Some(($msg, $explain)),
                    )*
                    _ => None,
                }
            }

            $(
                #[doc = concat!("`", stringify!($int), " ", $msg, "`")]
                pub const $id: Self = Self(NonZeroU16::new($int).unwrap());
            )*
        }
    };
}

status_code! {
    100 CONTINUE "Continue" "Request received, please continue";
    101 SWITCHING_PROTOCOLS "Switching Protocols" "Switching to new protocol; obey Upgrade header";
    200 OK "OK" "Request fulfilled, document follows";
    201 CREATED "Created" "Document created, URL follows";
    202 ACCEPTED "Accepted" "Request accepted, processing continues off-line";
    204 NO_CONTENT "No Content" "Request fulfilled, nothing follows";
    205 RESET_CONTENT "Reset Content" "Clear input form for further input";
    206 PARTIAL_CONTENT "Partial Content" "Partial content follows";
    301 MOVED_PERMANENTLY "Moved Permanently" "Object moved permanently -- see URI list";
    302 FOUND "Found" "Object moved temporarily -- see URI list";
    303 SEE_OTHER "See Other" "Object moved -- see Method and URL list";
    304 NOT_MODIFIED "Not Modified" "Document has not changed since given time";
    307 TEMPORARY_REDIRECT "Temporary Redirect" "Object moved temporarily -- see URI list";
    308 PERMANENT_REDIRECT "Permanent Redirect" "Object moved permanently -- see URI list";
    400 BAD_REQUEST "Bad Request" "Bad request syntax or unsupported method";
    401 UNAUTHORIZED "Unauthorized" "No permission -- see authorization schemes";
    403 FORBIDDEN "Forbidden" "Request forbidden -- authorization will not help";
    404 NOT_FOUND "Not Found" "Nothing matches the given URI";
    405 METHOD_NOT_ALLOWED "Method Not Allowed" "Specified method is invalid for this resource";
    406 NOT_ACCEPTABLE "Not Acceptable" "URI not available in preferred format";
    408 REQUEST_TIMEOUT "Request Timeout" "Request timed out; try again later";
    409 CONFLICT "Conflict" "Request conflict";
    411 LENGTH_REQUIRED "Length Required" "Client must specify Content-Length";
    412 PRECONDITION_FAILED "Precondition Failed" "Precondition in headers is false";
    413 CONTENT_TOO_LARGE "Content Too Large" "Content is too large";
    414 URI_TOO_LONG "URI Too Long" "URI is too long";
    415 UNSUPPORTED_MEDIA_TYPE "Unsupported Media Type" "Entity body in unsupported format";
    417 EXPECTATION_FAILED "Expectation Failed" "Expect condition could not be satisfied";
    429 TOO_MANY_REQUESTS "Too Many Requests" "The user has sent too many requests in a given amount of time (\"rate limiting\")";
    431 REQUEST_HEADER_FIELDS_TOO_LARGE "Request Header Fields Too Large" "The server is unwilling to process the request because its header fields are too large";
    500 INTERNAL_SERVER_ERROR "Internal Server Error" "Server got itself in trouble";
    501 NOT_IMPLEMENTED "Not Implemented" "Server does not support this operation";
    502 BAD_GATEWAY "Bad Gateway" "Invalid responses from another server/proxy";
    503 SERVICE_UNAVAILABLE "Service Unavailable" "The server cannot process the request due to a high load";
    504 GATEWAY_TIMEOUT "Gateway Timeout" "The gateway server did not receive a timely response";
    505 HTTP_VERSION_NOT_SUPPORTED "HTTP Version Not Supported" "Cannot fulfill request";
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

impl std::fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("StatusCode").field(&self.as_u16()).finish()
    }
}
