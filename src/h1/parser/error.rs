use std::fmt;

macro_rules! error_codes {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$doc:meta])*
                $variant:ident => $code:literal,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                $(#[$doc])*
                $variant,
            )*
        }

        impl $name {
            /// Returns the machine readable error code, e.g: `MISSING_COLON`.
            pub const fn code(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant => $code,
                    )*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.code())
            }
        }

        impl From<$name> for ErrorKind {
            #[inline]
            fn from(value: $name) -> Self {
                ErrorKind::$name(value)
            }
        }
    };
}

error_codes! {
    /// Errors in the request line or status line.
    pub enum StartLineError {
        MalformedRequestLine => "MALFORMED_REQUEST_LINE",
        MalformedStatusLine => "MALFORMED_STATUS_LINE",
        UnsupportedHttpVersion => "UNSUPPORTED_HTTP_VERSION",
        InvalidMethod => "INVALID_METHOD",
        InvalidRequestTarget => "INVALID_REQUEST_TARGET",
        InvalidStatusCode => "INVALID_STATUS_CODE",
    }
}

error_codes! {
    /// Errors in header field syntax.
    pub enum HeaderFieldError {
        InvalidFieldName => "INVALID_FIELD_NAME",
        /// Also reported for lines exceeding the configured maximum length.
        InvalidFieldValue => "INVALID_FIELD_VALUE",
        ObsFoldNotAllowed => "OBS_FOLD_NOT_ALLOWED",
        SpaceBeforeColon => "SPACE_BEFORE_COLON",
        MissingColon => "MISSING_COLON",
        BareCarriageReturn => "BARE_CARRIAGE_RETURN",
        BareLf => "BARE_LF",
        NulInHeader => "NUL_IN_HEADER",
        MissingTerminator => "MISSING_TERMINATOR",
        TrailingData => "TRAILING_DATA",
        TooManyHeaders => "TOO_MANY_HEADERS",
        EmptyFieldName => "EMPTY_FIELD_NAME",
    }
}

error_codes! {
    /// Errors in header semantics and cross-field validation.
    pub enum SemanticError {
        DuplicateContentLength => "DUPLICATE_CONTENT_LENGTH",
        ConflictingContentLength => "CONFLICTING_CONTENT_LENGTH",
        ContentLengthWithTransferEncoding => "CONTENT_LENGTH_WITH_TRANSFER_ENCODING",
        MissingHostHeader => "MISSING_HOST_HEADER",
        MultipleHostHeaders => "MULTIPLE_HOST_HEADERS",
        ConflictingHostHeaders => "CONFLICTING_HOST_HEADERS",
        InvalidContentLength => "INVALID_CONTENT_LENGTH",
        InvalidTransferEncoding => "INVALID_TRANSFER_ENCODING",
        InvalidContentType => "INVALID_CONTENT_TYPE",
        ForbiddenTrailerField => "FORBIDDEN_TRAILER_FIELD",
        InvalidHost => "INVALID_HOST",
        InvalidExpect => "INVALID_EXPECT",
        InvalidDate => "INVALID_DATE",
        InvalidCacheControl => "INVALID_CACHE_CONTROL",
        InvalidAcceptEncoding => "INVALID_ACCEPT_ENCODING",
        InvalidAccept => "INVALID_ACCEPT",
        InvalidAuthorization => "INVALID_AUTHORIZATION",
        TeWithoutChunkedLast => "TE_WITHOUT_CHUNKED_LAST",
        TeInHttp10 => "TE_IN_HTTP10",
    }
}

error_codes! {
    /// Errors in character encoding within headers.
    pub enum EncodingError {
        NonAsciiInFieldName => "NON_ASCII_IN_FIELD_NAME",
        ObsTextInFieldValue => "OBS_TEXT_IN_FIELD_VALUE",
    }
}

/// Error family and code of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StartLineError(StartLineError),
    HeaderFieldError(HeaderFieldError),
    SemanticError(SemanticError),
    EncodingError(EncodingError),
}

impl ErrorKind {
    /// Returns the machine readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StartLineError(e) => e.code(),
            Self::HeaderFieldError(e) => e.code(),
            Self::SemanticError(e) => e.code(),
            Self::EncodingError(e) => e.code(),
        }
    }
}

/// HTTP message head parsing error.
///
/// Carries the error code, a human readable message, and the zero based line number and byte
/// offset where the error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ErrorKind,
    message: String,
    line: usize,
    offset: usize,
    length_exceeded: bool,
}

impl ParseError {
    pub(crate) fn new(
        kind: impl Into<ErrorKind>,
        message: impl Into<String>,
        line: usize,
        offset: usize,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line,
            offset,
            length_exceeded: false,
        }
    }

    /// Mark the error as caused by a configured length limit.
    pub(crate) fn with_length_exceeded(mut self) -> Self {
        self.length_exceeded = true;
        self
    }

    /// Semantic errors are not tied to a location.
    pub(crate) fn semantic(code: SemanticError, message: impl Into<String>) -> Self {
        Self::new(code, message, 0, 0)
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` if a line exceeded `max_header_length`, the code is still
    /// `INVALID_FIELD_VALUE`.
    #[inline]
    pub fn is_length_exceeded(&self) -> bool {
        self.length_exceeded
    }
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] line {}, offset {}: {}",
            self.code(),
            self.line,
            self.offset,
            self.message
        )
    }
}
