use super::{HeaderFieldError, ParseError, ParserConfig};

/// State of a single parse call.
pub(super) struct Context<'a> {
    pub(super) data: &'a [u8],
    pub(super) config: &'a ParserConfig,
    /// Zero based logical line, `0` is the start line.
    pub(super) line: usize,
}

impl<'a> Context<'a> {
    pub(super) fn new(data: &'a [u8], config: &'a ParserConfig) -> Self {
        Self { data, config, line: 0 }
    }

    pub(super) fn error(&self, code: HeaderFieldError, message: impl Into<String>, offset: usize) -> ParseError {
        ParseError::new(code, message, self.line, offset)
    }

    /// The first CRLFCRLF must be the end of the block.
    pub(super) fn verify_terminator(&self) -> Result<(), ParseError> {
        let data = self.data;

        if let Some(idx) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let after = idx + 4;
            if after < data.len() {
                return Err(self.error(
                    HeaderFieldError::TrailingData,
                    format!("unexpected {} byte(s) after header terminator", data.len() - after),
                    after,
                ));
            }
            return Ok(());
        }

        if self.config.allow_bare_lf {
            if data.ends_with(b"\n\n") {
                return Ok(());
            }
            return Err(self.error(
                HeaderFieldError::MissingTerminator,
                "header block does not end with LFLF",
                data.len(),
            ));
        }

        Err(self.error(
            HeaderFieldError::MissingTerminator,
            "header block does not end with CRLFCRLF",
            data.len(),
        ))
    }

    /// Returns the index of the first byte of the line terminator starting the scan at `start`.
    ///
    /// NUL is always fatal, bare CR is skipped only when allowed in values.
    pub(super) fn find_line_end(&self, start: usize) -> Result<usize, ParseError> {
        let data = self.data;
        let mut pos = start;

        while let Some(found) = data[pos..].iter().position(|b| matches!(b, 0 | b'\r' | b'\n')) {
            let at = pos + found;
            match data[at] {
                0 => return Err(self.error(HeaderFieldError::NulInHeader, "NUL byte in header data", at)),
                b'\r' => {
                    if data.get(at + 1) == Some(&b'\n') {
                        return Ok(at);
                    }
                    if !self.config.allow_bare_cr_in_value {
                        return Err(self.error(
                            HeaderFieldError::BareCarriageReturn,
                            "bare CR not followed by LF",
                            at,
                        ));
                    }
                    pos = at + 1;
                }
                _ => {
                    if self.config.allow_bare_lf {
                        return Ok(at);
                    }
                    return Err(self.error(
                        HeaderFieldError::BareLf,
                        "bare LF without preceding CR",
                        at,
                    ));
                }
            }
        }

        Err(self.error(
            HeaderFieldError::MissingTerminator,
            "unexpected end of data while scanning for line ending",
            data.len(),
        ))
    }

    /// Length of the terminator at `pos`, `1` for bare LF, `2` for CRLF.
    pub(super) fn line_ending_len(&self, pos: usize) -> usize {
        match self.data.get(pos) {
            Some(b'\n') => 1,
            _ => 2,
        }
    }
}
