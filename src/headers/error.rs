/// Error when reading a multi valued field that must not be combined as a single value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoCombineError {
    name: String,
}

impl NoCombineError {
    pub(crate) fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }

    /// Returns the offending field name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::error::Error for NoCombineError {}

impl std::fmt::Display for NoCombineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "header `{}` cannot be combined into a single value", self.name)
    }
}
