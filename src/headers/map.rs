use super::{Iter, NO_COMBINE, NoCombineError};

/// Case-insensitive HTTP header multimap.
///
/// Names are stored lowercased, each occurrence of a field keeps its own value. Distinct names
/// iterate in insertion order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Entry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Entry {
    pub(super) name: String,
    pub(super) values: Vec<String>,
}

impl Headers {
    /// Create new empty [`Headers`].
    #[inline]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Returns the number of distinct field names.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there is no field.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Append a value, the name is lowercased.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.name.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.values.push(value),
            None => self.entries.push(Entry {
                name: name.to_ascii_lowercase(),
                values: vec![value],
            }),
        }
    }

    /// Returns `true` if the map contains the given field.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Returns the field as a single value, multiple occurrences joined with `", "`.
    ///
    /// # Errors
    ///
    /// Fields that cannot be combined, i.e. `set-cookie`, always return [`NoCombineError`].
    pub fn get(&self, name: &str) -> Result<Option<String>, NoCombineError> {
        let Some(entry) = self.entry(name) else {
            return Ok(None);
        };
        if NO_COMBINE.contains(&entry.name.as_str()) {
            return Err(NoCombineError::new(&entry.name));
        }
        Ok(Some(entry.values.join(", ")))
    }

    /// Returns every individual value of the field.
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.entry(name) {
            Some(entry) => &entry.values,
            None => &[],
        }
    }

    /// Returns the first value of the field.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.entry(name).and_then(|e| e.values.first()).map(String::as_str)
    }

    /// Returns lowercased field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Iterate fields as `(name, value)`.
    ///
    /// Values of combinable fields are joined, fields that cannot be combined yield every value
    /// separately.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(&self.entries)
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = <Iter<'a> as Iterator>::Item;

    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for Headers {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
