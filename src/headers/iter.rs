use std::borrow::Cow;
use std::slice;

use super::NO_COMBINE;
use super::map::Entry;

/// Iterator returned by [`Headers::iter`].
///
/// [`Headers::iter`]: super::Headers::iter
#[derive(Debug)]
pub struct Iter<'a> {
    entries: slice::Iter<'a, Entry>,
    split: Option<(&'a str, slice::Iter<'a, String>)>,
}

impl<'a> Iter<'a> {
    pub(super) fn new(entries: &'a [Entry]) -> Self {
        Self { entries: entries.iter(), split: None }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, Cow<'a, str>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((name, values)) = &mut self.split {
                if let Some(value) = values.next() {
                    return Some((*name, Cow::Borrowed(value.as_str())));
                }
                self.split = None;
            }

            let entry = self.entries.next()?;

            if NO_COMBINE.contains(&entry.name.as_str()) {
                self.split = Some((entry.name.as_str(), entry.values.iter()));
                continue;
            }

            let value = match &entry.values[..] {
                [one] => Cow::Borrowed(one.as_str()),
                many => Cow::Owned(many.join(", ")),
            };
            return Some((entry.name.as_str(), value));
        }
    }
}
