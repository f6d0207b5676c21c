use smol_str::SmolStr;
use url::Url;

/// Outcome of [`LocationTracker::observe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LocationChange {
    Unchanged,
    /// The page changed: origin, path or any non-pagination part of the location differs.
    Navigated,
    /// Only pagination query parameters changed.
    Paginated,
}

/// Remembers the last observed location and classifies changes to it.
///
/// Used by the location poll, which catches frameworks that mutate history without emitting
/// any navigation event.
#[derive(Debug, Clone)]
pub struct LocationTracker {
    last: Url,
    pagination_params: Vec<SmolStr>,
}

impl LocationTracker {
    pub fn new(location: Url, pagination_params: Vec<SmolStr>) -> Self {
        Self {
            last: location,
            pagination_params,
        }
    }

    pub fn current(&self) -> &Url {
        &self.last
    }

    /// Classify `location` against the last observed location, and remember it.
    pub fn observe(&mut self, location: Url) -> LocationChange {
        if location == self.last {
            return LocationChange::Unchanged;
        }

        let change = if self.without_pagination(&location) == self.without_pagination(&self.last) {
            LocationChange::Paginated
        } else {
            LocationChange::Navigated
        };

        self.last = location;
        change
    }

    fn without_pagination(&self, location: &Url) -> Url {
        let mut stripped = location.clone();
        let retained: Vec<(String, String)> = location
            .query_pairs()
            .filter(|(key, _)| {
                !self
                    .pagination_params
                    .iter()
                    .any(|param| param.as_str() == key.as_ref())
            })
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if retained.is_empty() {
            stripped.set_query(None);
        } else {
            stripped.query_pairs_mut().clear().extend_pairs(retained);
        }
        stripped
    }
}
