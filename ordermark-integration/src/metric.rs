use serde::Serialize;

/// Measurement of one Http request, eg/ its round trip duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    /// Metric name.
    pub name: &'static str,

    /// Milliseconds since the Unix epoch.
    pub time: u64,

    /// Key-Value pairs to categorise the Metric.
    pub tags: Vec<Tag>,

    /// Observed measurements.
    pub fields: Vec<Field>,
}

impl Metric {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    pub fn field(&self, key: &str) -> Option<u64> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value)
    }
}

#[derive(Debug, Clone, Serialize, Ord, PartialOrd, Eq, PartialEq)]
pub struct Tag {
    pub key: &'static str,
    pub value: String,
}

impl Tag {
    pub fn new<S>(key: &'static str, value: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// Integer measurement, eg/ a duration in milliseconds.
#[derive(Debug, Copy, Clone, Serialize, Ord, PartialOrd, Eq, PartialEq)]
pub struct Field {
    pub key: &'static str,
    pub value: u64,
}

impl Field {
    pub fn new(key: &'static str, value: u64) -> Self {
        Self { key, value }
    }
}
