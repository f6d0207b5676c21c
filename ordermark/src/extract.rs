use crate::{OrderId, dom::Element};

/// Characters an extracted identifier may consist of.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Charset {
    Digits,
    Alphanumeric,
    /// Any non-whitespace character.
    Token,
}

impl Charset {
    fn accepts(&self, value: &str) -> bool {
        match self {
            Charset::Digits => value.chars().all(|next| next.is_ascii_digit()),
            Charset::Alphanumeric => value.chars().all(|next| next.is_ascii_alphanumeric()),
            Charset::Token => !value.chars().any(char::is_whitespace),
        }
    }
}

/// Sanity check rejecting accidental short or malformed matches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IdRule {
    pub min_len: usize,
    pub charset: Charset,
}

impl IdRule {
    pub const ANY: Self = Self {
        min_len: 1,
        charset: Charset::Token,
    };

    pub fn accepts(&self, value: &str) -> bool {
        value.chars().count() >= self.min_len && self.charset.accepts(value)
    }
}

/// How a candidate value is read from a located element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IdSource {
    /// Trimmed text content.
    Text,
    /// Value of the named attribute.
    Attribute(&'static str),
    /// Value of the named query parameter of the `href` attribute.
    HrefParam(&'static str),
    /// First run of at least `min_digits` ASCII digits within the text content.
    DigitRun { min_digits: usize },
    /// Trimmed text content consisting of `prefix` followed by at least `min_digits` digits.
    PrefixedDigits { prefix: char, min_digits: usize },
}

/// One identifier extraction strategy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IdStrategy {
    /// Selector of candidate elements within the row.
    pub selector: &'static str,
    /// Only consider the n-th candidate (zero based), rather than every candidate in order.
    pub nth: Option<usize>,
    pub source: IdSource,
    pub rule: IdRule,
}

impl IdStrategy {
    pub fn new(selector: &'static str, source: IdSource) -> Self {
        Self {
            selector,
            nth: None,
            source,
            rule: IdRule::ANY,
        }
    }

    pub fn nth(self, nth: usize) -> Self {
        Self {
            nth: Some(nth),
            ..self
        }
    }

    pub fn rule(self, min_len: usize, charset: Charset) -> Self {
        Self {
            rule: IdRule { min_len, charset },
            ..self
        }
    }

    fn extract<E>(&self, row: &E) -> Option<String>
    where
        E: Element,
    {
        let candidates = row.select_all(self.selector);
        let candidates = match self.nth {
            Some(nth) => candidates.into_iter().skip(nth).take(1).collect(),
            None => candidates,
        };

        candidates
            .iter()
            .filter_map(|element| self.read(element))
            .find(|value| self.rule.accepts(value))
    }

    fn read<E>(&self, element: &E) -> Option<String>
    where
        E: Element,
    {
        match self.source {
            IdSource::Text => Some(element.text().trim().to_string()),
            IdSource::Attribute(name) => element.attribute(name).map(|value| value.trim().to_string()),
            IdSource::HrefParam(param) => element
                .attribute("href")
                .and_then(|href| href_param(&href, param)),
            IdSource::DigitRun { min_digits } => digit_run(&element.text(), min_digits),
            IdSource::PrefixedDigits { prefix, min_digits } => {
                let text = element.text();
                let text = text.trim();
                let digits = text.strip_prefix(prefix)?;
                (digits.len() >= min_digits && digits.chars().all(|next| next.is_ascii_digit()))
                    .then(|| text.to_string())
            }
        }
    }
}

/// Maps a row to its [`OrderId`] using an ordered list of fallback [`IdStrategy`]s.
///
/// Pure: never mutates the row, and yields `None` for rows that are not order rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowExtractor {
    strategies: Vec<IdStrategy>,
}

impl RowExtractor {
    pub fn new<I>(strategies: I) -> Self
    where
        I: IntoIterator<Item = IdStrategy>,
    {
        Self {
            strategies: strategies.into_iter().collect(),
        }
    }

    pub fn extract<E>(&self, row: &E) -> Option<OrderId>
    where
        E: Element,
    {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.extract(row))
            .map(OrderId::new)
    }
}

/// First maximal run of ASCII digits at least `min_digits` long.
pub fn digit_run(text: &str, min_digits: usize) -> Option<String> {
    text.split(|next: char| !next.is_ascii_digit())
        .find(|run| !run.is_empty() && run.len() >= min_digits)
        .map(str::to_string)
}

/// Value of the query parameter `name` in a (possibly relative) `href`.
pub fn href_param(href: &str, name: &str) -> Option<String> {
    let query = href.split_once('?')?.1;
    let query = query.split_once('#').map_or(query, |(query, _)| query);

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
