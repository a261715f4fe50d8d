//! Backend-agnostic query vocabulary: equality filters and projections.

/// Ordered conjunction of `field == value` conditions.
///
/// Setting a field twice keeps its original position and replaces the
/// value. An empty filter matches every record.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<V> {
    pairs: Vec<(String, V)>,
}

impl<V> Default for Filter<V> {
    fn default() -> Self {
        Self { pairs: Vec::new() }
    }
}

impl<V> Filter<V> {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter with one condition.
    pub fn by(field: impl Into<String>, value: impl Into<V>) -> Self {
        Self::new().eq(field, value)
    }

    /// Adds (or replaces) one condition.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<V>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((field, value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.pairs.iter().any(|(name, _)| name == field)
    }

    pub fn value(&self, field: &str) -> Option<&V> {
        self.pairs
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.pairs.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Renders each condition as `(field, value)` strings for diagnostics.
    pub fn describe(&self, render: impl Fn(&V) -> String) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .map(|(name, value)| (name.clone(), render(value)))
            .collect()
    }
}

impl<V, K: Into<String>> FromIterator<(K, V)> for Filter<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |filter, (field, value)| filter.eq(field, value))
    }
}

/// Ordered list of fields a query should return.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    pub fn of<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}
