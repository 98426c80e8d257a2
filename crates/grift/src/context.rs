use indexmap::IndexMap;

use crate::config::TransactionConfig;

/// Results accumulated by a transaction, as seen by actions and compensations.
///
/// Step results are keyed by tag in first-success order; a later success under
/// the same tag replaces the value in place. Seeded values live apart from step
/// results, so no step can overwrite them.
///
/// With context injection on, enumeration ([`iter`](Self::iter),
/// [`len`](Self::len), `for (tag, value) in &ctx`) skips tags starting with
/// the reserved prefix. Lookups by tag through [`get`](Self::get) still see them.
#[derive(Debug, Clone)]
pub struct Context<T> {
    results: IndexMap<String, T>,
    seeds: IndexMap<String, T>,
    last_tag: Option<String>,
    expose_previous: bool,
    hidden_prefix: Option<String>,
}

impl<T> Context<T> {
    pub(crate) fn new(config: &TransactionConfig) -> Self {
        Self {
            results: IndexMap::new(),
            seeds: IndexMap::new(),
            last_tag: None,
            expose_previous: config.inject_context(),
            hidden_prefix: config
                .inject_context()
                .then(|| config.reserved_prefix().to_string()),
        }
    }

    pub(crate) fn with_seeds<K, I>(config: &TransactionConfig, seeds: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        let mut context = Self::new(config);
        context.seeds = seeds.into_iter().map(|(k, v)| (k.into(), v)).collect();
        context
    }

    /// Result of the step tagged `tag`, if it succeeded.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&T> {
        self.results.get(tag)
    }

    /// Whether a step tagged `tag` has succeeded.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.results.contains_key(tag)
    }

    /// Value seeded under `name` at construction. `name` is given without the
    /// reserved prefix.
    #[must_use]
    pub fn seed(&self, name: &str) -> Option<&T> {
        self.seeds.get(name)
    }

    /// Raw result of the most recent successful step.
    ///
    /// Always `None` unless the transaction injects context.
    #[must_use]
    pub fn previous(&self) -> Option<&T> {
        if !self.expose_previous {
            return None;
        }
        self.last_tag
            .as_deref()
            .and_then(|tag| self.results.get(tag))
    }

    /// Visible step results in first-success order.
    pub fn iter(&self) -> ContextIter<'_, T> {
        ContextIter {
            inner: self.results.iter(),
            hidden_prefix: self.hidden_prefix.as_deref(),
        }
    }

    /// Seeded values in insertion order, keyed without the reserved prefix.
    pub fn seeds(&self) -> impl Iterator<Item = (&str, &T)> {
        self.seeds.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of visible step results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no visible step result is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub(crate) fn record(&mut self, tag: &str, value: T) {
        self.results.insert(tag.to_string(), value);
        self.last_tag = Some(tag.to_string());
    }

    pub(crate) fn into_results(self) -> IndexMap<String, T> {
        self.results
    }

    pub(crate) fn clear(&mut self) {
        self.results.clear();
        self.seeds.clear();
        self.last_tag = None;
    }
}

/// Iterator over the visible step results of a [`Context`].
#[derive(Debug, Clone)]
pub struct ContextIter<'a, T> {
    inner: indexmap::map::Iter<'a, String, T>,
    hidden_prefix: Option<&'a str>,
}

impl<'a, T> Iterator for ContextIter<'a, T> {
    type Item = (&'a str, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let hidden_prefix = self.hidden_prefix;
        self.inner
            .by_ref()
            .map(|(tag, value)| (tag.as_str(), value))
            .find(|(tag, _)| hidden_prefix.is_none_or(|prefix| !tag.starts_with(prefix)))
    }
}

impl<'a, T> IntoIterator for &'a Context<T> {
    type Item = (&'a str, &'a T);
    type IntoIter = ContextIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
