//! Fan-in of independently failing sub-operations

use std::fmt;

/// Successes kept, failures collected with a label for logging
#[derive(Debug)]
pub struct Partial<T, E> {
    pub items: Vec<T>,
    pub errors: Vec<(String, E)>,
}

impl<T, E> Default for Partial<T, E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T, E: fmt::Display> Partial<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, result: Result<T, E>) {
        match result {
            Ok(item) => self.items.push(item),
            Err(err) => self.errors.push((label.into(), err)),
        }
    }

    /// Emit one warning per failure
    pub fn log_errors(&self, context: &str) {
        for (label, err) in &self.errors {
            tracing::warn!(context, subject = %label, error = %err, "partial failure, continuing without it");
        }
    }

    /// Log failures and keep the successes
    pub fn into_items(self, context: &str) -> Vec<T> {
        self.log_errors(context);
        self.items
    }
}

impl<T, E, L> Extend<(L, Result<T, E>)> for Partial<T, E>
where
    E: fmt::Display,
    L: Into<String>,
{
    fn extend<I: IntoIterator<Item = (L, Result<T, E>)>>(&mut self, iter: I) {
        for (label, result) in iter {
            self.push(label, result);
        }
    }
}

impl<T, E, L> FromIterator<(L, Result<T, E>)> for Partial<T, E>
where
    E: fmt::Display,
    L: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (L, Result<T, E>)>>(iter: I) -> Self {
        let mut partial = Self::new();
        partial.extend(iter);
        partial
    }
}
