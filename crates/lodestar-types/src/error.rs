//! Composite error carrying an ordered list of underlying failures.

/// An ordered collection of failures from a batch operation.
///
/// Batches capture per-item errors instead of aborting, then surface them
/// all at once. Displays as a count line followed by one tab-indented
/// entry per failure:
///
/// ```text
/// 2 errors occurred:
///     * error test
///     * error test-2
/// ```
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<String>,
}

impl AggregateError {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture one failure, preserving insertion order.
    pub fn push(&mut self, err: impl std::fmt::Display) {
        self.errors.push(err.to_string());
    }

    /// Absorb every failure from another aggregate.
    pub fn extend(&mut self, other: AggregateError) {
        self.errors.extend(other.errors);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The captured failure messages, in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.errors
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one failure was captured.
    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} errors occurred:", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i + 1 == self.errors.len() {
                write!(f, "\t* {err}")?;
            } else {
                writeln!(f, "\t* {err}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl<E: std::fmt::Display> FromIterator<E> for AggregateError {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().map(|e| e.to_string()).collect(),
        }
    }
}
