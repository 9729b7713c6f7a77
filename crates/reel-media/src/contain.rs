//! Continue-on-error combinators for per-item stage work.
//!
//! Stage steps that may fail for a single item (one effect, one overlay)
//! return `Result`; these helpers fold them so that a failing item is
//! reported and skipped while the rest of the stage proceeds. Fatal errors
//! never go through here.

/// A stage result together with the per-item errors that were contained.
#[derive(Debug, Clone, PartialEq)]
pub struct Contained<T> {
    pub value: T,
    pub errors: Vec<String>,
}

impl<T> Contained<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Fold `items` over `init`. When `step` fails for an item, the accumulator
/// from before that item is carried forward and the error is recorded.
pub fn fold_continue<T, I, E, F>(init: T, items: impl IntoIterator<Item = I>, mut step: F) -> Contained<T>
where
    E: std::fmt::Display,
    F: FnMut(&T, &I) -> Result<T, E>,
{
    let mut errors = Vec::new();
    let value = items.into_iter().fold(init, |acc, item| match step(&acc, &item) {
        Ok(next) => next,
        Err(e) => {
            errors.push(e.to_string());
            acc
        }
    });
    Contained { value, errors }
}

/// Map `items`, dropping the ones whose `step` fails and recording why.
pub fn collect_continue<T, I, E, F>(items: impl IntoIterator<Item = I>, mut step: F) -> Contained<Vec<T>>
where
    E: std::fmt::Display,
    F: FnMut(I) -> Result<T, E>,
{
    let mut errors = Vec::new();
    let value = items
        .into_iter()
        .filter_map(|item| match step(item) {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        })
        .collect();
    Contained { value, errors }
}
