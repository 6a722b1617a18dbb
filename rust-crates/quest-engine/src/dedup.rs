use std::{
    collections::HashSet,
    hash::Hash,
};

/// A record with an identity key. Two records with equal keys are two
/// observations of the same logical record.
pub trait Keyed {
    type Key: Eq + Hash;

    fn key(&self) -> Self::Key;
}

/// Merge `incoming` in front of `existing` and keep the first occurrence of
/// every key.
///
/// Callers always pass the newest observations as `incoming`, so the first
/// occurrence is the most recently observed one. Order of the survivors is
/// not meaningful.
pub fn deduplicate<T>(incoming: Vec<T>, existing: &[T]) -> Vec<T>
where
    T: Keyed + Clone,
{
    let mut seen = HashSet::with_capacity(incoming.len() + existing.len());
    let mut merged = Vec::with_capacity(incoming.len() + existing.len());
    for record in incoming.into_iter().chain(existing.iter().cloned()) {
        if seen.insert(record.key()) {
            merged.push(record);
        }
    }
    merged
}
