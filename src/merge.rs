//! Helpers for completing a partially translated batch.

/// Positions with no translation yet
pub fn missing_indices(partial: &[Option<String>]) -> Vec<usize> {
    partial
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_none())
        .map(|(i, _)| i)
        .collect()
}

/// Source texts at `indices`, in that order
pub fn extract_missing(sources: &[String], indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .filter_map(|&i| sources.get(i).cloned())
        .collect()
}

/// Write `supplement[k]` into `partial[indices[k]]`.
///
/// A shorter supplement fills as far as it goes; slots that are already
/// filled are never overwritten.
pub fn splice(partial: &mut [Option<String>], indices: &[usize], supplement: Vec<Option<String>>) {
    for (&index, value) in indices.iter().zip(supplement) {
        if let (Some(slot), Some(value)) = (partial.get_mut(index), value) {
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    }
}

/// Complete result, defaulting each missing entry to its source text
pub fn finalize(partial: Vec<Option<String>>, sources: &[String]) -> Vec<String> {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            partial
                .get(i)
                .cloned()
                .flatten()
                .unwrap_or_else(|| source.clone())
        })
        .collect()
}
