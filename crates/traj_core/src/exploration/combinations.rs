use crate::value::Value;

/// Row-major cartesian product, last axis varying fastest.
///
/// Partial combinations are expanded one axis at a time, so the product is
/// built without recursion regardless of how many axes are declared.
pub(super) fn cartesian_rows(axes: &[(String, Vec<Value>)]) -> Vec<Vec<Value>> {
    let mut partial: Vec<Vec<Value>> = vec![Vec::with_capacity(axes.len())];

    for (_, candidates) in axes {
        partial = partial
            .iter()
            .flat_map(|prefix| {
                candidates.iter().map(move |value| {
                    let mut row = prefix.clone();
                    row.push(value.clone());
                    row
                })
            })
            .collect();
    }

    if axes.is_empty() {
        return Vec::new();
    }
    partial
}
