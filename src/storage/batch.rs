//! Parameter placeholder rendering for batched statements.

/// Renders one parenthesized group of numbered placeholders.
///
/// `placeholder_group(3, 2)` yields `(?3,?4)`. SQLite numbers parameters
/// from 1; `start` must be at least 1.
pub fn placeholder_group(start: usize, count: usize) -> String {
    let mut out = String::with_capacity(2 + count * 4);
    out.push('(');
    for idx in 0..count {
        if idx > 0 {
            out.push(',');
        }
        out.push('?');
        out.push_str(&(start + idx).to_string());
    }
    out.push(')');
    out
}

/// Renders `rows` consecutive groups of `width` placeholders, numbered
/// contiguously from 1 and separated by commas.
pub fn values_clause(rows: usize, width: usize) -> String {
    (0..rows)
        .map(|row| placeholder_group(row * width + 1, width))
        .collect::<Vec<_>>()
        .join(",")
}

/// Splits `items` into chunks whose bound-parameter count stays below the
/// backend limit.
pub fn row_chunks<T>(items: &[T], max_rows: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(max_rows.max(1))
}
