//! Column Attributes
//!
//! An [`Attr`] is a column index into a tuple. Permutations describe column
//! reorderings; partial permutations additionally allow dropping columns
//! (a `None` entry is a hole).

/// A column index within a tuple.
pub type Attr = usize;

/// An ordered sequence of column indices.
pub type AttrPermutation = Vec<Attr>;

/// An ordered sequence of optional column indices; `None` drops the column.
pub type AttrPartialPermutation = Vec<Option<Attr>>;

/// The identity partial permutation `[0, 1, ..., n-1]`, the canonical form
/// of a view that changes nothing.
pub fn identity_permutation(arity: usize) -> AttrPartialPermutation {
    (0..arity).map(Some).collect()
}

/// Number of present (non-hole) entries in a partial permutation. This is
/// the arity of the viewed relation.
pub fn present_count(perm: &AttrPartialPermutation) -> usize {
    perm.iter().filter(|a| a.is_some()).count()
}
