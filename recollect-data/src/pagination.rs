use serde::{Deserialize, Serialize};

/// Page traversal technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pagination {
    /// Seek from the boundary row of the previous page. Needs no count and
    /// stays fast on deep pages.
    #[default]
    Keyset,
    /// Numeric offsets. Knowing the number of pages requires a count.
    Offset,
}

/// Precision of keyset page boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekMethod {
    /// Trust the ordering values recorded from the previous page.
    #[default]
    Approximated,
    /// Re-read the boundary row before each page query so that boundary
    /// values changed since the previous page are honored.
    Exact,
}
