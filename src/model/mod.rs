//! Generator abstraction and the per-batch model edits (bends and rewrites).

use std::collections::BTreeMap;

/// Structural layer edits.
pub mod bend;
/// Generator trait and call types.
pub mod generator;
/// Weight rewrites and the snapshot overlay.
pub mod rewrite;

#[cfg(test)]
#[path = "../../tests/unit/model/fake.rs"]
pub(crate) mod fake;

/// Live model edits applied by the scheduler every batch.
#[derive(Clone, Debug, Default)]
pub struct ModelEdits {
    /// Layer edits, applied in list order.
    pub bends: Vec<bend::Bend>,
    /// Weight rewrites keyed by parameter name.
    pub rewrites: BTreeMap<String, rewrite::Rewrite>,
}

impl ModelEdits {
    /// No bends and no rewrites.
    pub fn none() -> Self {
        Self::default()
    }
}
