//! Sibling resolution
//!
//! Picks one value out of the conflicting siblings of an eventually
//! consistent read. The newest sibling by last-modified time wins; ties,
//! and sibling sets without timestamps, are broken uniformly at random.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::wire::Sibling;

/// Choose the sibling to reply with, ignoring tombstones
///
/// Returns `None` when every sibling is deleted (or there are none).
pub fn resolve<'a, R: Rng + ?Sized>(siblings: &'a [Sibling], rng: &mut R) -> Option<&'a Sibling> {
    let live: Vec<&Sibling> = siblings.iter().filter(|s| !s.deleted).collect();

    match live.as_slice() {
        [] => None,
        [only] => Some(*only),
        [first, ..] if first.last_modified.is_none() => live.choose(rng).copied(),
        _ => {
            let newest = live.iter().filter_map(|s| s.modified_micros()).max();
            let tied: Vec<&Sibling> = live
                .iter()
                .copied()
                .filter(|s| s.modified_micros() == newest)
                .collect();
            tied.choose(rng).copied()
        }
    }
}
