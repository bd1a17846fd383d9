//! Torrent source ranking
//!
//! Merges candidates from one or more providers into a single pick. The
//! ranking is a total order over every field of [`TorrentCandidate`], so the
//! result only depends on the multiset of inputs, never on their order.

use std::cmp::Ordering;

use crate::models::{HealthClass, QualityMap, TorrentCandidate, TorrentSet};

/// Seeder counts at or above this are `Good`
pub const GOOD_SEEDERS: u32 = 100;
/// Seeder counts at or above this are `Decent`
pub const DECENT_SEEDERS: u32 = 20;

/// Derive a health class for providers that only report seeders
pub fn classify_health(seeders: u32) -> HealthClass {
    match seeders {
        0 => HealthClass::Unknown,
        s if s >= GOOD_SEEDERS => HealthClass::Good,
        s if s >= DECENT_SEEDERS => HealthClass::Decent,
        _ => HealthClass::Poor,
    }
}

/// Compare two candidates; `Greater` means `a` is the better source
///
/// Health first, then seeders, then quality tier. Magnet and delivery only
/// break ties between otherwise equal candidates.
pub fn rank(a: &TorrentCandidate, b: &TorrentCandidate) -> Ordering {
    a.health
        .cmp(&b.health)
        .then(a.seeders.cmp(&b.seeders))
        .then_with(|| {
            let qa = a.quality.map(|q| q.rank()).unwrap_or(0);
            let qb = b.quality.map(|q| q.rank()).unwrap_or(0);
            qa.cmp(&qb)
        })
        // Lexicographically smaller magnet wins a full tie
        .then_with(|| b.magnet.cmp(&a.magnet))
        .then_with(|| a.delivery.cmp(&b.delivery))
}

/// Pick the best candidate; placeholder if none carry a source
pub fn merge_and_rank<'a, I>(candidates: I) -> TorrentCandidate
where
    I: IntoIterator<Item = &'a TorrentCandidate>,
{
    candidates
        .into_iter()
        .filter(|c| !c.is_placeholder())
        .max_by(|a, b| rank(a, b))
        .cloned()
        .unwrap_or_default()
}

/// Build a [`TorrentSet`] from a single provider result
pub fn single_source_set(results: QualityMap) -> TorrentSet {
    let ideal = merge_and_rank(results.values());
    TorrentSet::from_parts(results, ideal)
}

/// Merge episode and season-complete results per quality label
///
/// The ideal pick is ranked over all raw candidates of both sources.
pub fn merged_set(episode: QualityMap, season_complete: QualityMap) -> TorrentSet {
    let ideal = merge_and_rank(episode.values().chain(season_complete.values()));
    let by_quality = crate::models::QualityLabel::ALL
        .into_iter()
        .map(|label| {
            let merged = merge_and_rank(
                episode
                    .get(&label)
                    .into_iter()
                    .chain(season_complete.get(&label)),
            );
            (label, merged)
        })
        .collect();
    TorrentSet::from_parts(by_quality, ideal)
}
