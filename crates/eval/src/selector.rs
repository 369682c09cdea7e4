//! Candidate ordering and UPDATE / ROLLBACK / NO_UPDATE selection.

use ota_core::{range, Bundle, BundleId};

/// Outcome of selection, before rollout gating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection<'a> {
    /// Offer a newer bundle.
    Update(&'a Bundle),
    /// Force the device back to an older bundle.
    Rollback(&'a Bundle),
    /// Nothing matches the device any more; force it back to the embedded bundle.
    RollbackToBaseline,
    NoUpdate,
}

fn is_catch_all(bundle: &Bundle) -> bool {
    bundle
        .target_app_version
        .as_deref()
        .is_some_and(|r| r.trim() == "*")
}

/// Order narrowed candidates for selection.
///
/// Catch-all `*` bundles come first, then specific ranges by their minimum
/// satisfying version, highest first. The result is then stably re-sorted
/// by id descending, so id is the final authority and range specificity
/// only breaks ties between equal ids.
pub fn order_candidates(candidates: Vec<&Bundle>) -> Vec<&Bundle> {
    let (mut ordered, mut specific): (Vec<&Bundle>, Vec<&Bundle>) =
        candidates.into_iter().partition(|b| is_catch_all(b));

    specific.sort_by_cached_key(|b| {
        std::cmp::Reverse(b.target_app_version.as_deref().and_then(range::rank))
    });
    ordered.extend(specific);
    ordered.sort_by(|a, b| b.id.cmp(&a.id));
    ordered
}

/// Pick the outcome for a device at `bundle_id`.
///
/// `ordered` must come from [`order_candidates`] and contain only bundles at
/// or above `min_bundle_id`.
pub fn select<'a>(
    ordered: &[&'a Bundle],
    bundle_id: BundleId,
    min_bundle_id: BundleId,
) -> Selection<'a> {
    let update = ordered.iter().copied().find(|b| b.id >= bundle_id);
    let rollback = ordered.iter().copied().find(|b| b.id < bundle_id);

    match (update, rollback) {
        (Some(current), _) if current.id == bundle_id => Selection::NoUpdate,
        (Some(newer), _) => Selection::Update(newer),
        (None, Some(older)) => Selection::Rollback(older),
        (None, None) if bundle_id > min_bundle_id => Selection::RollbackToBaseline,
        (None, None) => Selection::NoUpdate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrow::narrow;
    use ota_core::{Platform, UpdateQuery};
    use uuid::Uuid;

    fn id(n: u128) -> BundleId {
        BundleId::from_uuid(Uuid::from_u128(n))
    }

    fn versioned(n: u128, range: &str) -> Bundle {
        Bundle::for_app_version(id(n), Platform::Ios, range, format!("s3://bundles/{n}"))
    }

    fn targets<'a>(bundles: &[&'a Bundle]) -> Vec<&'a str> {
        bundles
            .iter()
            .filter_map(|b| b.target_app_version.as_deref())
            .collect()
    }

    fn fixture() -> Vec<Bundle> {
        vec![
            versioned(2, "1.2.3"),
            versioned(1, "*"),
            versioned(1, "1.2.3"),
            versioned(1, "1.2.3 - 1.2.7"),
            versioned(1, ">=1.2.3 <1.2.7"),
            versioned(1, "~1.2.3"),
            versioned(1, "^1.2.3"),
            versioned(1, "1.2.x"),
            versioned(1, "1.2"),
        ]
    }

    #[test]
    fn orders_fixture_for_newer_device() {
        let bundles = fixture();
        let query = UpdateQuery::app_version(Platform::Ios, "1.2.4", BundleId::NIL);
        let ordered = order_candidates(narrow(&query, &bundles));
        assert_eq!(
            targets(&ordered),
            vec![
                "*",
                "1.2.3 - 1.2.7",
                ">=1.2.3 <1.2.7",
                "~1.2.3",
                "^1.2.3",
                "1.2.x",
                "1.2"
            ]
        );
    }

    #[test]
    fn orders_fixture_for_exact_device() {
        let bundles = fixture();
        let query = UpdateQuery::app_version(Platform::Ios, "1.2.3", BundleId::NIL);
        let ordered = order_candidates(narrow(&query, &bundles));
        assert_eq!(ordered[0].id, id(2));
        assert_eq!(
            targets(&ordered),
            vec![
                "1.2.3",
                "*",
                "1.2.3",
                "1.2.3 - 1.2.7",
                ">=1.2.3 <1.2.7",
                "~1.2.3",
                "^1.2.3",
                "1.2.x",
                "1.2"
            ]
        );
    }

    #[test]
    fn higher_id_beats_higher_specificity() {
        let old_specific = versioned(1, "1.2.3");
        let new_catch_all = versioned(2, "*");
        let ordered = order_candidates(vec![&old_specific, &new_catch_all]);
        assert_eq!(ordered[0].id, id(2));
    }

    #[test]
    fn newer_candidate_is_update() {
        let (a, b) = (versioned(1, "*"), versioned(2, "*"));
        let ordered = order_candidates(vec![&a, &b]);
        assert_eq!(select(&ordered, id(1), BundleId::NIL), Selection::Update(&b));
        assert_eq!(select(&ordered, BundleId::NIL, BundleId::NIL), Selection::Update(&b));
    }

    #[test]
    fn current_latest_is_no_update() {
        let (a, b) = (versioned(1, "*"), versioned(2, "*"));
        let ordered = order_candidates(vec![&a, &b]);
        assert_eq!(select(&ordered, id(2), BundleId::NIL), Selection::NoUpdate);
    }

    #[test]
    fn device_ahead_of_every_candidate_rolls_back() {
        let (a, b) = (versioned(1, "*"), versioned(2, "*"));
        let ordered = order_candidates(vec![&a, &b]);
        assert_eq!(select(&ordered, id(5), BundleId::NIL), Selection::Rollback(&b));
    }

    #[test]
    fn empty_candidates() {
        assert_eq!(
            select(&[], id(5), BundleId::NIL),
            Selection::RollbackToBaseline
        );
        assert_eq!(select(&[], id(5), id(5)), Selection::NoUpdate);
        assert_eq!(select(&[], id(3), id(5)), Selection::NoUpdate);
        assert_eq!(select(&[], BundleId::NIL, BundleId::NIL), Selection::NoUpdate);
    }

    #[test]
    fn empty_ranges_sort_after_satisfiable_ones() {
        let (a, b) = (versioned(1, "1.0.0"), versioned(1, "<0.0.0"));
        let ordered = order_candidates(vec![&b, &a]);
        assert_eq!(targets(&ordered), vec!["1.0.0", "<0.0.0"]);
    }
}
