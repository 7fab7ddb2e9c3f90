//! Display sorting and order normalization for the merged note list.
//!
//! Both algorithms are pure. `display_cmp` decides on-screen ordering and is
//! free to group pinned notes first; `normalized` assigns the absolute `order`
//! sequence that gets persisted. Keeping the two separate means `order` stays
//! stable and comparable for reordering math while grouping remains a
//! presentation concern.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::entity::{Note, NoteSource, OrderUpdate};

/// Comparator for on-screen ordering of the merged list.
///
/// Precedence:
/// 1. `order == 0` sorts before any assigned order (fresh notes surface
///    first); two sentinels tie-break by `updated_at` descending.
/// 2. Pinned before unpinned.
/// 3. Both positive: ascending by `order`.
/// 4. Exactly one positive: it sorts first.
/// 5. Neither positive: `updated_at` descending.
pub fn display_cmp(a: &Note, b: &Note) -> Ordering {
    match (a.order == 0, b.order == 0) {
        (true, true) => return b.updated_at.cmp(&a.updated_at),
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    if a.pinned != b.pinned {
        return if a.pinned {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }

    match (a.order > 0, b.order > 0) {
        (true, true) => a.order.cmp(&b.order),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b.updated_at.cmp(&a.updated_at),
    }
}

/// Sort a list in place into display order.
pub fn sort_for_display(notes: &mut [Note]) {
    notes.sort_by(display_cmp);
}

/// Assign a stable, contiguous `order` sequence across the full list.
///
/// Returns the notes in normalized sequence with `order = index + 1`. The
/// sequence spans both pin groups: pinned notes with an assigned order first
/// (ascending, ties by `created_at`; a cross-store transfer can leave equal
/// order values behind), then pinned sentinels (newest first), then unpinned
/// sentinels (newest first), then unpinned assigned notes. Idempotent:
/// normalizing an already-normalized list leaves every order value unchanged.
pub fn normalized(notes: &[Note]) -> Vec<Note> {
    let mut assigned: Vec<Note> = notes.iter().filter(|n| n.order > 0).cloned().collect();
    assigned.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut fresh: Vec<Note> = notes.iter().filter(|n| n.order <= 0).cloned().collect();
    fresh.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let (pinned_assigned, unpinned_assigned): (Vec<Note>, Vec<Note>) =
        assigned.into_iter().partition(|n| n.pinned);
    let (pinned_fresh, unpinned_fresh): (Vec<Note>, Vec<Note>) =
        fresh.into_iter().partition(|n| n.pinned);

    let mut result: Vec<Note> = pinned_assigned
        .into_iter()
        .chain(pinned_fresh)
        .chain(unpinned_fresh)
        .chain(unpinned_assigned)
        .collect();

    for (index, note) in result.iter_mut().enumerate() {
        note.order = index as i64 + 1;
    }
    result
}

/// Diff two versions of a list into per-store `batch_update_order` payloads.
/// Only notes whose `order` actually changed are included.
pub fn order_changes(
    before: &[Note],
    after: &[Note],
) -> HashMap<NoteSource, Vec<OrderUpdate>> {
    let old: HashMap<_, _> = before.iter().map(|n| (n.id, n.order)).collect();

    let mut changes: HashMap<NoteSource, Vec<OrderUpdate>> = HashMap::new();
    for note in after {
        if old.get(&note.id).copied() != Some(note.order) {
            changes.entry(note.source).or_default().push(OrderUpdate {
                note_id: note.id,
                order: note.order,
            });
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NoteSource;
    use uuid::Uuid;

    fn note(title: &str, pinned: bool, order: i64, updated_at: i64) -> Note {
        Note {
            id: Uuid::new_v4(),
            source: NoteSource::Cache,
            title: title.to_string(),
            content: String::new(),
            pinned,
            is_private: false,
            is_collapsed: false,
            order,
            created_at: updated_at,
            updated_at,
            goal: None,
            goal_type: Default::default(),
        }
    }

    #[test]
    fn test_sentinel_sorts_before_assigned() {
        let fresh = note("fresh", false, 0, 100);
        let old = note("old", true, 1, 200);
        assert_eq!(display_cmp(&fresh, &old), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_two_sentinels_newest_first() {
        let newer = note("newer", false, 0, 200);
        let older = note("older", false, 0, 100);
        assert_eq!(display_cmp(&newer, &older), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_pinned_before_unpinned() {
        let pinned = note("pinned", true, 5, 100);
        let unpinned = note("unpinned", false, 1, 200);
        assert_eq!(display_cmp(&pinned, &unpinned), std::cmp::Ordering::Less);
    }

    #[test]
    fn test_same_group_ascending_order() {
        let first = note("first", false, 1, 100);
        let second = note("second", false, 2, 100);
        assert_eq!(display_cmp(&first, &second), std::cmp::Ordering::Less);
    }

    // Mixed scenario: [{A pinned order=2}, {B unpinned order=1}, {C pinned order=0}]
    // must display as [C, A, B].
    #[test]
    fn test_mixed_pin_and_sentinel_scenario() {
        let a = note("A", true, 2, 100);
        let b = note("B", false, 1, 100);
        let c = note("C", true, 0, 300);

        let mut list = vec![a.clone(), b.clone(), c.clone()];
        sort_for_display(&mut list);

        let titles: Vec<&str> = list.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_sort_is_stable_on_sorted_input() {
        let mut list = vec![
            note("C", true, 0, 300),
            note("A", true, 2, 100),
            note("B", false, 1, 100),
        ];
        sort_for_display(&mut list);
        let first_pass: Vec<Uuid> = list.iter().map(|n| n.id).collect();

        sort_for_display(&mut list);
        let second_pass: Vec<Uuid> = list.iter().map(|n| n.id).collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn test_normalized_assigns_contiguous_sequence() {
        let list = vec![
            note("p1", true, 7, 100),
            note("p0", true, 0, 400),
            note("u0", false, 0, 300),
            note("u1", false, 3, 100),
            note("u2", false, 9, 100),
        ];

        let result = normalized(&list);
        let orders: Vec<i64> = result.iter().map(|n| n.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5]);

        let titles: Vec<&str> = result.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["p1", "p0", "u0", "u1", "u2"]);
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let list = vec![
            note("a", true, 4, 100),
            note("b", true, 0, 500),
            note("c", false, 0, 400),
            note("d", false, 2, 100),
        ];

        let once = normalized(&list);
        let twice = normalized(&once);

        let first: Vec<(Uuid, i64)> = once.iter().map(|n| (n.id, n.order)).collect();
        let second: Vec<(Uuid, i64)> = twice.iter().map(|n| (n.id, n.order)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_normalized_orders_unique_within_pin_group() {
        let list = vec![
            note("a", true, 3, 100),
            note("b", true, 3, 200),
            note("c", false, 3, 100),
            note("d", false, 0, 400),
        ];

        let result = normalized(&list);
        for group in [true, false] {
            let mut orders: Vec<i64> = result
                .iter()
                .filter(|n| n.pinned == group)
                .map(|n| n.order)
                .collect();
            orders.sort_unstable();
            orders.dedup();
            let expected = result.iter().filter(|n| n.pinned == group).count();
            assert_eq!(orders.len(), expected);
        }
    }

    // Equal order values after a transfer resolve by created_at ascending.
    #[test]
    fn test_order_collision_resolved_by_created_at() {
        let mut early = note("early", false, 2, 100);
        early.created_at = 100;
        let mut late = note("late", false, 2, 100);
        late.created_at = 200;

        let result = normalized(&[late.clone(), early.clone()]);
        assert_eq!(result[0].id, early.id);
        assert_eq!(result[1].id, late.id);
    }

    #[test]
    fn test_order_changes_only_reports_differences() {
        let a = note("a", false, 1, 100);
        let b = note("b", false, 2, 100);

        let mut after = vec![a.clone(), b.clone()];
        after[1].order = 5;

        let changes = order_changes(&[a, b], &after);
        let cache = changes.get(&NoteSource::Cache).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache[0].order, 5);
    }

    #[test]
    fn test_order_changes_empty_when_unchanged() {
        let a = note("a", false, 1, 100);
        let changes = order_changes(&[a.clone()], &[a]);
        assert!(changes.is_empty());
    }
}
