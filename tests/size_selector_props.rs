//! Property-Based Tests for stream size negotiation
//!
//! Run with: cargo test --test size_selector_props

use proptest::prelude::*;
use stillcam::size_selector::{choose_optimal_size, matches_aspect};
use stillcam::Size;

fn size_strategy() -> impl Strategy<Value = Size> {
    (1u32..4000, 1u32..4000).prop_map(|(w, h)| Size::new(w, h))
}

/// Sizes on a 4:3 grid so a useful share of candidates match the aspect.
fn four_by_three() -> impl Strategy<Value = Size> {
    (1u32..600).prop_map(|k| Size::new(k * 4, k * 3))
}

fn choices_strategy() -> impl Strategy<Value = Vec<Size>> {
    prop::collection::vec(prop_oneof![four_by_three(), size_strategy()], 1..24)
}

proptest! {
    /// INVARIANT: A non-degraded result is an advertised size that satisfies
    /// the bound and the aspect ratio
    #[test]
    fn selection_respects_constraints(
        choices in choices_strategy(),
        view in size_strategy(),
        max in size_strategy(),
    ) {
        let aspect = Size::new(4, 3);
        let selection = choose_optimal_size(&choices, view, max, aspect).unwrap();

        prop_assert!(choices.contains(&selection.size));
        if !selection.degraded {
            prop_assert!(selection.size.width <= max.width);
            prop_assert!(selection.size.height <= max.height);
            prop_assert!(matches_aspect(selection.size, aspect));
        } else {
            prop_assert_eq!(selection.size, choices[0]);
        }
    }

    /// INVARIANT: Degraded exactly when no candidate qualifies
    #[test]
    fn degraded_iff_no_candidate(
        choices in choices_strategy(),
        view in size_strategy(),
        max in size_strategy(),
    ) {
        let aspect = Size::new(4, 3);
        let any_valid = choices.iter().any(|s| {
            s.width <= max.width && s.height <= max.height && matches_aspect(*s, aspect)
        });

        let selection = choose_optimal_size(&choices, view, max, aspect).unwrap();
        prop_assert_eq!(selection.degraded, !any_valid);
    }

    /// INVARIANT: When a big-enough candidate exists, the pick is big enough
    /// and no other big-enough candidate is smaller
    #[test]
    fn picks_smallest_big_enough(
        choices in choices_strategy(),
        view in size_strategy(),
        max in size_strategy(),
    ) {
        let aspect = Size::new(4, 3);
        let valid: Vec<Size> = choices
            .iter()
            .copied()
            .filter(|s| s.width <= max.width && s.height <= max.height && matches_aspect(*s, aspect))
            .collect();
        let big: Vec<Size> = valid
            .iter()
            .copied()
            .filter(|s| s.width >= view.width && s.height >= view.height)
            .collect();

        let selection = choose_optimal_size(&choices, view, max, aspect).unwrap();

        if let Some(min_area) = big.iter().map(|s| s.area()).min() {
            prop_assert!(selection.size.width >= view.width);
            prop_assert!(selection.size.height >= view.height);
            prop_assert_eq!(selection.size.area(), min_area);
        } else if let Some(max_area) = valid.iter().map(|s| s.area()).max() {
            prop_assert_eq!(selection.size.area(), max_area);
        }
    }

    /// INVARIANT: Ties on area keep the earliest candidate
    #[test]
    fn ties_keep_first(k in 1u32..400, view in size_strategy()) {
        let size = Size::new(k * 4, k * 3);
        let choices = vec![size, size];
        let selection = choose_optimal_size(&choices, view, Size::new(u32::MAX, u32::MAX), Size::new(4, 3))
            .unwrap();
        prop_assert_eq!(selection.size, size);
        prop_assert!(!selection.degraded);
    }
}

#[test]
fn empty_choices_yield_none() {
    assert!(choose_optimal_size(&[], Size::new(1, 1), Size::new(10, 10), Size::new(4, 3)).is_none());
}
