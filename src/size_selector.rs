//! Stream resolution negotiation
//!
//! Picks the stream size to request from a device given what the device
//! advertises, the view it has to fill and the bounds it must not exceed.

use crate::types::{DisplayMetrics, Rotation, Size};

/// Outcome of a size negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSelection {
    pub size: Size,
    /// True when no advertised size matched the constraints and the first
    /// advertised size was returned as a fallback.
    pub degraded: bool,
}

/// Choose the smallest advertised size that is at least as large as the view,
/// or the largest one that is smaller if none is big enough.
///
/// Only sizes within `max` whose aspect ratio matches `aspect` exactly
/// (`height == width * aspect.height / aspect.width`) are considered. Ties on
/// area keep the earliest candidate. Returns `None` for an empty list.
pub fn choose_optimal_size(
    choices: &[Size],
    view: Size,
    max: Size,
    aspect: Size,
) -> Option<SizeSelection> {
    let first = *choices.first()?;

    let mut big_enough: Option<Size> = None;
    let mut not_big_enough: Option<Size> = None;

    for option in choices.iter().copied() {
        if option.width > max.width || option.height > max.height {
            continue;
        }
        if !matches_aspect(option, aspect) {
            continue;
        }

        if option.width >= view.width && option.height >= view.height {
            if big_enough.map_or(true, |best| option.area() < best.area()) {
                big_enough = Some(option);
            }
        } else if not_big_enough.map_or(true, |best| option.area() > best.area()) {
            not_big_enough = Some(option);
        }
    }

    match big_enough.or(not_big_enough) {
        Some(size) => Some(SizeSelection {
            size,
            degraded: false,
        }),
        None => {
            log::error!(
                "Couldn't find any suitable size among {} choices, falling back to {}",
                choices.len(),
                first
            );
            Some(SizeSelection {
                size: first,
                degraded: true,
            })
        }
    }
}

/// Exact integer aspect match. A zero-width reference matches nothing.
pub fn matches_aspect(option: Size, aspect: Size) -> bool {
    if aspect.width == 0 {
        return false;
    }
    u64::from(option.height)
        == u64::from(option.width) * u64::from(aspect.height) / u64::from(aspect.width)
}

/// Largest advertised size by area, first occurrence winning ties.
pub fn largest_by_area(sizes: &[Size]) -> Option<Size> {
    sizes
        .iter()
        .copied()
        .fold(None, |best: Option<Size>, s| match best {
            Some(b) if b.area() >= s.area() => Some(b),
            _ => Some(s),
        })
}

/// Whether the sensor is mounted perpendicular to the current display rotation,
/// in which case view and display dimensions must be swapped before
/// comparing them with sensor-relative stream sizes.
pub fn dimensions_swapped(rotation: Rotation, sensor_orientation: u32) -> bool {
    match rotation {
        Rotation::Rotation0 | Rotation::Rotation180 => {
            sensor_orientation == 90 || sensor_orientation == 270
        }
        Rotation::Rotation90 | Rotation::Rotation270 => {
            sensor_orientation == 0 || sensor_orientation == 180
        }
    }
}

/// View size and upper bound expressed in sensor coordinates.
///
/// The bound is the display size, clamped to `max_preview`.
pub fn preview_bounds(
    view: Size,
    display: DisplayMetrics,
    sensor_orientation: u32,
    max_preview: Size,
) -> (Size, Size) {
    let (view, display_size) = if dimensions_swapped(display.rotation, sensor_orientation) {
        (view.transposed(), display.size.transposed())
    } else {
        (view, display.size)
    };

    let bound = Size::new(
        display_size.width.min(max_preview.width),
        display_size.height.min(max_preview.height),
    );
    (view, bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|&(w, h)| Size::new(w, h)).collect()
    }

    #[test]
    fn test_picks_smallest_big_enough() {
        let choices = sizes(&[(1920, 1080), (1280, 720), (640, 360), (3840, 2160)]);
        let selected = choose_optimal_size(
            &choices,
            Size::new(1000, 500),
            Size::new(4000, 4000),
            Size::new(16, 9),
        )
        .unwrap();
        assert_eq!(selected.size, Size::new(1280, 720));
        assert!(!selected.degraded);
    }

    #[test]
    fn test_falls_back_to_largest_too_small() {
        let choices = sizes(&[(640, 360), (1280, 720), (320, 180)]);
        let selected = choose_optimal_size(
            &choices,
            Size::new(1920, 1080),
            Size::new(4000, 4000),
            Size::new(16, 9),
        )
        .unwrap();
        assert_eq!(selected.size, Size::new(1280, 720));
    }

    #[test]
    fn test_respects_max_bound() {
        let choices = sizes(&[(3840, 2160), (1920, 1080)]);
        let selected = choose_optimal_size(
            &choices,
            Size::new(100, 100),
            Size::new(1920, 1080),
            Size::new(16, 9),
        )
        .unwrap();
        assert_eq!(selected.size, Size::new(1920, 1080));
    }

    #[test]
    fn test_degraded_returns_first_choice() {
        let choices = sizes(&[(480, 680), (960, 1280)]);
        let selected = choose_optimal_size(
            &choices,
            Size::new(480, 680),
            Size::new(1920, 1080),
            Size::new(16, 9),
        )
        .unwrap();
        assert_eq!(selected.size, Size::new(480, 680));
        assert!(selected.degraded);
    }

    #[test]
    fn test_portrait_view_matches_still_aspect() {
        // Front camera on a portrait phone: the view is compared transposed
        // and only 480x680 shares the 480:680 aspect.
        let choices = sizes(&[(480, 680), (960, 1280)]);
        let selected = choose_optimal_size(
            &choices,
            Size::new(680, 480),
            Size::new(1920, 1080),
            Size::new(480, 680),
        )
        .unwrap();
        assert_eq!(selected.size, Size::new(480, 680));
        assert!(!selected.degraded);

        let selected = choose_optimal_size(
            &choices,
            Size::new(480, 680),
            Size::new(1920, 1080),
            Size::new(960, 1360),
        )
        .unwrap();
        assert_eq!(
            selected,
            SizeSelection {
                size: Size::new(480, 680),
                degraded: false,
            }
        );
    }

    #[test]
    fn test_ties_keep_first_occurrence() {
        // Duplicate sizes: the earlier one must win.
        let choices = sizes(&[(800, 600), (800, 600), (400, 300)]);
        let selected = choose_optimal_size(
            &choices,
            Size::new(500, 500),
            Size::new(1000, 1000),
            Size::new(4, 3),
        )
        .unwrap();
        assert_eq!(selected.size, Size::new(800, 600));
    }

    #[test]
    fn test_empty_choices() {
        assert!(choose_optimal_size(&[], Size::new(1, 1), Size::new(1, 1), Size::new(1, 1)).is_none());
    }

    #[test]
    fn test_largest_by_area() {
        let choices = sizes(&[(480, 680), (960, 1280), (1280, 960)]);
        assert_eq!(largest_by_area(&choices), Some(Size::new(960, 1280)));
        assert_eq!(largest_by_area(&[]), None);
    }

    #[test]
    fn test_swapped_dimensions() {
        assert!(dimensions_swapped(Rotation::Rotation0, 90));
        assert!(dimensions_swapped(Rotation::Rotation180, 270));
        assert!(!dimensions_swapped(Rotation::Rotation0, 0));
        assert!(dimensions_swapped(Rotation::Rotation90, 0));
        assert!(!dimensions_swapped(Rotation::Rotation270, 90));
    }

    #[test]
    fn test_preview_bounds_swap_and_clamp() {
        let display = DisplayMetrics {
            rotation: Rotation::Rotation0,
            size: Size::new(1440, 2560),
        };
        let (view, bound) = preview_bounds(Size::new(480, 680), display, 90, Size::new(1920, 1080));
        assert_eq!(view, Size::new(680, 480));
        assert_eq!(bound, Size::new(1920, 1080));
    }
}
