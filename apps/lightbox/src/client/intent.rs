//! Normalization of physical input into navigation intents. The engine
//! never sees keys or touch coordinates, only `NavIntent`.

use crate::nav::NavIntent;

/// Minimum travel, in display units, before a gesture counts as navigation.
pub const SWIPE_THRESHOLD: f32 = 50.0;

/// Map a named key to an intent. Up/left page backward, down/right page
/// forward; unknown keys are not navigation.
pub fn for_key(key: &str) -> Option<NavIntent> {
    match key.to_ascii_lowercase().as_str() {
        "up" | "left" | "arrowup" | "arrowleft" => Some(NavIntent::Previous),
        "down" | "right" | "arrowdown" | "arrowright" => Some(NavIntent::Next),
        "home" => Some(NavIntent::First),
        "end" => Some(NavIntent::Last),
        _ => None,
    }
}

/// Map a completed swipe to an intent. Deltas are press position minus
/// release position, so positive `delta_x` is leftward travel (forward).
/// Vertical-dominant swipes belong to other surfaces and are ignored, as is
/// anything under the threshold.
pub fn for_swipe(delta_x: f32, delta_y: f32) -> Option<NavIntent> {
    if delta_x.abs() <= delta_y.abs() || delta_x.abs() < SWIPE_THRESHOLD {
        return None;
    }
    if delta_x > 0.0 {
        Some(NavIntent::Next)
    } else {
        Some(NavIntent::Previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_keys_map_to_paging() {
        assert_eq!(for_key("ArrowDown"), Some(NavIntent::Next));
        assert_eq!(for_key("ArrowRight"), Some(NavIntent::Next));
        assert_eq!(for_key("up"), Some(NavIntent::Previous));
        assert_eq!(for_key("Home"), Some(NavIntent::First));
        assert_eq!(for_key("End"), Some(NavIntent::Last));
        assert_eq!(for_key("space"), None);
    }

    #[test]
    fn swipe_requires_horizontal_dominance_and_threshold() {
        assert_eq!(for_swipe(120.0, 10.0), Some(NavIntent::Next));
        assert_eq!(for_swipe(-80.0, 5.0), Some(NavIntent::Previous));
        assert_eq!(for_swipe(30.0, 5.0), None);
        assert_eq!(for_swipe(60.0, 90.0), None);
    }
}
