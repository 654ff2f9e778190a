//! Values paired with a dirty flag.

/// A value plus whether it differs from the value it replaced.
///
/// Each host-settable input is wrapped in one of these so the worker can
/// tell which inputs moved since it last looked, without keeping its own
/// copy of the previous values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeTracked<T> {
    /// Current value.
    pub value: T,
    /// Whether `value` was replaced by the update that produced this instance.
    pub changed: bool,
}

impl<T> ChangeTracked<T> {
    /// Wraps an initial value, marked as changed.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self { value, changed: true }
    }

    /// Wraps a value, marked as unchanged.
    #[must_use]
    pub const fn unchanged(value: T) -> Self {
        Self { value, changed: false }
    }
}

impl<T: PartialEq + Clone> ChangeTracked<T> {
    /// Returns the successor of this value after observing `new`.
    #[must_use]
    pub fn update(&self, new: T) -> Self {
        if self.value == new {
            Self::unchanged(self.value.clone())
        } else {
            Self::new(new)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn update_with_same_value_is_unchanged() {
        let v = ChangeTracked::new(String::from("crease"));
        let next = v.update(String::from("crease"));
        assert!(!next.changed);
        assert_eq!(next.value, "crease");
    }

    #[test]
    fn update_with_new_value_is_changed() {
        let v = ChangeTracked::unchanged(3u16);
        let next = v.update(4);
        assert!(next.changed);
        assert_eq!(next.value, 4);
    }

    #[test]
    fn changed_flag_does_not_stick() {
        let v = ChangeTracked::unchanged(0.5f32).update(0.25);
        assert!(v.changed);
        assert!(!v.update(0.25).changed);
    }

    #[test]
    fn durations_compare_by_value() {
        let v = ChangeTracked::unchanged(Duration::from_millis(16));
        assert!(!v.update(Duration::from_micros(16_000)).changed);
        assert!(v.update(Duration::from_millis(17)).changed);
    }

    #[test]
    fn nan_float_always_reports_change() {
        let v = ChangeTracked::unchanged(f32::NAN);
        assert!(v.update(f32::NAN).changed);
    }
}
