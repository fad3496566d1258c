type Equality<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A value that keeps its previous instance unless a new one is different.
///
/// Consumers that rebuild equal values on every pass (a fresh reference
/// object per render, say) use this to avoid treating each rebuild as a
/// change.
///
/// # Examples
///
/// ```
/// use snapcache::signal::Stable;
///
/// let mut name = Stable::new(String::from("Alice"), |a: &String, b: &String| {
///     a.eq_ignore_ascii_case(b)
/// });
/// assert!(!name.update(String::from("ALICE")));
/// assert_eq!(name.get(), "Alice");
/// assert!(name.update(String::from("Bob")));
/// ```
pub struct Stable<T> {
    value: T,
    equals: Equality<T>,
}

impl<T> Stable<T> {
    /// Create a stable value compared with `equals`.
    pub fn new<F>(initial: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            value: initial,
            equals: Box::new(equals),
        }
    }

    /// Offer a new value. Returns `true` if it replaced the held one.
    pub fn update(&mut self, next: T) -> bool {
        if (self.equals)(&self.value, &next) {
            return false;
        }
        self.value = next;
        true
    }

    /// The held value.
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: PartialEq + Send + Sync + 'static> Stable<T> {
    /// Stable value compared with `PartialEq`.
    pub fn by_eq(initial: T) -> Self {
        Self::new(initial, |a: &T, b: &T| a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keeps_first_of_equal_values() {
        let mut stable = Stable::new((1, 10), |a: &(i32, i32), b: &(i32, i32)| a.0 == b.0);
        assert!(!stable.update((1, 20)));
        assert_eq!(stable.get().1, 10);
        assert!(stable.update((2, 30)));
        assert_eq!(stable.into_inner(), (2, 30));
    }

    proptest! {
        #[test]
        fn changes_exactly_when_values_differ(values in proptest::collection::vec(0u8..4, 1..32)) {
            let mut stable = Stable::by_eq(values[0]);
            for next in values.into_iter().skip(1) {
                let previous = *stable.get();
                let changed = stable.update(next);
                prop_assert_eq!(changed, previous != next);
                prop_assert_eq!(*stable.get(), next);
            }
        }
    }
}
