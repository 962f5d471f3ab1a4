use std::borrow::Cow;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use std::sync::Arc;

/// A labelled, shareable boolean test over `A`.
pub struct Predicate<A: ?Sized> {
    test: Arc<dyn Fn(&A) -> bool + Send + Sync>,
    label: Cow<'static, str>,
}

impl<A: ?Sized + 'static> Predicate<A> {
    pub fn new<F>(label: impl Into<Cow<'static, str>>, test: F) -> Self
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Arc::new(test),
            label: label.into(),
        }
    }

    pub fn always() -> Self {
        Self::new("always", |_| true)
    }

    pub fn never() -> Self {
        Self::new("never", |_| false)
    }

    #[inline]
    pub fn test(&self, value: &A) -> bool {
        (self.test)(value)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the label shown in diagnostics.
    pub fn labelled(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }

    pub fn and(self, other: Self) -> Self {
        let label = format!("({} & {})", self.label, other.label);
        Self::new(label, move |a| self.test(a) && other.test(a))
    }

    pub fn or(self, other: Self) -> Self {
        let label = format!("({} | {})", self.label, other.label);
        Self::new(label, move |a| self.test(a) || other.test(a))
    }

    pub fn xor(self, other: Self) -> Self {
        let label = format!("({} ^ {})", self.label, other.label);
        Self::new(label, move |a| self.test(a) ^ other.test(a))
    }

    pub fn negate(self) -> Self {
        let label = format!("!{}", self.label);
        Self::new(label, move |a| !self.test(a))
    }
}

impl<A: ?Sized> Clone for Predicate<A> {
    fn clone(&self) -> Self {
        Self {
            test: Arc::clone(&self.test),
            label: self.label.clone(),
        }
    }
}

impl<A: ?Sized> fmt::Debug for Predicate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl<A: ?Sized> fmt::Display for Predicate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl<A: ?Sized + 'static> BitAnd for Predicate<A> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl<A: ?Sized + 'static> BitOr for Predicate<A> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl<A: ?Sized + 'static> BitXor for Predicate<A> {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        self.xor(rhs)
    }
}

impl<A: ?Sized + 'static> Not for Predicate<A> {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even() -> Predicate<u32> {
        Predicate::new("even", |n| n % 2 == 0)
    }

    fn small() -> Predicate<u32> {
        Predicate::new("small", |n| *n < 10)
    }

    #[test]
    fn test_combinators() {
        let both = even() & small();
        assert!(both.test(&4));
        assert!(!both.test(&12));
        assert!(!both.test(&3));

        let either = even() | small();
        assert!(either.test(&12));
        assert!(either.test(&3));
        assert!(!either.test(&13));

        let one = even() ^ small();
        assert!(one.test(&12));
        assert!(one.test(&3));
        assert!(!one.test(&4));

        assert!((!even()).test(&3));
    }

    #[test]
    fn test_labels_compose() {
        let filter = !(even() | small()) & Predicate::always();
        assert_eq!(filter.label(), "(!(even | small) & always)");
        assert_eq!(Predicate::<u32>::never().labelled("nothing").label(), "nothing");
    }
}
