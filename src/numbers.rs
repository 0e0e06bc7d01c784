//! Arithmetic, comparison and boolean operators on holders.

use num_traits::{Float, Num};
use crate::holder::{Holdable, Holder};

const NOT: &str = "not";

pub type BoolHolder = Holder<bool>;

// region numbers

#[allow(clippy::should_implement_trait)]
impl<N: Num + Copy + Holdable> Holder<N> {
    pub fn add(&self, other: &Holder<N>) -> Holder<N> {
        self.combine(other, |a, b| *a + *b)
    }

    pub fn add_value(&self, value: N) -> Holder<N> {
        self.map(move |a| *a + value)
    }

    pub fn sub(&self, other: &Holder<N>) -> Holder<N> {
        self.combine(other, |a, b| *a - *b)
    }

    pub fn sub_value(&self, value: N) -> Holder<N> {
        self.map(move |a| *a - value)
    }

    pub fn mult(&self, other: &Holder<N>) -> Holder<N> {
        self.combine(other, |a, b| *a * *b)
    }

    pub fn mult_value(&self, value: N) -> Holder<N> {
        self.map(move |a| *a * value)
    }

    /// Integer division panics on a zero divisor, inside the `set` which triggered it.
    pub fn div(&self, other: &Holder<N>) -> Holder<N> {
        self.combine(other, |a, b| *a / *b)
    }

    pub fn div_value(&self, value: N) -> Holder<N> {
        self.map(move |a| *a / value)
    }
}

impl<N: PartialOrd + Holdable> Holder<N> {
    /// `true` while `test(self, other)` holds.
    pub fn compare_with(&self, other: &Holder<N>, test: impl Fn(&N, &N) -> bool + Send + Sync + 'static) -> BoolHolder {
        self.combine(other, test)
    }

    pub fn gt(&self, other: &Holder<N>) -> BoolHolder {
        self.compare_with(other, |a, b| a > b)
    }

    pub fn lt(&self, other: &Holder<N>) -> BoolHolder {
        self.compare_with(other, |a, b| a < b)
    }

    pub fn gt_value(&self, value: N) -> BoolHolder {
        self.test(move |a| *a > value)
    }

    pub fn lt_value(&self, value: N) -> BoolHolder {
        self.test(move |a| *a < value)
    }
}

impl<F: Float + Holdable> Holder<F> {
    pub fn ceil(&self) -> Holder<F> {
        self.map(|a| a.ceil())
    }

    pub fn floor(&self) -> Holder<F> {
        self.map(|a| a.floor())
    }
}

// endregion

// region booleans

impl BoolHolder {
    /// The negation of this holder. Cached: repeated calls return the same holder while it is
    /// alive, and negating it again returns this holder.
    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> BoolHolder {
        self.memo(NOT, || {
            let negated = self.map(|a| !a);
            negated.memo_link(NOT, self);
            negated
        })
    }

    pub fn and(&self, other: &BoolHolder) -> BoolHolder {
        self.combine(other, |a, b| *a && *b)
    }

    pub fn or(&self, other: &BoolHolder) -> BoolHolder {
        self.combine(other, |a, b| *a || *b)
    }

    pub fn xor(&self, other: &BoolHolder) -> BoolHolder {
        self.combine(other, |a, b| a ^ b)
    }

    pub fn and_value(&self, value: bool) -> BoolHolder {
        self.map(move |a| *a && value)
    }

    pub fn or_value(&self, value: bool) -> BoolHolder {
        self.map(move |a| *a || value)
    }

    pub fn xor_value(&self, value: bool) -> BoolHolder {
        self.map(move |a| a ^ value)
    }

    /// Tracks `if_true` while this holder is `true`, `if_false` otherwise.
    pub fn select<U: Holdable>(&self, if_true: &Holder<U>, if_false: &Holder<U>) -> Holder<U> {
        let (if_true, if_false) = (if_true.clone(), if_false.clone());
        self.unpack(move |condition| if *condition { if_true.clone() } else { if_false.clone() })
    }
}

// endregion
