#![forbid(unsafe_code)]

//! Array mutation methods.
//!
//! Arrays are not made reactive eagerly. The first interceptor installed on
//! an array's `length` or one of its indices flips the array into reactive
//! mode; from then on every mutating method compares the length before and
//! after and schedules the `"length"` observers when it changed.
//!
//! Index observers track a slot, not an element: `unshift` does not move an
//! observer on `"1"` to follow the element that shifted there, and methods
//! that only reorder (`sort`, `reverse`) notify nobody. Use
//! [`notify_all`](super::intercept::notify_all) on the indices when a
//! consumer needs that.
//!
//! Every method is a no-op on non-arrays and frozen arrays.

use std::cmp::Ordering;

use super::intercept::notify_all;
use super::metadata::metadata_of;
use super::object::Obj;
use super::value::Value;

/// Turn on length tracking for `obj`.
pub(crate) fn make_reactive(obj: &Obj) {
    if metadata_of(obj).set_reactive_array() {
        tracing::debug!(object = obj.id(), "array mutation adapter installed");
    }
}

/// Schedule the `"length"` observers of `obj`.
pub(crate) fn length_changed(obj: &Obj) {
    tracing::trace!(object = obj.id(), length = obj.array_len(), "array length changed");
    notify_all(obj, "length");
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    a.to_display_string().cmp(&b.to_display_string())
}

/// Sort with `Undefined` last, matching the usual array sort contract.
fn sort_values(values: &mut [Value], mut compare: impl FnMut(&Value, &Value) -> Ordering) {
    values.sort_by(|a, b| match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(a, b),
    });
}

impl Obj {
    /// Run `f` on the elements unless this is not a mutable array.
    fn mutate<R>(&self, grows: bool, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        let elements = self.elements()?;
        if self.is_frozen() || (grows && !self.is_extensible()) {
            return None;
        }
        let before = elements.borrow().len();
        let result = f(&mut elements.borrow_mut());
        let after = elements.borrow().len();
        if after != before && self.metadata().is_some_and(|meta| meta.is_reactive_array()) {
            length_changed(self);
        }
        Some(result)
    }

    /// Element count (0 for non-arrays).
    #[must_use]
    pub fn array_len(&self) -> usize {
        self.elements().map_or(0, |elements| elements.borrow().len())
    }

    /// Copy of the elements (empty for non-arrays).
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.elements()
            .map(|elements| elements.borrow().clone())
            .unwrap_or_default()
    }

    /// Append a value. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate(true, |elements| {
            elements.push(value);
            elements.len()
        })
        .unwrap_or_else(|| self.array_len())
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        self.mutate(false, Vec::pop).flatten().unwrap_or_default()
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        self.mutate(false, |elements| {
            (!elements.is_empty()).then(|| elements.remove(0))
        })
        .flatten()
        .unwrap_or_default()
    }

    /// Prepend a value. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate(true, |elements| {
            elements.insert(0, value);
            elements.len()
        })
        .unwrap_or_else(|| self.array_len())
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// `start` and `delete_count` are clamped to the array. Returns the
    /// removed elements.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let grows = items.len() > delete_count;
        self.mutate(grows, |elements| {
            let start = start.min(elements.len());
            let end = start.saturating_add(delete_count).min(elements.len());
            elements.splice(start..end, items).collect()
        })
        .unwrap_or_default()
    }

    /// Sort by string conversion, `Undefined` last. Stable.
    pub fn sort(&self) {
        self.mutate(false, |elements| sort_values(elements, default_order));
    }

    /// Sort with a comparator, `Undefined` last. Stable.
    ///
    /// The comparator runs without any borrow held, so it may read this
    /// array.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut values = self.to_vec();
        sort_values(&mut values, compare);
        self.mutate(false, |elements| {
            // Length cannot have changed unless the comparator mutated us.
            if elements.len() == values.len() {
                *elements = values;
            }
        });
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.mutate(false, |elements| elements.reverse());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe::observe;
    use pathwire_core::Scheduler;
    use std::cell::Cell;
    use std::rc::Rc;

    fn drain() {
        Scheduler::current().drain().expect("drain succeeds");
    }

    fn numbers(obj: &Obj) -> Vec<f64> {
        obj.to_vec().iter().filter_map(Value::as_number).collect()
    }

    fn length_counter(list: &Obj) -> (Rc<Cell<usize>>, crate::reactive::Subscription) {
        let observer = observe(list, "length").expect("observable");
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let sub = observer.subscribe_lazy(move |_| counter.set(counter.get() + 1));
        (calls, sub)
    }

    #[test]
    fn methods_behave_like_arrays() {
        let list = crate::arr![1, 2, 3];
        assert_eq!(list.push(4), 4);
        assert_eq!(list.pop(), Value::from(4));
        assert_eq!(list.shift(), Value::from(1));
        assert_eq!(list.unshift(0), 3);
        assert_eq!(numbers(&list), vec![0.0, 2.0, 3.0]);
        assert_eq!(list.splice(1, 1, [7, 8]), vec![Value::from(2)]);
        assert_eq!(numbers(&list), vec![0.0, 7.0, 8.0, 3.0]);
        list.reverse();
        assert_eq!(numbers(&list), vec![3.0, 8.0, 7.0, 0.0]);
    }

    #[test]
    fn empty_pops_yield_undefined() {
        let list = crate::arr![];
        assert!(list.pop().is_undefined());
        assert!(list.shift().is_undefined());
    }

    #[test]
    fn splice_clamps_bounds() {
        let list = crate::arr![1, 2];
        assert_eq!(list.splice(5, 3, [9]), Vec::<Value>::new());
        assert_eq!(numbers(&list), vec![1.0, 2.0, 9.0]);
        assert_eq!(list.splice(1, usize::MAX, Vec::<Value>::new()).len(), 2);
        assert_eq!(numbers(&list), vec![1.0]);
    }

    #[test]
    fn default_sort_is_by_string() {
        let list = crate::arr![10, 9, Value::Undefined, 1];
        list.sort();
        let sorted = list.to_vec();
        assert_eq!(&sorted[..3], &[Value::from(1), Value::from(10), Value::from(9)]);
        assert!(sorted[3].is_undefined());
    }

    #[test]
    fn sort_by_comparator() {
        let list = crate::arr![3, 1, 2];
        list.sort_by(|a, b| {
            a.as_number()
                .unwrap_or(0.0)
                .total_cmp(&b.as_number().unwrap_or(0.0))
        });
        assert_eq!(numbers(&list), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn non_arrays_and_frozen_arrays_ignore_methods() {
        let plain = Obj::new();
        assert_eq!(plain.push(1), 0);
        assert!(plain.pop().is_undefined());

        let frozen = crate::arr![1, 2];
        frozen.freeze();
        assert_eq!(frozen.push(3), 2);
        frozen.reverse();
        assert_eq!(numbers(&frozen), vec![1.0, 2.0]);
    }

    #[test]
    fn length_observers_fire_only_on_length_change() {
        let list = crate::arr![3, 1, 2];
        let (calls, _sub) = length_counter(&list);

        list.sort();
        list.reverse();
        drain();
        assert_eq!(calls.get(), 0);

        list.push(4);
        drain();
        assert_eq!(calls.get(), 1);

        list.splice(0, 1, [9]);
        drain();
        assert_eq!(calls.get(), 1);

        list.pop();
        drain();
        list.shift();
        drain();
        list.unshift(0);
        drain();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn index_observers_track_slots() {
        let list = crate::arr!["a", "b"];
        let observer = observe(&list, "1").expect("observable");
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = observer.subscribe_lazy(move |_| counter.set(counter.get() + 1));
        list.unshift("z");
        drain();
        assert_eq!(calls.get(), 0);
        assert_eq!(observer.value(), Value::from("a"));

        list.set("1", "y");
        drain();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn index_write_past_end_notifies_length() {
        let list = crate::arr![1];
        let (calls, _sub) = length_counter(&list);
        list.set("3", 4);
        drain();
        assert_eq!(calls.get(), 1);
        assert_eq!(list.array_len(), 4);
    }

    #[test]
    fn observing_length_enables_adapter_once() {
        let list = crate::arr![1];
        let _a = observe(&list, "length").expect("observable");
        let _b = observe(&list, "0").expect("observable");
        assert!(metadata_of(&list).is_reactive_array());
    }
}
