use crate::{
    command::{Operation, WriteIntent},
    value::canonical_cmp_tuple,
};
use std::cmp::Ordering;

/// Deterministic total order over write intents within one independent set.
///
/// Orders by schema, table, operation (deletes, then updates, then inserts),
/// then entity and primary-key values for non-insert writes. Ties
/// keep their incoming order when used with a stable sort.
#[must_use]
pub fn compare_intents(left: &WriteIntent, right: &WriteIntent) -> Ordering {
    left.table()
        .schema
        .cmp(&right.table().schema)
        .then_with(|| left.table().name.cmp(&right.table().name))
        .then_with(|| {
            left.operation()
                .precedence()
                .cmp(&right.operation().precedence())
        })
        .then_with(|| compare_keys(left, right))
}

// Inserts may carry store-generated placeholder keys; they keep input order.
// Entity types sharing one table are grouped before keys are compared.
fn compare_keys(left: &WriteIntent, right: &WriteIntent) -> Ordering {
    if left.operation() == Operation::Insert {
        return Ordering::Equal;
    }

    left.entity()
        .cmp(&right.entity())
        .then_with(|| canonical_cmp_tuple(left.key_values(), right.key_values()))
}

/// Sort one independent set in place using [`compare_intents`].
pub fn sort_independent_set(intents: &mut [WriteIntent]) {
    intents.sort_by(compare_intents);
}
