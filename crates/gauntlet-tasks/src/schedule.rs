//! Enqueue ordering for a run

use std::cmp::Reverse;

use crate::task::TaskDefinition;

/// Order tasks for the work queue.
///
/// Required tasks come first, then descending priority. The sort is stable,
/// so ties keep their input order. This only fixes enqueue order; completion
/// order is whatever the workers produce.
pub fn prioritize(tasks: &[TaskDefinition]) -> Vec<TaskDefinition> {
    let mut ordered = tasks.to_vec();
    ordered.sort_by_key(|t| (Reverse(t.required), Reverse(t.priority)));
    ordered
}
