//! Value propagation.
//!
//! Two cooperating queues:
//! - **Upper bound**: optimistic bounds that decide which activations are
//!   eligible for the search at all
//! - **Round value**: exact per-round states under the tentative decisions
//!   of the current search path

pub mod upper_bound;
pub mod value_queue;

pub use upper_bound::UpperBoundQueue;
pub use value_queue::ValueQueue;
