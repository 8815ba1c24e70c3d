//! Item use cases: acquisition (auto scan and explicit pickup) and item usage.

mod acquire;
mod usage;

pub use acquire::{acquired_flag, Acquisition, ItemAcquirer, PickupRefusal};
pub use usage::{
    ItemRejection, ItemUseOutcome, ItemUseRequest, ItemUseResolver, RejectionCode, SimulatedUse,
    ValidatedUse,
};
