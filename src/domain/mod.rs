//! Pure domain logic: address codec, filter predicates, delta computation
//! and account lookups.

pub mod address;
pub mod delta;
pub mod filter;
pub mod lookups;

pub use address::Address;
pub use delta::{compute_delta, SeenSet, DEFAULT_SEEN_CAPACITY};
pub use filter::{matches, Filter, FilterInput};
pub use lookups::{created_assets, interacted_accounts, Receivers, TimeFrame};
