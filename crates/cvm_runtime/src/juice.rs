//! Juice schedule. Part of the protocol: changing any figure changes the
//! outcome of existing transactions.

pub type Juice = u64;

pub const CONSTANT: Juice = 5;
pub const LOOKUP: Juice = 15;
pub const DO: Juice = 10;
pub const LET: Juice = 30;
pub const COND: Juice = 20;
pub const DEF: Juice = 100;
pub const LAMBDA: Juice = 100;
pub const INVOKE: Juice = 20;

/// Core functions doing constant work.
pub const SIMPLE_FN: Juice = 10;
pub const BUILD_DATA: Juice = 50;
pub const BUILD_PER_ELEMENT: Juice = 10;
pub const HASH: Juice = 100;
pub const HASH_PER_BYTE: Juice = 1;

pub fn build_cost(elements: u64) -> Juice {
    BUILD_DATA.saturating_add(BUILD_PER_ELEMENT.saturating_mul(elements))
}

pub fn hash_cost(bytes: usize) -> Juice {
    HASH.saturating_add(HASH_PER_BYTE.saturating_mul(bytes as u64))
}
