//! One-byte type discriminators. Part of the wire contract.

pub const NIL: u8 = 0x00;
pub const LONG: u8 = 0x09;
pub const REF: u8 = 0x20;
pub const STRING: u8 = 0x30;
pub const BLOB: u8 = 0x31;
pub const SYMBOL: u8 = 0x32;
pub const KEYWORD: u8 = 0x33;
pub const VECTOR: u8 = 0x80;
pub const MAP: u8 = 0x82;
pub const RESULT: u8 = 0xAD;
pub const FALSE: u8 = 0xB0;
pub const TRUE: u8 = 0xB1;
pub const OP: u8 = 0xC0;
pub const CORE_FN: u8 = 0xCD;
pub const FN: u8 = 0xCF;

/// Op-type byte following [`OP`].
pub mod op {
    pub const INVOKE: u8 = 0;
    pub const COND: u8 = 1;
    pub const CONSTANT: u8 = 2;
    pub const DEF: u8 = 3;
    pub const DO: u8 = 4;
    pub const LAMBDA: u8 = 5;
    pub const LET: u8 = 6;
    pub const LOOKUP: u8 = 7;
}
