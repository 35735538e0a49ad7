//! Length-prefixed, typed-argument binary framing layer (spec.md §4.1, §6).

mod packet;

pub use packet::{decode, encode, Arg, Packet};
