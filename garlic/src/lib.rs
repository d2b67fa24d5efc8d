/*! Meta-crate re-exporting the garlic workspace crates.
*/

#![forbid(unsafe_code)]

pub use garlic_binary_io as binary_io;
pub use garlic_core as core;
pub use garlic_crypto as crypto;
pub use garlic_packet as packet;
