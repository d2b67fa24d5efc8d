/*!
Core of the garlic anonymising overlay relay.

A client builds a chain of relays, negotiates a per-hop session key with each
of them and wraps outbound traffic in one encryption layer per hop. Each relay
peels exactly one layer and learns nothing but its neighbours. Return traffic
flows through tunnel midpoints installed at the relays and is peeled in one go
by the client-side endpoint.
*/

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod adnl;
pub mod client;
pub mod keyring;
pub mod relay;
pub mod time;
pub mod tunnel;
