// Identity module - WHO WE ARE ON THE NETWORK
// Resolves the address this node advertises to its peers

mod address;

pub use address::{
    advertised_address, join_host_port, local_addresses, resolve_self_address,
    select_address, split_host_port, LocalAddress, ResolveError,
};
