// Peers module - WHO IS IN THE CLUSTER
// The backend-agnostic contract, its factory, and the static list backend

mod callbacks;
mod cancel;
mod error;
mod facade;
mod file;
mod set;

pub use callbacks::{CallbackRegistry, PeersCallback};
pub use cancel::Cancellation;
pub use error::PeerError;
pub use facade::{new_peers, PeerManagementType, Peers};
pub use file::FilePeers;
pub use set::{PeerCache, PeerSet};
