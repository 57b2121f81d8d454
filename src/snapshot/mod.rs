//! Session snapshots: a versioned codec and a durable store.

pub mod codec;
pub mod store;

pub use codec::{decode, encode, RuntimeState, Snapshot, CURRENT_VERSION};
pub use store::{load_snapshot, new_snapshot_id, save_snapshot, FileSnapshotStore, SnapshotStore};
