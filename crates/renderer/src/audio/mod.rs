//! Mixing, spectrum analysis and the device-side audio path.

mod feed;
mod mixer;
mod output;
mod snapshot;
mod spectrum;

pub use feed::{AudioFeed, AudioSnapshot};
pub(crate) use feed::{MixGate, SharedPlayback};
pub use mixer::{mix_sound_block, AudioBlock, BLOCK_SIZE};
pub use output::{list_output_devices, AudioOutput};
pub use snapshot::SnapshotSlot;
pub use spectrum::{SpectrumHistory, HISTORY_SIZE};
