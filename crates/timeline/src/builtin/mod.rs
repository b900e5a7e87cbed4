//! Operators that ship with keyreel and can be named in a project file.

mod actions;
mod decode;
mod effects;
mod sources;

pub use actions::{ClearAction, HideAction, SetLayerAction, ShowAction};
pub use decode::{AudioReader, FrameDecoder, ImageSequenceDecoder, PcmFileReader};
pub use effects::{FadeInEffect, GainEffect, QuadEffect, ShaderEffect};
pub use sources::{FrameSequenceSource, ImageFileSource, PcmSource, SolidSource, ToneSource};
