//! Music theory value types used by the layout engine.
//!
//! Pure values only: nothing in here knows about geometry.

mod pitch;
mod rhythm;
mod signature;

pub use pitch::{Accidental, Clef, Note, Step, Tuning};
pub use rhythm::{NoteLength, Rhythm, TICKS_PER_WHOLE};
pub use signature::{KeySignature, Tempo, TimeSignature};
