//! rt-terminal: Terminal state model for relay-terminal
//!
//! Consumes raw shell output incrementally and keeps a logical screen
//! (cell grid, cursor, attributes, scroll region) in sync with it. Terminal
//! capability probes found in the stream are either answered on the spot,
//! while the post-connect window is open, or handed to the caller.
//!
//! This is a state model only. Nothing here renders glyphs.

mod parser;
mod plain;
mod probe;
mod screen;

pub use parser::{FeedOutcome, Terminal};
pub use plain::strip_controls;
pub use probe::{ProbePolicy, ProbeQuery};
pub use screen::{Attrs, Cell, Color, CursorPos, Screen, ScreenSnapshot};
