//! Consumer layer: the three ways a resolved narrative stream reaches
//! the outside world. `resolver` is shared by all of them; `streaming`
//! and `downloader` wrap it for a live sink and a batch/offline project
//! respectively, and `script_writer` renders a downloaded project as a
//! scripting-language script.

pub mod downloader;
pub mod label;
pub mod resolver;
pub mod script_writer;
pub mod streaming;
pub mod wire;

pub use downloader::{OfflineConsumer, ProjectLayout};
pub use resolver::{resolve_event, resolve_key, Resolved};
pub use script_writer::ScriptWriterConsumer;
pub use streaming::StreamingConsumer;
pub use wire::{to_wire, CharacterColors, StoryEvent};
