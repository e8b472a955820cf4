pub mod jobs;
pub mod producer;
pub mod state;
pub mod story_input;
pub mod text;
pub mod voice;
pub mod xml_stream;

pub use jobs::register_pipeline_tasks;
pub use producer::StoryEngine;
pub use story_input::{CharacterSeed, StoryInput};
