//! # manimcraft Agent
//!
//! The agent turns a topic into a rendered Manim video:
//! 1. `prompt` assembles the system prompt (examples, documentation index, voiceover docs)
//! 2. The oracle answers, calling `get_specific_documentation_info` as often as it likes
//! 3. `extract` pulls the program out of the final answer
//! 4. A `Renderer` runs it
//! 5. Errors go back to the oracle as a new turn, until it renders or attempts run out

mod agent;
pub mod docs;
pub mod extract;
pub mod prompt;
pub mod renderer;

pub use agent::{Agent, AgentConfig, AttemptCounter, JobOutcome};
pub use docs::{DocStore, Segment, LOOKUP_TOOL};
pub use prompt::{build_system_prompt, load_images, task_message, PromptSources, ENTRY_POINT};
pub use renderer::{PythonRenderer, RenderedVideo, Renderer, QUALITIES};
