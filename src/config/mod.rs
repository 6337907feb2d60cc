mod settings;

pub use settings::{AgentSettings, ServerSettings};
