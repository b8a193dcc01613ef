//! The agent-to-agent command surface.

pub mod dispatcher;

pub use dispatcher::CommandDispatcher;
