//! Workspace agent loop, role tables, and cooperative cancellation.

pub mod cancellation;
pub mod roles;
pub mod workspace;

pub use cancellation::CancellationRegistry;
pub use roles::{build_system_prompt, role_profile, RoleProfile};
pub use workspace::{WorkspaceAgent, DEFAULT_MAX_ITERATIONS};
