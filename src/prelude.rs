//! Common imports.

pub use crate::app::{App, Threading};
pub use crate::command::Commands;
pub use crate::component::ComponentId;
pub use crate::entity::Entity;
pub use crate::error::{EcsError, Result};
pub use crate::observer::TriggerKind;
pub use crate::query::Query;
pub use crate::schedule::stage;
pub use crate::system::SystemCtx;
pub use crate::world::World;
