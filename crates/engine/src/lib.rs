//! Client-side mirror of the dispatch authority.
//!
//! The engine pulls every authority collection into one [`Snapshot`], projects
//! it onto the pixel grid, and turns operator input into authority commands.
//! Nothing here owns simulation state: the authority is the only source of
//! truth and the mirror is replaced wholesale on every sync.

pub mod animate;
pub mod authority;
pub mod config;
pub mod gateway;
pub mod grid;
pub mod interaction;
pub mod notify;
pub mod store;
pub mod sync;
pub mod tables;

#[cfg(test)]
mod fake;
#[cfg(test)]
mod tests;

pub use animate::{ease_out_cubic, AnimatedNode, AnimationScheduler};
pub use authority::{Authority, AuthorityError, HttpAuthority};
pub use config::EngineConfig;
pub use gateway::{CommandError, CommandGateway, RideDraft, ValidationError};
pub use grid::{
    manhattan_path, GridMapper, GridRenderer, Marker, MarkerKind, NodeHandle, PixelPos, RenderLayer,
};
pub use interaction::{
    dispatch, Cursor, InteractionController, InteractionMode, ModeChange, Placed, Placement,
};
pub use notify::{NotificationEntry, NotificationQueue, Notifier, Phase, Severity};
pub use store::{Snapshot, StateStore};
pub use sync::{spawn_poller, SyncEngine, SyncOutcome, REFRESH_FAILED};
pub use tables::{driver_rows, ride_rows, rider_rows, DriverRow, RideForm, RideRow, RiderRow};

pub use dispatchgrid_protocol as protocol;
