//! WordPress update driver: schema-tolerant status handling, the plugin
//! update ladder, core updates and the outdated-fetch summary.

pub mod outdated;
pub mod status;
pub mod tasks;
pub mod updater;

pub use status::{coerce_status, select_outdated_plugins, StatusView};
pub use updater::{UpdaterConfig, WpUpdater};
