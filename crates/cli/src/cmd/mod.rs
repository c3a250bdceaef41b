mod info;
mod install;
mod list;
mod lock;
mod shims;
mod uninstall;

pub use info::cmd_info;
pub use install::cmd_install;
pub use list::cmd_list;
pub use lock::{LockCommand, cmd_lock};
pub use shims::cmd_shims;
pub use uninstall::cmd_uninstall;
