mod commands;
mod handlers;

pub use commands::{Cli, Commands};
pub use handlers::{
    handle_add, handle_collapse, handle_delete, handle_edit, handle_get, handle_init, handle_list,
    handle_login, handle_logout, handle_pin, handle_private, handle_queue, handle_reorder,
    handle_sync, handle_transfer,
};
