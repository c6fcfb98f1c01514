pub mod items;
pub mod sync;

pub use items::{handle_checksum, handle_collect, handle_normalize, handle_verify};
pub use sync::{handle_login, handle_logs_command, handle_send, handle_status, SendOptions};
