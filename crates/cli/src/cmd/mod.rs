mod dump;
mod replay;

pub use dump::cmd_dump;
pub use replay::{ReplayOptions, UploaderKind, cmd_replay};
