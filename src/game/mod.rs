pub mod judgment;
pub mod note;
pub mod scheduler;
pub mod session;
pub mod timing_windows;
pub mod touch_note;

#[cfg(test)]
mod harness;
