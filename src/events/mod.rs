//! # Events Module
//!
//! The pipeline reports status strings, progress counters and the final
//! groups through a channel, so any front end can subscribe.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         match event {
//!             Event::Pipeline(PipelineEvent::Status { message }) => println!("{message}"),
//!             Event::Read(ReadEvent::Progress { current, total }) => println!("{current}/{total}"),
//!             _ => {}
//!         }
//!     }
//! });
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
