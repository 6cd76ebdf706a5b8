//! # Events Module
//!
//! Progress reporting decoupled from presentation.
//!
//! The pipeline emits events through a channel; the CLI (or anything else)
//! subscribes and renders them. Nothing in the core waits on a consumer.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Hash(HashEvent::Progress(p)) = event {
//!             println!("{} fingerprinted", p.completed);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&root, &store, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
