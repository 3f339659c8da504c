//! # BotBot Core
//!
//! Leaf types shared by every layer of the BotBot plugin runner.
//!
//! ## Contents
//!
//! - **Envelope**: [`Packet`] is the JSON shape the external bot process puts
//!   on the inbound queue, [`Line`] is the parsed, immutable event plugins see.
//!   [`AddressPattern`] detects messages addressed to the bot.
//! - **Metadata**: [`ChatBot`], [`Channel`] and [`LogEntry`] mirror the records
//!   owned by the web application's data store.
//! - **Seams**: [`MetadataStore`], [`LogStore`], [`KvBackend`],
//!   [`InboundQueue`] and [`OutboundQueue`] are the only ways the runner talks
//!   to the outside world.
//! - **In-memory collaborators**: [`MemoryStore`], [`MemoryKv`] and
//!   [`MemoryQueue`] implement those seams in process.
//!
//! ## Example
//!
//! ```rust
//! use botbot_core::{AddressPattern, Line, Packet};
//!
//! let packet = Packet::from_json(
//!     r##"{"Content":"botbot: ping","User":"alice","ChatBotId":1,
//!         "Channel":"#test","Command":"PRIVMSG",
//!         "Received":"2020-01-01T00:00:00.000000000Z"}"##,
//! )
//! .unwrap();
//! let address = AddressPattern::new("botbot").unwrap();
//! let line = Line::new(packet, &address).unwrap();
//!
//! assert!(line.is_direct_message());
//! assert_eq!(line.text(), "ping");
//! ```

pub mod error;
pub mod line;
pub mod memory;
pub mod model;
pub mod store;
pub mod timestamp;

pub use error::{LineError, LineResult, QueueError, QueueResult, StoreError, StoreResult};
pub use line::{AddressPattern, Command, Line, Packet};
pub use memory::{ActivationChange, MemoryKv, MemoryQueue, MemoryStore, MetadataSnapshot};
pub use model::{CHANNEL_PREFIXES, Channel, ChannelId, ChatBot, ChatBotId, LogEntry, is_channel_name};
pub use store::{InboundQueue, KvBackend, LogStore, MetadataStore, OutboundQueue, PluginSettings};
pub use timestamp::convert_nano_timestamp;
