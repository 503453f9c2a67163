//! Isai Core - Playback engine
//!
//! This crate provides the playback engine of the isai storefront client:
//! track resolution against the catalog, queue navigation, progress
//! synchronization, the visualizer, host media-session integration, and an
//! audio sink that decodes and plays catalog media.

pub mod audio_sink;
pub mod catalog;
pub mod command;
pub mod decoder;
pub mod media_session;
pub mod output;
pub mod player;
pub mod progress;
pub mod queue;
pub mod remote;
pub mod sink;
pub mod track;
pub mod transport;
pub mod visualizer;

#[cfg( test )]
mod testing;

pub use audio_sink::AudioSink;
pub use catalog::{ CatalogError, CatalogSnapshot, Playlist, RemoteCatalog };
pub use command::{ Command, CommandError };
pub use media_session::{ ActionHandler, MediaAction, MediaSessionHost, NowPlaying };
pub use player::{ Player, PlayerEvent, SessionSnapshot, DEFAULT_VOLUME };
pub use progress::{ format_time, Progress };
pub use remote::HttpCatalog;
pub use sink::{ MediaSink, SinkError, SinkEvent, SinkNotifier };
pub use track::{ Track, TrackId };
pub use transport::TransportState;
pub use visualizer::{ Visualizer, VisualizerState, BARS };
