//! Media sink abstraction
//!
//! The sink is the single rendering element that actually plays audio. It
//! is driven by the player and reports back asynchronously through
//! `SinkEvent`s delivered on the player's event channel.

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::player::PlayerEvent;


/// Errors reported by a media sink.
#[derive( Debug, Clone, PartialEq, Error )]
pub enum SinkError {
    /// The play request was refused (no output device, policy block).
    #[error( "Playback blocked: {0}" )]
    Blocked( String ),

    /// The request was superseded by a newer source.
    #[error( "Playback aborted" )]
    Aborted,

    #[error( "Network error: {0}" )]
    Network( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Audio output error: {0}" )]
    Output( String ),
}


/// Notifications emitted by a sink.
#[derive( Debug, Clone, PartialEq )]
pub enum SinkEvent {
    /// Periodic position report while playing.
    TimeUpdate { position: f64, duration: Option<f64> },

    /// The source's duration became known.
    MetadataLoaded { duration: Option<f64> },

    /// Outcome of the play request tagged with `ticket`.
    PlayResolved { ticket: u64, result: Result<(), SinkError> },

    /// The source played to its end.
    Ended,

    /// Unrecoverable transport failure on the current source.
    Error( SinkError ),
}


/// Cloneable handle a sink uses to report events to the player.
#[derive( Debug, Clone )]
pub struct SinkNotifier {
    tx: UnboundedSender<PlayerEvent>,
}


impl SinkNotifier {
    /// Wraps the player's event sender.
    pub fn new( tx: UnboundedSender<PlayerEvent> ) -> Self {
        Self { tx }
    }


    /// Sends an event about the load tagged `source`. A closed channel
    /// means the player is gone, which is fine.
    pub fn notify( &self, source: u64, event: SinkEvent ) {
        let _ = self.tx.send( PlayerEvent::Sink { source, event } );
    }
}


/// Operations the player issues against its sink.
///
/// Assigning a new source aborts whatever the previous source was doing.
pub trait MediaSink {
    /// Replaces the current source.
    fn set_source( &mut self, url: &str );

    /// Starts loading the current source. Every event about this load,
    /// including play outcomes, is reported with the same `source` tag.
    fn load( &mut self, source: u64 );

    /// Requests playback. The outcome arrives later as
    /// `SinkEvent::PlayResolved` carrying the same `ticket`.
    fn play( &mut self, ticket: u64 );

    /// Pauses playback.
    fn pause( &mut self );

    /// Current position in seconds.
    fn current_time( &self ) -> f64;

    /// Moves the play head.
    fn set_current_time( &mut self, seconds: f64 );

    /// Duration of the current source, once known.
    fn duration( &self ) -> Option<f64>;

    /// Applies a volume in `[0, 1]`.
    fn set_volume( &mut self, volume: f32 );

    /// Applies the mute flag without touching volume.
    fn set_muted( &mut self, muted: bool );
}
