//! Host media-session integration
//!
//! Publishes now-playing metadata to the operating system's media surface
//! and wires its transport buttons back into the player.

use tokio::sync::mpsc::UnboundedSender;

use crate::command::Command;
use crate::player::PlayerEvent;
use crate::track::Track;
use crate::transport::TransportState;


/// Transport buttons exposed by a host media session.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum MediaAction {
    Play,
    Pause,
    PreviousTrack,
    NextTrack,
}


impl MediaAction {
    /// The four actions registered on every track change.
    pub const ALL: [ MediaAction; 4 ] = [
        MediaAction::Play,
        MediaAction::Pause,
        MediaAction::PreviousTrack,
        MediaAction::NextTrack,
    ];


    /// Player command bound to this action. Both play and pause toggle.
    pub fn command( self ) -> Command {
        match self {
            MediaAction::Play | MediaAction::Pause => Command::TogglePlayPause,
            MediaAction::PreviousTrack => Command::Prev,
            MediaAction::NextTrack => Command::Next,
        }
    }
}


/// Metadata shown by the host for the current track.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: String,
}


impl From<&Track> for NowPlaying {
    fn from( track: &Track ) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist_name.clone(),
            album: track.album().to_string(),
        }
    }
}


/// Callback target for a host action. Invoking it queues the bound command
/// on the player's event channel, so it is safe to call from any thread.
#[derive( Debug, Clone )]
pub struct ActionHandler {
    tx: UnboundedSender<PlayerEvent>,
    command: Command,
}


impl ActionHandler {
    /// Binds `command` to the player's event channel.
    pub fn new( tx: UnboundedSender<PlayerEvent>, command: Command ) -> Self {
        Self { tx, command }
    }


    /// Gets the bound command.
    pub fn command( &self ) -> &Command {
        &self.command
    }


    /// Fires the bound command.
    pub fn invoke( &self ) {
        if self.tx.send( PlayerEvent::Command( self.command.clone() ) ).is_err() {
            tracing::debug!( "Media action dropped, player is gone" );
        }
    }
}


/// Host media-session surface.
pub trait MediaSessionHost {
    /// Replaces the now-playing metadata.
    fn set_metadata( &mut self, now_playing: &NowPlaying );

    /// Registers (or re-registers) the handler for `action`.
    fn set_action_handler( &mut self, action: MediaAction, handler: ActionHandler );

    /// Mirrors the transport state, for hosts that display it.
    fn set_playback_state( &mut self, _state: TransportState ) {}
}


/// Host used when the platform has no media session.
#[derive( Debug, Default )]
pub struct NoMediaSession;


impl MediaSessionHost for NoMediaSession {
    fn set_metadata( &mut self, _now_playing: &NowPlaying ) {}

    fn set_action_handler( &mut self, _action: MediaAction, _handler: ActionHandler ) {}
}


/// Publishes track changes to a host media session.
pub struct SessionAdapter {
    host: Box<dyn MediaSessionHost>,
    tx: UnboundedSender<PlayerEvent>,
}


impl SessionAdapter {
    /// Creates an adapter around `host`.
    pub fn new( host: Box<dyn MediaSessionHost>, tx: UnboundedSender<PlayerEvent> ) -> Self {
        Self { host, tx }
    }


    /// Publishes metadata and re-registers all transport handlers.
    pub fn track_started( &mut self, track: &Track ) {
        let now_playing = NowPlaying::from( track );
        tracing::debug!(
            title = %now_playing.title,
            artist = %now_playing.artist,
            "Publishing media session metadata"
        );
        self.host.set_metadata( &now_playing );

        for action in MediaAction::ALL {
            let handler = ActionHandler::new( self.tx.clone(), action.command() );
            self.host.set_action_handler( action, handler );
        }
    }


    /// Forwards a transport change.
    pub fn state_changed( &mut self, state: TransportState ) {
        self.host.set_playback_state( state );
    }
}


impl std::fmt::Debug for SessionAdapter {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "SessionAdapter" ).finish_non_exhaustive()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;
    use tokio::sync::mpsc;


    #[test]
    fn test_handlers_registered_every_track() {
        let ( tx, mut rx ) = mpsc::unbounded_channel();
        let host = RecordingSession::default();
        let log = host.log();
        let mut adapter = SessionAdapter::new( Box::new( host ), tx );

        let mut track = Track::new( 1, "Title", "Artist", "1.mp3" );
        adapter.track_started( &track );
        track.album_name = Some( "Album".into() );
        adapter.track_started( &track );

        let log = log.borrow();
        assert_eq!( log.metadata.len(), 2 );
        assert_eq!( log.metadata[ 0 ].album, "" );
        assert_eq!( log.metadata[ 1 ].album, "Album" );
        assert_eq!( log.registrations, 8 );

        log.handlers[ &MediaAction::NextTrack ].invoke();
        match rx.try_recv() {
            Ok( PlayerEvent::Command( Command::Next ) ) => {}
            other => panic!( "unexpected event: {:?}", other ),
        }
    }


    #[test]
    fn test_play_and_pause_both_toggle() {
        assert_eq!( MediaAction::Play.command(), Command::TogglePlayPause );
        assert_eq!( MediaAction::Pause.command(), Command::TogglePlayPause );
        assert_eq!( MediaAction::PreviousTrack.command(), Command::Prev );
    }
}
