//! Transport state machine

use serde::{ Deserialize, Serialize };


/// Current transport state of the single media sink.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
pub enum TransportState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}


/// Inputs that move the transport between states.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum TransportEvent {
    /// A new source was loaded and a play request issued.
    LoadIssued,
    /// The pending play request succeeded.
    PlayStarted,
    /// The pending play request was refused.
    PlayRejected,
    /// Playback resumed on the already loaded source.
    ResumeIssued,
    PauseIssued,
    Ended,
    /// The sink gave up on the current source.
    Failed,
}


impl TransportState {
    /// Applies an event and returns the next state.
    pub fn on( self, event: TransportEvent ) -> Self {
        use TransportEvent as E;
        use TransportState as S;

        match ( self, event ) {
            ( _, E::LoadIssued ) => S::Loading,

            ( S::Loading, E::PlayStarted ) => S::Playing,
            ( S::Loading, E::PlayRejected ) => S::Paused,
            // Outcome of a request nobody is waiting for any more
            ( state @ ( S::Stopped | S::Playing | S::Paused ), E::PlayStarted | E::PlayRejected ) => state,

            ( _, E::ResumeIssued ) => S::Playing,

            ( S::Loading | S::Playing, E::PauseIssued ) => S::Paused,
            ( state @ ( S::Stopped | S::Paused ), E::PauseIssued ) => state,

            ( _, E::Ended | E::Failed ) => S::Stopped,
        }
    }


    /// Returns true while audio is (supposed to be) audible.
    pub fn is_playing( self ) -> bool {
        self == TransportState::Playing
    }


    /// Short label for status lines.
    pub fn label( self ) -> &'static str {
        match self {
            TransportState::Stopped => "Stopped",
            TransportState::Loading => "Loading",
            TransportState::Playing => "Playing",
            TransportState::Paused => "Paused",
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use TransportEvent as E;
    use TransportState as S;


    #[test]
    fn test_load_then_play() {
        let state = S::Stopped.on( E::LoadIssued );
        assert_eq!( state, S::Loading );
        assert_eq!( state.on( E::PlayStarted ), S::Playing );
    }


    #[test]
    fn test_blocked_autoplay_pauses() {
        assert_eq!( S::Loading.on( E::PlayRejected ), S::Paused );
    }


    #[test]
    fn test_stale_outcomes_ignored() {
        assert_eq!( S::Paused.on( E::PlayStarted ), S::Paused );
        assert_eq!( S::Playing.on( E::PlayRejected ), S::Playing );
    }


    #[test]
    fn test_pause_and_end() {
        assert_eq!( S::Playing.on( E::PauseIssued ), S::Paused );
        assert_eq!( S::Stopped.on( E::PauseIssued ), S::Stopped );
        assert_eq!( S::Playing.on( E::Ended ), S::Stopped );
        assert_eq!( S::Stopped.on( E::ResumeIssued ), S::Playing );
    }
}
