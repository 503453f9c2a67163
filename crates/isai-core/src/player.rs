//! Core player implementation
//!
//! The Player is the single playback context of the application. It owns
//! the media sink, the play queue and the session state, and is driven from
//! one thread through `&mut self`. Work that has to wait (remote lookups,
//! telemetry writes, the sink's play requests) reports back as
//! `PlayerEvent`s which the owner feeds into `handle_event`.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::catalog::{ resolve_local, CatalogError, CatalogSnapshot, RemoteCatalog };
use crate::command::Command;
use crate::media_session::{ MediaSessionHost, NoMediaSession, SessionAdapter };
use crate::progress::{ Progress, ProgressSync };
use crate::queue::{ Queue, RESTART_THRESHOLD_SECS };
use crate::sink::{ MediaSink, SinkError, SinkEvent };
use crate::track::{ Track, TrackId };
use crate::transport::{ TransportEvent, TransportState };


/// Volume used until the user changes it.
pub const DEFAULT_VOLUME: f32 = 0.7;


/// Messages delivered to the player's owner for `Player::handle_event`.
#[derive( Debug )]
pub enum PlayerEvent {
    /// Notification from the media sink about the load tagged `source`.
    Sink { source: u64, event: SinkEvent },

    /// A remote track lookup finished.
    Resolved {
        generation: u64,
        id: TrackId,
        result: Result<Option<Track>, CatalogError>,
    },

    /// The server counted a play.
    PlayRecorded { id: TrackId },

    /// The server toggled a like.
    LikeConfirmed { id: TrackId, liked: bool },

    /// A command from outside the UI thread (host media keys).
    Command( Command ),
}


/// Read-only view of the session, rendered by every surface.
#[derive( Debug, Clone, PartialEq )]
pub struct SessionSnapshot {
    pub track: Option<Track>,
    pub state: TransportState,
    pub volume: f32,
    pub muted: bool,
    pub shuffle: bool,
    pub repeat: bool,
    pub position: f64,
    pub duration: Option<f64>,
}


/// Core audio player.
pub struct Player<S: MediaSink> {
    sink: S,
    remote: Arc<dyn RemoteCatalog>,
    tx: UnboundedSender<PlayerEvent>,
    queue: Queue,
    catalog: CatalogSnapshot,
    current: Option<Track>,
    transport: TransportState,
    volume: f32,
    muted: bool,
    shuffle: bool,
    repeat: bool,
    /// Stamped on every `play()`; remote lookups from older requests are dropped.
    generation: u64,
    /// Source of play request tickets.
    next_ticket: u64,
    /// Tag of the latest sink load; events about older loads are dropped.
    source: u64,
    /// Ticket of the play request that follows the current load.
    load_ticket: Option<u64>,
    /// Sink failures in a row without a successful start.
    failures: usize,
    rng: StdRng,
    progress: ProgressSync,
    session: SessionAdapter,
}


impl<S: MediaSink> Player<S> {
    /// Creates a player around `sink`. `tx` must be the sender whose
    /// receiver is drained into `handle_event`.
    pub fn new( mut sink: S, remote: Arc<dyn RemoteCatalog>, tx: UnboundedSender<PlayerEvent> ) -> Self {
        sink.set_volume( DEFAULT_VOLUME );
        sink.set_muted( false );

        let session = SessionAdapter::new( Box::new( NoMediaSession ), tx.clone() );

        Self {
            sink,
            remote,
            tx,
            queue: Queue::new(),
            catalog: CatalogSnapshot::new(),
            current: None,
            transport: TransportState::Stopped,
            volume: DEFAULT_VOLUME,
            muted: false,
            shuffle: false,
            repeat: false,
            generation: 0,
            next_ticket: 0,
            source: 0,
            load_ticket: None,
            failures: 0,
            rng: StdRng::from_os_rng(),
            progress: ProgressSync::new(),
            session,
        }
    }


    /// Publishes track changes to `host`.
    pub fn with_media_session( mut self, host: Box<dyn MediaSessionHost> ) -> Self {
        self.session = SessionAdapter::new( host, self.tx.clone() );
        self
    }


    /// Uses a seeded shuffle source.
    pub fn with_seed( mut self, seed: u64 ) -> Self {
        self.rng = StdRng::seed_from_u64( seed );
        self
    }


    /// Plays the track with the given id.
    ///
    /// Resolution looks at the queue, then the catalog snapshot, and only
    /// then asks the remote catalog. A track that cannot be found anywhere
    /// leaves the session untouched. A pick by the user clears the run of
    /// failures that stops auto-advance.
    pub fn play( &mut self, id: impl Into<TrackId> ) {
        self.failures = 0;
        self.request( id.into() );
    }


    fn request( &mut self, id: TrackId ) {
        self.generation += 1;
        let generation = self.generation;

        if let Some(( track, from )) = resolve_local( self.queue.tracks(), &self.catalog, &id ) {
            tracing::debug!( %id, ?from, "Resolved track locally" );
            self.start_track( track );
            return;
        }

        tracing::debug!( %id, generation, "Resolving track remotely" );
        let remote = Arc::clone( &self.remote );
        let tx = self.tx.clone();
        tokio::spawn( async move {
            let result = remote.fetch_track( &id ).await;
            let _ = tx.send( PlayerEvent::Resolved { generation, id, result } );
        });
    }


    fn start_track( &mut self, track: Track ) {
        tracing::info!( id = %track.id, title = %track.title, "Loading track" );

        if self.queue.is_empty() && !self.catalog.is_empty() {
            tracing::debug!( tracks = self.catalog.len(), "Seeding queue from catalog" );
            self.queue.replace( self.catalog.tracks().to_vec() );
        }

        self.sink.set_source( &track.audio_url );
        self.source += 1;
        self.sink.load( self.source );
        self.set_transport( TransportEvent::LoadIssued );

        let hint = Some( track.duration as f64 ).filter( |d| *d > 0.0 );
        self.progress.reset( hint );
        self.session.track_started( &track );
        self.current = Some( track );

        let ticket = self.issue_ticket();
        self.load_ticket = Some( ticket );
        self.sink.play( ticket );
    }


    fn issue_ticket( &mut self ) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }


    fn set_transport( &mut self, event: TransportEvent ) {
        let next = self.transport.on( event );
        if next != self.transport {
            tracing::info!( from = self.transport.label(), to = next.label(), "Transport changed" );
            self.transport = next;
            self.session.state_changed( next );
        }
    }


    /// Toggles between playing and paused. With nothing loaded, starts the
    /// first track of the catalog snapshot.
    pub fn toggle_play_pause( &mut self ) {
        if self.current.is_none() {
            if let Some( first ) = self.catalog.first() {
                let id = first.id.clone();
                self.play( id );
            }
            return;
        }

        match self.transport {
            TransportState::Playing | TransportState::Loading => {
                self.sink.pause();
                self.load_ticket = None;
                self.set_transport( TransportEvent::PauseIssued );
            }
            TransportState::Paused | TransportState::Stopped => self.resume(),
        }
    }


    fn resume( &mut self ) {
        let ticket = self.issue_ticket();
        self.sink.play( ticket );
        self.set_transport( TransportEvent::ResumeIssued );
    }


    /// Plays the next track. Shuffle picks uniformly from the whole queue.
    pub fn next( &mut self ) {
        self.failures = 0;
        self.advance();
    }


    /// Moves to the next track without clearing the failure run.
    fn advance( &mut self ) {
        let current = self.current.as_ref().map( |t| t.id.clone() );
        let Some( index ) = self.queue.next_index( current.as_ref(), self.shuffle, &mut self.rng ) else {
            return;
        };
        if let Some( track ) = self.queue.get( index ) {
            let id = track.id.clone();
            self.request( id );
        }
    }


    /// Restarts the current track when more than three seconds in,
    /// otherwise plays the previous track.
    pub fn prev( &mut self ) {
        if self.queue.is_empty() {
            return;
        }

        if self.current.is_some() && self.sink.current_time() > RESTART_THRESHOLD_SECS {
            self.sink.set_current_time( 0.0 );
            self.progress.tick( 0.0, self.sink.duration() );
            return;
        }

        let current = self.current.as_ref().map( |t| t.id.clone() );
        let Some( index ) = self.queue.previous_index( current.as_ref() ) else {
            return;
        };
        if let Some( track ) = self.queue.get( index ) {
            let id = track.id.clone();
            self.play( id );
        }
    }


    /// Toggles shuffle.
    pub fn toggle_shuffle( &mut self ) {
        self.shuffle = !self.shuffle;
        tracing::info!( shuffle = self.shuffle, "Shuffle toggled" );
    }


    /// Toggles repeat of the current track.
    pub fn toggle_repeat( &mut self ) {
        self.repeat = !self.repeat;
        tracing::info!( repeat = self.repeat, "Repeat toggled" );
    }


    /// Sets shuffle from a stored preference.
    pub fn set_shuffle( &mut self, shuffle: bool ) {
        self.shuffle = shuffle;
    }


    /// Sets repeat from a stored preference.
    pub fn set_repeat( &mut self, repeat: bool ) {
        self.repeat = repeat;
    }


    fn known_duration( &self ) -> Option<f64> {
        self.sink.duration().filter( |d| d.is_finite() && *d > 0.0 )
    }


    /// Seeks to a fraction of the duration. Ignored while the duration is unknown.
    pub fn seek( &mut self, fraction: f64 ) {
        if self.current.is_none() || !fraction.is_finite() {
            return;
        }
        if let Some( duration ) = self.known_duration() {
            self.move_play_head( fraction.clamp( 0.0, 1.0 ) * duration );
        }
    }


    /// Seeks to an absolute position, clamped to the duration when known.
    pub fn seek_to( &mut self, seconds: f64 ) {
        if self.current.is_none() || !seconds.is_finite() {
            return;
        }
        let mut target = seconds.max( 0.0 );
        if let Some( duration ) = self.known_duration() {
            target = target.min( duration );
        }
        self.move_play_head( target );
    }


    /// Seeks relative to the current position. Forward seeks need a known
    /// duration; backward seeks stop at zero.
    pub fn seek_by( &mut self, seconds: f64 ) {
        if self.current.is_none() || !seconds.is_finite() {
            return;
        }
        let now = self.sink.current_time();
        let target = if seconds >= 0.0 {
            match self.known_duration() {
                Some( duration ) => ( now + seconds ).min( duration ),
                None => return,
            }
        } else {
            ( now + seconds ).max( 0.0 )
        };
        self.move_play_head( target );
    }


    fn move_play_head( &mut self, seconds: f64 ) {
        tracing::debug!( seconds, "Seeking" );
        self.sink.set_current_time( seconds );
        self.progress.tick( seconds, self.sink.duration() );
    }


    /// Sets the volume, clamped to `[0, 1]`.
    pub fn set_volume( &mut self, level: f32 ) {
        if !level.is_finite() {
            return;
        }
        self.volume = level.clamp( 0.0, 1.0 );
        self.sink.set_volume( self.volume );
    }


    /// Changes the volume by `delta`.
    pub fn adjust_volume( &mut self, delta: f32 ) {
        self.set_volume( self.volume + delta );
    }


    /// Toggles mute. Volume is kept.
    pub fn toggle_mute( &mut self ) {
        self.muted = !self.muted;
        self.sink.set_muted( self.muted );
    }


    /// Asks the server to flip the like flag of the current track. The
    /// local flag changes once the server answers.
    pub fn toggle_like( &mut self ) {
        let Some( track ) = &self.current else {
            return;
        };
        let id = track.id.clone();
        let remote = Arc::clone( &self.remote );
        let tx = self.tx.clone();
        tokio::spawn( async move {
            match remote.toggle_like( &id ).await {
                Ok( liked ) => {
                    let _ = tx.send( PlayerEvent::LikeConfirmed { id, liked } );
                }
                Err( e ) => tracing::warn!( %id, "Failed to toggle like: {}", e ),
            }
        });
    }


    fn record_play( &self, id: TrackId ) {
        let remote = Arc::clone( &self.remote );
        let tx = self.tx.clone();
        tokio::spawn( async move {
            match remote.record_play( &id ).await {
                Ok(()) => {
                    let _ = tx.send( PlayerEvent::PlayRecorded { id } );
                }
                Err( e ) => tracing::warn!( %id, "Failed to record play: {}", e ),
            }
        });
    }


    /// Replaces the last-known catalog listing.
    pub fn set_catalog( &mut self, tracks: Vec<Track> ) {
        self.catalog.replace( tracks );
    }


    /// Replaces the play queue without touching playback.
    pub fn replace_queue( &mut self, tracks: Vec<Track> ) {
        self.queue.replace( tracks );
    }


    /// Replaces the queue and plays its first track.
    pub fn play_all( &mut self, tracks: Vec<Track> ) {
        let Some( first ) = tracks.first() else {
            return;
        };
        let id = first.id.clone();
        self.queue.replace( tracks );
        self.play( id );
    }


    /// Runs a command. Returns false for commands the player does not own
    /// (catalog pages and UI toggles).
    pub fn execute( &mut self, command: &Command ) -> bool {
        match command {
            Command::Play { id } => self.play( id.clone() ),
            Command::TogglePlayPause => self.toggle_play_pause(),
            Command::Next => self.next(),
            Command::Prev => self.prev(),
            Command::Shuffle => self.toggle_shuffle(),
            Command::Repeat => self.toggle_repeat(),
            Command::Seek { fraction } => self.seek( *fraction ),
            Command::SeekTo { position } => self.seek_to( position.as_secs_f64() ),
            Command::SeekBy { seconds } => self.seek_by( *seconds ),
            Command::Volume { level } => self.set_volume( *level ),
            Command::VolumeBy { delta } => self.adjust_volume( *delta ),
            Command::Mute => self.toggle_mute(),
            Command::Like => self.toggle_like(),
            Command::Liked
            | Command::Playlist { .. }
            | Command::Search { .. }
            | Command::Home
            | Command::Expand
            | Command::Help
            | Command::Quit => return false,
        }
        true
    }


    /// Applies an asynchronous result.
    pub fn handle_event( &mut self, event: PlayerEvent ) {
        match event {
            PlayerEvent::Sink { source, event } => {
                if source != self.source {
                    tracing::debug!( source, current = self.source, ?event, "Dropping event from replaced source" );
                    return;
                }
                self.on_sink_event( event );
            }
            PlayerEvent::Resolved { generation, id, result } => {
                if generation != self.generation {
                    tracing::debug!( %id, generation, current = self.generation, "Dropping stale lookup" );
                    return;
                }
                match result {
                    Ok( Some( track ) ) => self.start_track( track ),
                    Ok( None ) => tracing::warn!( %id, "Track not found" ),
                    Err( e ) => tracing::warn!( %id, "Track lookup failed: {}", e ),
                }
            }
            PlayerEvent::PlayRecorded { id } => self.update_track( &id, |t| t.plays += 1 ),
            PlayerEvent::LikeConfirmed { id, liked } => self.update_track( &id, |t| t.liked = liked ),
            PlayerEvent::Command( command ) => {
                self.execute( &command );
            }
        }
    }


    fn update_track( &mut self, id: &TrackId, apply: impl Fn( &mut Track ) ) {
        if let Some( track ) = self.current.as_mut().filter( |t| &t.id == id ) {
            apply( track );
        }
        if let Some( track ) = self.queue.find_mut( id ) {
            apply( track );
        }
        if let Some( track ) = self.catalog.find_mut( id ) {
            apply( track );
        }
    }


    fn on_sink_event( &mut self, event: SinkEvent ) {
        match event {
            SinkEvent::TimeUpdate { position, duration } => {
                self.progress.tick( position, duration );
            }
            SinkEvent::MetadataLoaded { duration } => {
                self.progress.tick( self.sink.current_time(), duration );
            }
            SinkEvent::PlayResolved { ticket, result } => self.on_play_resolved( ticket, result ),
            SinkEvent::Ended => self.on_ended(),
            SinkEvent::Error( SinkError::Aborted ) => {}
            SinkEvent::Error( e ) => self.on_sink_failure( e ),
        }
    }


    fn on_play_resolved( &mut self, ticket: u64, result: Result<(), SinkError> ) {
        if self.load_ticket != Some( ticket ) {
            if let Err( e ) = result {
                if e != SinkError::Aborted {
                    tracing::warn!( ticket, "Resume rejected: {}", e );
                }
            }
            return;
        }
        self.load_ticket = None;

        match result {
            Ok(()) => {
                self.failures = 0;
                self.set_transport( TransportEvent::PlayStarted );
                if let Some( track ) = &self.current {
                    self.record_play( track.id.clone() );
                }
            }
            Err( SinkError::Blocked( reason ) ) => {
                tracing::info!( "Playback blocked, waiting for the user: {}", reason );
                self.set_transport( TransportEvent::PlayRejected );
            }
            Err( SinkError::Aborted ) => {}
            Err( e ) => self.on_sink_failure( e ),
        }
    }


    fn on_ended( &mut self ) {
        if self.repeat && self.current.is_some() {
            tracing::debug!( "Repeating track" );
            self.sink.set_current_time( 0.0 );
            self.progress.tick( 0.0, self.sink.duration() );
            self.resume();
            return;
        }
        self.set_transport( TransportEvent::Ended );
        self.advance();
    }


    fn on_sink_failure( &mut self, error: SinkError ) {
        let id = self.current.as_ref().map( |t| t.id.to_string() ).unwrap_or_default();
        tracing::warn!( %id, "Playback failed: {}", error );

        self.load_ticket = None;
        self.set_transport( TransportEvent::Failed );
        self.failures += 1;

        if self.failures >= self.queue.len().max( 1 ) {
            tracing::warn!( failures = self.failures, "Every queued track failed, stopping" );
            self.failures = 0;
            return;
        }
        self.advance();
    }


    /// Registers a progress surface.
    pub fn subscribe_progress( &self ) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }


    /// Gets the session state for rendering.
    pub fn snapshot( &self ) -> SessionSnapshot {
        SessionSnapshot {
            track: self.current.clone(),
            state: self.transport,
            volume: self.volume,
            muted: self.muted,
            shuffle: self.shuffle,
            repeat: self.repeat,
            position: self.sink.current_time(),
            duration: self.sink.duration(),
        }
    }


    /// Gets the current track, if any.
    pub fn current( &self ) -> Option<&Track> {
        self.current.as_ref()
    }


    /// Gets the transport state.
    pub fn transport( &self ) -> TransportState {
        self.transport
    }


    /// Gets the play queue.
    pub fn queue( &self ) -> &Queue {
        &self.queue
    }


    /// Gets the catalog snapshot.
    pub fn catalog( &self ) -> &CatalogSnapshot {
        &self.catalog
    }


    /// Gets the volume in `[0, 1]`.
    pub fn volume( &self ) -> f32 {
        self.volume
    }


    /// Returns true when muted.
    pub fn is_muted( &self ) -> bool {
        self.muted
    }


    /// Returns true when shuffle is on.
    pub fn shuffle( &self ) -> bool {
        self.shuffle
    }


    /// Returns true when repeat is on.
    pub fn repeat( &self ) -> bool {
        self.repeat
    }


    /// Gets the sink.
    pub fn sink( &self ) -> &S {
        &self.sink
    }


    /// Gets the sink mutably.
    pub fn sink_mut( &mut self ) -> &mut S {
        &mut self.sink
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc::{ self, UnboundedReceiver };

    use crate::testing::{ FakeRemote, FakeSink, RecordingSession };


    fn tracks( n: i64 ) -> Vec<Track> {
        ( 1..=n )
            .map( |i| {
                let mut track = Track::new( i, format!( "Song {}", i ), "Artist", format!( "/audio/{}.mp3", i ) );
                track.duration = 200;
                track
            })
            .collect()
    }


    fn setup( n: i64 ) -> ( Player<FakeSink>, UnboundedReceiver<PlayerEvent>, Arc<FakeRemote> ) {
        let ( tx, rx ) = mpsc::unbounded_channel();
        let remote = Arc::new( FakeRemote::default() );
        let mut player = Player::new( FakeSink::default(), remote.clone(), tx ).with_seed( 7 );
        player.set_catalog( tracks( n ) );
        ( player, rx, remote )
    }


    /// Delivers a sink event about the latest load.
    fn sink_event( player: &mut Player<FakeSink>, event: SinkEvent ) {
        let source = player.sink().source;
        player.handle_event( PlayerEvent::Sink { source, event } );
    }


    /// Resolves the sink's latest play request.
    fn resolve_play( player: &mut Player<FakeSink>, result: Result<(), SinkError> ) {
        let ticket = *player.sink().plays.last().expect( "no play request issued" );
        sink_event( player, SinkEvent::PlayResolved { ticket, result } );
    }


    fn current_id( player: &Player<FakeSink> ) -> Option<String> {
        player.current().map( |t| t.id.to_string() )
    }


    #[tokio::test]
    async fn test_play_local_track_loads_sink() {
        let ( mut player, _rx, remote ) = setup( 3 );

        player.play( 2 );
        assert_eq!( player.transport(), TransportState::Loading );
        assert_eq!( player.sink().sources, vec![ "/audio/2.mp3".to_string() ] );
        assert_eq!( player.sink().loads, 1 );
        assert_eq!( player.queue().len(), 3 );

        resolve_play( &mut player, Ok(()) );
        assert_eq!( player.transport(), TransportState::Playing );
        assert_eq!( remote.fetches.load( Ordering::SeqCst ), 0 );
    }


    #[tokio::test]
    async fn test_queue_first_resolution_skips_network() {
        let ( mut player, _rx, remote ) = setup( 0 );
        let mut queued = tracks( 2 );
        queued[ 1 ].title = "Queued copy".into();
        player.replace_queue( queued );
        player.set_catalog( tracks( 2 ) );

        player.play( "2" );
        assert_eq!( player.current().map( |t| t.title.as_str() ), Some( "Queued copy" ) );
        assert_eq!( remote.fetches.load( Ordering::SeqCst ), 0 );
    }


    #[tokio::test]
    async fn test_remote_resolution() {
        let ( mut player, mut rx, remote ) = setup( 2 );
        remote.add_track( Track::new( 50, "Remote", "Someone", "/audio/50.mp3" ) );

        player.play( 50 );
        assert!( player.current().is_none() );

        let event = rx.recv().await.unwrap();
        player.handle_event( event );
        assert_eq!( current_id( &player ).as_deref(), Some( "50" ) );
        assert_eq!( remote.fetches.load( Ordering::SeqCst ), 1 );
    }


    #[tokio::test]
    async fn test_not_found_changes_nothing() {
        let ( mut player, mut rx, _remote ) = setup( 2 );
        player.play( 1 );
        resolve_play( &mut player, Ok(()) );
        let recorded = rx.recv().await.unwrap();
        assert!( matches!( recorded, PlayerEvent::PlayRecorded { .. } ) );
        player.handle_event( recorded );
        let before = player.snapshot();

        player.play( 404 );
        let event = rx.recv().await.unwrap();
        player.handle_event( event );

        assert_eq!( player.snapshot(), before );
        assert_eq!( player.sink().sources.len(), 1 );
    }


    #[tokio::test]
    async fn test_last_request_wins() {
        let ( mut player, mut rx, remote ) = setup( 3 );
        remote.add_track( Track::new( 50, "Slow", "Someone", "/audio/50.mp3" ) );

        player.play( 50 );
        player.play( 3 );
        let event = rx.recv().await.unwrap();
        player.handle_event( event );

        assert_eq!( current_id( &player ).as_deref(), Some( "3" ) );
        assert_eq!( player.sink().sources, vec![ "/audio/3.mp3".to_string() ] );
    }


    #[tokio::test]
    async fn test_stale_play_outcome_ignored() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.play( 1 );
        let first = *player.sink().plays.last().unwrap();
        player.play( 2 );

        sink_event( &mut player, SinkEvent::PlayResolved { ticket: first, result: Ok(()) } );
        assert_eq!( player.transport(), TransportState::Loading );
    }


    #[tokio::test]
    async fn test_blocked_play_pauses_and_keeps_metadata() {
        let ( mut player, _rx, _remote ) = setup( 2 );
        player.play( 1 );
        resolve_play( &mut player, Err( SinkError::Blocked( "no device".into() ) ) );

        assert_eq!( player.transport(), TransportState::Paused );
        assert_eq!( current_id( &player ).as_deref(), Some( "1" ) );
    }


    #[tokio::test]
    async fn test_toggle_without_track_plays_first() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.toggle_play_pause();
        assert_eq!( current_id( &player ).as_deref(), Some( "1" ) );

        let ( mut empty, _rx, _remote ) = setup( 0 );
        empty.toggle_play_pause();
        assert!( empty.current().is_none() );
        assert!( empty.sink().sources.is_empty() );
    }


    #[tokio::test]
    async fn test_toggle_pauses_and_resumes() {
        let ( mut player, _rx, _remote ) = setup( 2 );
        player.play( 1 );
        resolve_play( &mut player, Ok(()) );

        player.toggle_play_pause();
        assert_eq!( player.transport(), TransportState::Paused );
        assert_eq!( player.sink().pauses, 1 );

        player.toggle_play_pause();
        assert_eq!( player.transport(), TransportState::Playing );

        // A refused resume is only logged
        resolve_play( &mut player, Err( SinkError::Blocked( "policy".into() ) ) );
        assert_eq!( player.transport(), TransportState::Playing );
    }


    #[tokio::test]
    async fn test_next_then_prev_returns() {
        let ( mut player, _rx, _remote ) = setup( 4 );
        player.play( 2 );
        player.next();
        assert_eq!( current_id( &player ).as_deref(), Some( "3" ) );
        player.prev();
        assert_eq!( current_id( &player ).as_deref(), Some( "2" ) );
    }


    #[tokio::test]
    async fn test_prev_restarts_after_threshold() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.play( 2 );
        resolve_play( &mut player, Ok(()) );

        player.sink_mut().time = 3.5;
        player.prev();
        assert_eq!( current_id( &player ).as_deref(), Some( "2" ) );
        assert_eq!( player.sink().time, 0.0 );

        player.sink_mut().time = 2.9;
        player.prev();
        assert_eq!( current_id( &player ).as_deref(), Some( "1" ) );
    }


    #[tokio::test]
    async fn test_navigation_on_empty_queue_is_noop() {
        let ( mut player, _rx, _remote ) = setup( 0 );
        player.next();
        player.prev();
        assert!( player.current().is_none() );
        assert_eq!( player.transport(), TransportState::Stopped );
    }


    #[tokio::test]
    async fn test_ended_with_repeat_restarts_same_track() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.toggle_repeat();
        player.play( 2 );
        resolve_play( &mut player, Ok(()) );
        player.sink_mut().time = 199.0;

        sink_event( &mut player, SinkEvent::Ended );

        assert_eq!( current_id( &player ).as_deref(), Some( "2" ) );
        assert_eq!( player.sink().time, 0.0 );
        assert_eq!( player.transport(), TransportState::Playing );
        assert_eq!( player.sink().plays.len(), 2 );
        assert_eq!( player.sink().sources.len(), 1 );
    }


    #[tokio::test]
    async fn test_ended_advances() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.play( 3 );
        resolve_play( &mut player, Ok(()) );

        sink_event( &mut player, SinkEvent::Ended );
        assert_eq!( current_id( &player ).as_deref(), Some( "1" ) );
        assert_eq!( player.transport(), TransportState::Loading );
    }


    #[tokio::test]
    async fn test_sink_errors_advance_then_stop() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.play( 1 );

        for _ in 0..2 {
            sink_event( &mut player, SinkEvent::Error( SinkError::Network( "reset".into() ) ) );
        }
        assert_eq!( current_id( &player ).as_deref(), Some( "3" ) );

        sink_event( &mut player, SinkEvent::Error( SinkError::Decode( "bad".into() ) ) );
        assert_eq!( player.transport(), TransportState::Stopped );
        assert_eq!( player.sink().sources.len(), 3 );
    }


    #[tokio::test]
    async fn test_user_pick_clears_failure_run() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.play( 1 );
        for _ in 0..2 {
            sink_event( &mut player, SinkEvent::Error( SinkError::Network( "reset".into() ) ) );
        }
        assert_eq!( current_id( &player ).as_deref(), Some( "3" ) );

        player.play( 1 );
        sink_event( &mut player, SinkEvent::Error( SinkError::Network( "reset".into() ) ) );
        assert_eq!( current_id( &player ).as_deref(), Some( "2" ) );
        assert_eq!( player.transport(), TransportState::Loading );
    }


    #[tokio::test]
    async fn test_ended_from_replaced_source_ignored() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.play( 1 );
        resolve_play( &mut player, Ok(()) );
        let replaced = player.sink().source;

        player.next();
        assert_eq!( current_id( &player ).as_deref(), Some( "2" ) );

        player.handle_event( PlayerEvent::Sink { source: replaced, event: SinkEvent::Ended } );
        assert_eq!( current_id( &player ).as_deref(), Some( "2" ) );
        assert_eq!( player.transport(), TransportState::Loading );
        assert_eq!( player.sink().sources.len(), 2 );
    }


    #[tokio::test]
    async fn test_error_from_replaced_source_ignored() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        player.play( 1 );
        let replaced = player.sink().source;
        player.play( 3 );

        player.handle_event( PlayerEvent::Sink {
            source: replaced,
            event: SinkEvent::Error( SinkError::Decode( "bad".into() ) ),
        });
        player.handle_event( PlayerEvent::Sink {
            source: replaced,
            event: SinkEvent::TimeUpdate { position: 42.0, duration: Some( 200.0 ) },
        });
        assert_eq!( current_id( &player ).as_deref(), Some( "3" ) );
        assert_eq!( player.transport(), TransportState::Loading );
        assert_eq!( player.sink().sources.len(), 2 );

        // Failures counted against the replaced source would stop playback here
        for _ in 0..2 {
            sink_event( &mut player, SinkEvent::Error( SinkError::Network( "reset".into() ) ) );
        }
        assert_eq!( current_id( &player ).as_deref(), Some( "2" ) );
        assert_eq!( player.transport(), TransportState::Loading );
    }


    #[tokio::test]
    async fn test_play_count_failure_is_harmless() {
        let ( mut player, mut rx, remote ) = setup( 2 );
        remote.fail_telemetry.store( true, Ordering::SeqCst );

        player.play( 1 );
        resolve_play( &mut player, Ok(()) );

        while remote.record_calls.load( Ordering::SeqCst ) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;

        assert!( rx.try_recv().is_err() );
        assert_eq!( player.transport(), TransportState::Playing );
        assert_eq!( player.current().map( |t| t.plays ), Some( 0 ) );
    }


    #[tokio::test]
    async fn test_play_count_updates_all_copies() {
        let ( mut player, mut rx, _remote ) = setup( 2 );
        player.play( 1 );
        resolve_play( &mut player, Ok(()) );

        let event = rx.recv().await.unwrap();
        player.handle_event( event );

        assert_eq!( player.current().map( |t| t.plays ), Some( 1 ) );
        assert_eq!( player.queue().get( 0 ).map( |t| t.plays ), Some( 1 ) );
        assert_eq!( player.catalog().first().map( |t| t.plays ), Some( 1 ) );
    }


    #[tokio::test]
    async fn test_like_waits_for_server() {
        let ( mut player, mut rx, _remote ) = setup( 2 );
        player.play( 2 );
        player.toggle_like();
        assert_eq!( player.current().map( |t| t.liked ), Some( false ) );

        let event = rx.recv().await.unwrap();
        player.handle_event( event );
        assert_eq!( player.current().map( |t| t.liked ), Some( true ) );
    }


    #[tokio::test]
    async fn test_seek_and_volume_clamp() {
        let ( mut player, _rx, _remote ) = setup( 1 );
        player.play( 1 );
        player.sink_mut().time = 5.0;

        player.seek_by( 10.0 );
        assert_eq!( player.sink().time, 5.0 );

        player.sink_mut().duration = Some( 12.0 );
        player.seek_by( 10.0 );
        assert_eq!( player.sink().time, 12.0 );
        player.seek_by( -20.0 );
        assert_eq!( player.sink().time, 0.0 );
        player.seek( 0.5 );
        assert_eq!( player.sink().time, 6.0 );

        player.set_volume( 1.4 );
        assert_eq!( player.sink().volume, 1.0 );
        player.adjust_volume( -0.3 );
        assert!( ( player.volume() - 0.7 ).abs() < 1e-6 );
        player.toggle_mute();
        assert!( player.sink().muted );
        assert!( ( player.sink().volume - 0.7 ).abs() < 1e-6 );
    }


    #[tokio::test]
    async fn test_progress_published_to_subscribers() {
        let ( mut player, _rx, _remote ) = setup( 1 );
        let mini = player.subscribe_progress();
        let expanded = player.subscribe_progress();
        player.play( 1 );

        sink_event( &mut player, SinkEvent::TimeUpdate { position: 125.0, duration: Some( 245.0 ) } );
        assert_eq!( mini.borrow().elapsed, "2:05" );
        assert_eq!( *mini.borrow(), *expanded.borrow() );

        sink_event( &mut player, SinkEvent::TimeUpdate { position: 126.0, duration: None } );
        assert_eq!( expanded.borrow().elapsed, "2:05" );
    }


    #[tokio::test]
    async fn test_media_session_and_host_commands() {
        let ( tx, mut rx ) = mpsc::unbounded_channel();
        let host = RecordingSession::default();
        let log = host.log();
        let mut player = Player::new( FakeSink::default(), Arc::new( FakeRemote::default() ), tx )
            .with_media_session( Box::new( host ) );
        player.set_catalog( tracks( 3 ) );

        player.play( 1 );
        player.play( 2 );
        assert_eq!( log.borrow().metadata.len(), 2 );
        assert_eq!( log.borrow().registrations, 8 );

        log.borrow().handlers[ &crate::media_session::MediaAction::NextTrack ].invoke();
        let event = rx.recv().await.unwrap();
        player.handle_event( event );
        assert_eq!( current_id( &player ).as_deref(), Some( "3" ) );
    }


    #[tokio::test]
    async fn test_play_all_replaces_queue() {
        let ( mut player, _rx, _remote ) = setup( 3 );
        let mut liked = tracks( 6 );
        liked.drain( ..4 );

        player.play_all( liked );
        assert_eq!( player.queue().len(), 2 );
        assert_eq!( current_id( &player ).as_deref(), Some( "5" ) );
        assert!( !player.execute( &Command::Quit ) );
        assert!( player.execute( &Command::Next ) );
        assert_eq!( current_id( &player ).as_deref(), Some( "6" ) );
    }
}
