//! Test doubles shared by the unit tests.

use std::cell::RefCell;
use std::collections::{ HashMap, HashSet };
use std::rc::Rc;
use std::sync::Mutex;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };

use async_trait::async_trait;

use crate::catalog::{ CatalogError, Playlist, RemoteCatalog };
use crate::media_session::{ ActionHandler, MediaAction, MediaSessionHost, NowPlaying };
use crate::sink::MediaSink;
use crate::track::{ Track, TrackId };
use crate::transport::TransportState;


/// Sink that records every call and never plays anything.
#[derive( Debug, Default )]
pub struct FakeSink {
    pub sources: Vec<String>,
    pub loads: usize,
    /// Tag of the latest load.
    pub source: u64,
    pub plays: Vec<u64>,
    pub pauses: usize,
    pub time: f64,
    pub duration: Option<f64>,
    pub volume: f32,
    pub muted: bool,
}


impl MediaSink for FakeSink {
    fn set_source( &mut self, url: &str ) {
        self.sources.push( url.to_string() );
        self.time = 0.0;
    }

    fn load( &mut self, source: u64 ) {
        self.loads += 1;
        self.source = source;
    }

    fn play( &mut self, ticket: u64 ) {
        self.plays.push( ticket );
    }

    fn pause( &mut self ) {
        self.pauses += 1;
    }

    fn current_time( &self ) -> f64 {
        self.time
    }

    fn set_current_time( &mut self, seconds: f64 ) {
        self.time = seconds;
    }

    fn duration( &self ) -> Option<f64> {
        self.duration
    }

    fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume;
    }

    fn set_muted( &mut self, muted: bool ) {
        self.muted = muted;
    }
}


/// In-memory remote catalog counting its calls.
#[derive( Debug, Default )]
pub struct FakeRemote {
    pub tracks: Mutex<Vec<Track>>,
    pub liked: Mutex<HashSet<TrackId>>,
    pub fetches: AtomicUsize,
    pub record_calls: AtomicUsize,
    pub fail_telemetry: AtomicBool,
}


impl FakeRemote {
    pub fn add_track( &self, track: Track ) {
        self.tracks.lock().unwrap().push( track );
    }


    fn telemetry( &self ) -> Result<(), CatalogError> {
        if self.fail_telemetry.load( Ordering::SeqCst ) {
            return Err( CatalogError::Status( 500 ) );
        }
        Ok(())
    }
}


#[async_trait]
impl RemoteCatalog for FakeRemote {
    async fn fetch_track( &self, id: &TrackId ) -> Result<Option<Track>, CatalogError> {
        self.fetches.fetch_add( 1, Ordering::SeqCst );
        Ok( self.tracks.lock().unwrap().iter().find( |t| &t.id == id ).cloned() )
    }

    async fn record_play( &self, _id: &TrackId ) -> Result<(), CatalogError> {
        self.record_calls.fetch_add( 1, Ordering::SeqCst );
        self.telemetry()
    }

    async fn toggle_like( &self, id: &TrackId ) -> Result<bool, CatalogError> {
        self.telemetry()?;
        let mut liked = self.liked.lock().unwrap();
        if liked.remove( id ) {
            Ok( false )
        } else {
            liked.insert( id.clone() );
            Ok( true )
        }
    }

    async fn list_tracks( &self ) -> Result<Vec<Track>, CatalogError> {
        Ok( self.tracks.lock().unwrap().clone() )
    }

    async fn liked_tracks( &self ) -> Result<Vec<Track>, CatalogError> {
        let liked = self.liked.lock().unwrap();
        Ok( self.tracks.lock().unwrap().iter().filter( |t| liked.contains( &t.id ) ).cloned().collect() )
    }

    async fn search( &self, query: &str ) -> Result<Vec<Track>, CatalogError> {
        let query = query.to_lowercase();
        Ok( self.tracks.lock().unwrap()
            .iter()
            .filter( |t| t.title.to_lowercase().contains( &query ) )
            .cloned()
            .collect() )
    }

    async fn playlist( &self, id: &str ) -> Result<Playlist, CatalogError> {
        Err( CatalogError::NotFound( id.to_string() ) )
    }
}


/// Everything a `RecordingSession` was told.
#[derive( Debug, Default )]
pub struct SessionLog {
    pub metadata: Vec<NowPlaying>,
    pub registrations: usize,
    pub handlers: HashMap<MediaAction, ActionHandler>,
    pub states: Vec<TransportState>,
}


/// Media session host that records calls into a shared log.
#[derive( Debug, Default )]
pub struct RecordingSession {
    log: Rc<RefCell<SessionLog>>,
}


impl RecordingSession {
    pub fn log( &self ) -> Rc<RefCell<SessionLog>> {
        Rc::clone( &self.log )
    }
}


impl MediaSessionHost for RecordingSession {
    fn set_metadata( &mut self, now_playing: &NowPlaying ) {
        self.log.borrow_mut().metadata.push( now_playing.clone() );
    }

    fn set_action_handler( &mut self, action: MediaAction, handler: ActionHandler ) {
        let mut log = self.log.borrow_mut();
        log.registrations += 1;
        log.handlers.insert( action, handler );
    }

    fn set_playback_state( &mut self, state: TransportState ) {
        self.log.borrow_mut().states.push( state );
    }
}
