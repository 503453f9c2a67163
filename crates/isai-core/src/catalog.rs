//! Track catalog adapter
//!
//! Turns a track id into full track metadata. Locally known collections are
//! consulted before the remote catalog so that songs which only exist in an
//! ephemeral result set (search hits, external sources) still play, and so
//! that known songs never cost a network round trip.

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::track::{ Track, TrackId };


/// Errors that can occur talking to the remote catalog.
#[derive( Debug, Error )]
pub enum CatalogError {
    #[error( "Request failed: {0}" )]
    Request( String ),

    #[error( "Server returned status {0}" )]
    Status( u16 ),

    #[error( "Invalid response: {0}" )]
    Decode( String ),

    #[error( "Not found: {0}" )]
    NotFound( String ),
}


/// A server-side playlist with its songs inlined.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct Playlist {
    pub id: TrackId,
    pub name: String,
    #[serde( default )]
    pub description: Option<String>,
    #[serde( default )]
    pub songs: Vec<Track>,
}


/// Remote catalog surface consumed by the player.
///
/// Lookups return `Ok( None )` for a missing track; only transport and
/// decoding problems are errors.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// `GET /api/songs/{id}`
    async fn fetch_track( &self, id: &TrackId ) -> Result<Option<Track>, CatalogError>;

    /// `PUT /api/songs/{id}/play`
    async fn record_play( &self, id: &TrackId ) -> Result<(), CatalogError>;

    /// `PUT /api/songs/{id}/like`, returning the new liked flag.
    async fn toggle_like( &self, id: &TrackId ) -> Result<bool, CatalogError>;

    /// `GET /api/songs`
    async fn list_tracks( &self ) -> Result<Vec<Track>, CatalogError>;

    /// `GET /api/songs/liked`
    async fn liked_tracks( &self ) -> Result<Vec<Track>, CatalogError>;

    /// `GET /api/songs/search?q=`
    async fn search( &self, query: &str ) -> Result<Vec<Track>, CatalogError>;

    /// `GET /api/playlists/{id}`
    async fn playlist( &self, id: &str ) -> Result<Playlist, CatalogError>;
}


/// Where a track was resolved from.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ResolvedFrom {
    Queue,
    Catalog,
    Remote,
}


/// Last-known full track collection (home listing, search results, playlist page).
#[derive( Debug, Clone, Default )]
pub struct CatalogSnapshot {
    tracks: Vec<Track>,
}


impl CatalogSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }


    /// Replaces the snapshot with a fresher listing.
    pub fn replace( &mut self, tracks: Vec<Track> ) {
        self.tracks = tracks;
    }


    /// Gets all tracks.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the first track, used to bootstrap playback.
    pub fn first( &self ) -> Option<&Track> {
        self.tracks.first()
    }


    /// Finds a track by id.
    pub fn find( &self, id: &TrackId ) -> Option<&Track> {
        self.tracks.iter().find( |t| &t.id == id )
    }


    /// Finds a track by id for a server-confirmed update.
    pub fn find_mut( &mut self, id: &TrackId ) -> Option<&mut Track> {
        self.tracks.iter_mut().find( |t| &t.id == id )
    }


    /// Returns true if nothing is known yet.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    /// Gets the number of known tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }
}


/// Resolves a track from local collections only: the queue first, then the
/// catalog snapshot. `None` means the caller has to go remote.
pub fn resolve_local(
    queue: &[Track],
    catalog: &CatalogSnapshot,
    id: &TrackId,
) -> Option<( Track, ResolvedFrom )> {
    if let Some( track ) = queue.iter().find( |t| &t.id == id ) {
        return Some(( track.clone(), ResolvedFrom::Queue ));
    }
    catalog.find( id ).map( |track| ( track.clone(), ResolvedFrom::Catalog ) )
}


#[cfg( test )]
mod tests {
    use super::*;


    fn track( id: i64, title: &str ) -> Track {
        Track::new( id, title, "Artist", format!( "https://cdn.example/{}.mp3", id ) )
    }


    #[test]
    fn test_queue_wins_over_catalog() {
        let queue = vec![ track( 1, "queued copy" ) ];
        let mut catalog = CatalogSnapshot::new();
        catalog.replace( vec![ track( 1, "catalog copy" ), track( 2, "other" ) ] );

        let ( found, from ) = resolve_local( &queue, &catalog, &TrackId::from( 1 ) ).unwrap();
        assert_eq!( found.title, "queued copy" );
        assert_eq!( from, ResolvedFrom::Queue );
    }


    #[test]
    fn test_catalog_fallback_with_string_id() {
        let mut catalog = CatalogSnapshot::new();
        catalog.replace( vec![ track( 2, "other" ) ] );

        let ( found, from ) = resolve_local( &[], &catalog, &TrackId::new( "2" ) ).unwrap();
        assert_eq!( found.title, "other" );
        assert_eq!( from, ResolvedFrom::Catalog );
    }


    #[test]
    fn test_unknown_needs_remote() {
        let catalog = CatalogSnapshot::new();
        assert!( resolve_local( &[], &catalog, &TrackId::from( 9 ) ).is_none() );
    }


    #[test]
    fn test_playlist_json() {
        let json = r#"{ "id": 4, "name": "Evening", "songs": [
            { "id": 1, "title": "A", "artistName": "X", "audioUrl": "a.mp3" }
        ] }"#;
        let playlist: Playlist = serde_json::from_str( json ).unwrap();
        assert_eq!( playlist.songs.len(), 1 );
        assert_eq!( playlist.description, None );
    }
}
