//! Play queue and navigation policy
//!
//! The queue has no cursor. The position of the current track is looked up
//! by id every time navigation is requested, so the queue may be replaced
//! under a playing track without anything going out of sync.

use rand::Rng;

use crate::track::{ Track, TrackId };


/// Seconds into a track after which "previous" restarts it instead.
pub const RESTART_THRESHOLD_SECS: f64 = 3.0;


/// Ordered play queue.
#[derive( Debug, Clone, Default )]
pub struct Queue {
    tracks: Vec<Track>,
}


impl Queue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }


    /// Replaces the whole queue (playlist, liked songs, play all).
    pub fn replace( &mut self, tracks: Vec<Track> ) {
        self.tracks = tracks;
    }


    /// Clears the queue.
    pub fn clear( &mut self ) {
        self.tracks.clear();
    }


    /// Gets all tracks in playback order.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the track at `index`.
    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the queue is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    /// Finds the position of a track by id.
    pub fn position_of( &self, id: &TrackId ) -> Option<usize> {
        self.tracks.iter().position( |t| &t.id == id )
    }


    /// Finds a track by id for a server-confirmed update.
    pub fn find_mut( &mut self, id: &TrackId ) -> Option<&mut Track> {
        self.tracks.iter_mut().find( |t| &t.id == id )
    }


    /// Index of the track to play after `current`.
    ///
    /// With shuffle on every call is an independent uniform draw, so the same
    /// track may come up twice in a row. Without shuffle a current track that
    /// is no longer queued counts as index -1 and navigation wraps to 0.
    pub fn next_index<R: Rng + ?Sized>(
        &self,
        current: Option<&TrackId>,
        shuffle: bool,
        rng: &mut R,
    ) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        if shuffle {
            return Some( rng.random_range( 0..self.tracks.len() ) );
        }
        Some( self.step( current, 1 ) )
    }


    /// Index of the track to play before `current`. Never random.
    pub fn previous_index( &self, current: Option<&TrackId> ) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        Some( self.step( current, -1 ) )
    }


    fn step( &self, current: Option<&TrackId>, delta: isize ) -> usize {
        let len = self.tracks.len() as isize;
        let index = current
            .and_then( |id| self.position_of( id ) )
            .map( |i| i as isize )
            .unwrap_or( -1 );
        ( index + delta + len ).rem_euclid( len ) as usize
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;


    fn queue_of( n: i64 ) -> Queue {
        let mut queue = Queue::new();
        queue.replace(
            ( 1..=n )
                .map( |i| Track::new( i, format!( "Song {}", i ), "Artist", format!( "{}.mp3", i ) ) )
                .collect()
        );
        queue
    }


    #[test]
    fn test_next_wraps() {
        let queue = queue_of( 3 );
        let mut rng = StdRng::seed_from_u64( 1 );
        assert_eq!( queue.next_index( Some( &TrackId::from( 1 ) ), false, &mut rng ), Some( 1 ) );
        assert_eq!( queue.next_index( Some( &TrackId::from( 3 ) ), false, &mut rng ), Some( 0 ) );
    }


    #[test]
    fn test_previous_wraps() {
        let queue = queue_of( 3 );
        assert_eq!( queue.previous_index( Some( &TrackId::from( 1 ) ) ), Some( 2 ) );
        assert_eq!( queue.previous_index( Some( &TrackId::from( 3 ) ) ), Some( 1 ) );
    }


    #[test]
    fn test_next_then_previous_is_identity() {
        let queue = queue_of( 5 );
        let mut rng = StdRng::seed_from_u64( 2 );
        for i in 0..5 {
            let id = queue.get( i ).unwrap().id.clone();
            let next = queue.next_index( Some( &id ), false, &mut rng ).unwrap();
            let next_id = queue.get( next ).unwrap().id.clone();
            assert_eq!( queue.previous_index( Some( &next_id ) ), Some( i ) );
        }
    }


    #[test]
    fn test_missing_current_counts_as_minus_one() {
        let queue = queue_of( 4 );
        let mut rng = StdRng::seed_from_u64( 3 );
        let gone = TrackId::from( 99 );
        assert_eq!( queue.next_index( Some( &gone ), false, &mut rng ), Some( 0 ) );
        assert_eq!( queue.next_index( None, false, &mut rng ), Some( 0 ) );
        assert_eq!( queue.previous_index( Some( &gone ) ), Some( 2 ) );
    }


    #[test]
    fn test_single_track_queue() {
        let queue = queue_of( 1 );
        let mut rng = StdRng::seed_from_u64( 4 );
        let id = TrackId::from( 1 );
        assert_eq!( queue.next_index( Some( &id ), false, &mut rng ), Some( 0 ) );
        assert_eq!( queue.previous_index( Some( &id ) ), Some( 0 ) );
        assert_eq!( queue.previous_index( Some( &TrackId::from( 7 ) ) ), Some( 0 ) );
    }


    #[test]
    fn test_empty_queue_is_noop() {
        let queue = Queue::new();
        let mut rng = StdRng::seed_from_u64( 5 );
        assert_eq!( queue.next_index( None, true, &mut rng ), None );
        assert_eq!( queue.previous_index( None ), None );
    }


    #[test]
    fn test_shuffle_reaches_everything_and_can_repeat() {
        let queue = queue_of( 4 );
        let mut rng = StdRng::seed_from_u64( 42 );
        let mut seen = [ false; 4 ];
        let mut repeated = false;
        let mut last = None;

        for _ in 0..500 {
            let idx = queue.next_index( None, true, &mut rng ).unwrap();
            seen[ idx ] = true;
            if last == Some( idx ) {
                repeated = true;
            }
            last = Some( idx );
        }

        assert!( seen.iter().all( |s| *s ) );
        assert!( repeated );
    }
}
