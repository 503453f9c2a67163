//! Progress synchronization
//!
//! Every UI surface (mini player, expanded player) subscribes to one watch
//! channel. A tick publishes a single `Progress` value, so all surfaces see
//! the same position at the same time.

use tokio::sync::watch;


/// Formats seconds as `m:ss`. Minutes are unbounded; non-finite input renders `0:00`.
pub fn format_time( seconds: f64 ) -> String {
    if !seconds.is_finite() {
        return "0:00".to_string();
    }
    let total = seconds.max( 0.0 ).floor() as u64;
    format!( "{}:{:02}", total / 60, total % 60 )
}


/// Normalized playback progress as rendered by every surface.
#[derive( Debug, Clone, PartialEq )]
pub struct Progress {
    pub position: f64,
    pub duration: f64,
    /// Position as a percentage of duration, 0 to 100.
    pub percent: f64,
    pub elapsed: String,
    pub total: String,
}


impl Progress {
    /// Computes progress, or `None` while the duration is unknown.
    pub fn compute( position: f64, duration: Option<f64> ) -> Option<Self> {
        let duration = duration.filter( |d| d.is_finite() && *d > 0.0 )?;
        let position = if position.is_finite() { position.max( 0.0 ) } else { 0.0 };
        Some( Self {
            position,
            duration,
            percent: ( position / duration * 100.0 ).min( 100.0 ),
            elapsed: format_time( position ),
            total: format_time( duration ),
        })
    }


    /// Fraction in `[0, 1]` for drawing bars.
    pub fn ratio( &self ) -> f64 {
        self.percent / 100.0
    }
}


impl Default for Progress {
    fn default() -> Self {
        Self {
            position: 0.0,
            duration: 0.0,
            percent: 0.0,
            elapsed: format_time( 0.0 ),
            total: format_time( 0.0 ),
        }
    }
}


/// Publisher side of progress synchronization.
#[derive( Debug )]
pub struct ProgressSync {
    tx: watch::Sender<Progress>,
}


impl ProgressSync {
    /// Creates a publisher with zeroed progress.
    pub fn new() -> Self {
        let ( tx, _ ) = watch::channel( Progress::default() );
        Self { tx }
    }


    /// Registers a UI surface.
    pub fn subscribe( &self ) -> watch::Receiver<Progress> {
        self.tx.subscribe()
    }


    /// Handles a sink time tick. Returns false when nothing was published.
    pub fn tick( &self, position: f64, duration: Option<f64> ) -> bool {
        match Progress::compute( position, duration ) {
            Some( progress ) => {
                self.tx.send_replace( progress );
                true
            }
            None => false,
        }
    }


    /// Publishes a fresh start for a newly loaded track.
    pub fn reset( &self, duration_hint: Option<f64> ) {
        let progress = Progress::compute( 0.0, duration_hint ).unwrap_or_default();
        self.tx.send_replace( progress );
    }


    /// Gets the last published value.
    pub fn current( &self ) -> Progress {
        self.tx.borrow().clone()
    }
}


impl Default for ProgressSync {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 125.0 ), "2:05" );
        assert_eq!( format_time( 245.0 ), "4:05" );
        assert_eq!( format_time( 59.9 ), "0:59" );
        assert_eq!( format_time( 3725.0 ), "62:05" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
        assert_eq!( format_time( f64::INFINITY ), "0:00" );
    }


    #[test]
    fn test_progress_values() {
        let progress = Progress::compute( 125.0, Some( 245.0 ) ).unwrap();
        assert_eq!( progress.elapsed, "2:05" );
        assert_eq!( progress.total, "4:05" );
        assert!( ( progress.percent - 51.0 ).abs() < 0.1 );
    }


    #[test]
    fn test_unknown_duration_is_skipped() {
        assert!( Progress::compute( 3.0, None ).is_none() );
        assert!( Progress::compute( 3.0, Some( f64::NAN ) ).is_none() );
        assert!( Progress::compute( 3.0, Some( 0.0 ) ).is_none() );
    }


    #[test]
    fn test_all_surfaces_see_same_tick() {
        let sync = ProgressSync::new();
        let mini = sync.subscribe();
        let expanded = sync.subscribe();

        assert!( sync.tick( 30.0, Some( 120.0 ) ) );
        assert!( !sync.tick( 31.0, None ) );

        assert_eq!( *mini.borrow(), *expanded.borrow() );
        assert_eq!( mini.borrow().elapsed, "0:30" );
        assert!( ( expanded.borrow().percent - 25.0 ).abs() < 1e-9 );
    }
}
