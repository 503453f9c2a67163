//! Visualizer subsystem
//!
//! Draws 64 frequency bars for the expanded player. When the sink exposes an
//! analysis tap the bars come from a real FFT of the audible signal;
//! otherwise a sine-based animation stands in for it. A failed probe is
//! remembered for the rest of the session, and a working analyser is kept
//! across collapse/expand cycles.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{ Arc, Mutex };

use rustfft::{ num_complex::Complex, Fft, FftPlanner };
use thiserror::Error;


/// Number of bars drawn.
pub const BARS: usize = 64;

/// Analysis window length in samples. Yields `BARS` frequency buckets.
pub const FFT_SIZE: usize = BARS * 2;

/// Per-frame easing factor of the simulated bars.
pub const SMOOTHING: f32 = 0.15;

/// Temporal smoothing between analysis frames.
const ANALYSER_SMOOTHING: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;


/// Errors raised while setting up real frequency analysis.
#[derive( Debug, Error )]
pub enum VisualizerError {
    #[error( "No audio is routed through an analysis tap" )]
    NoTap,

    #[error( "Analysis unavailable: {0}" )]
    Unavailable( String ),
}


/// Whether real analysis can be used in this session.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum Capability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}


/// Lifecycle of the visualizer.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum VisualizerState {
    #[default]
    Uninitialized,
    Probing,
    RealAnalysis,
    Simulated,
    Stopped,
}


/// Inputs of the visualizer state machine.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum VisualizerEvent {
    Expand,
    ProbeSucceeded,
    ProbeFailed,
    Collapse,
}


impl VisualizerState {
    /// Applies an event and returns the next state.
    pub fn on( self, event: VisualizerEvent ) -> Self {
        use VisualizerEvent as E;
        use VisualizerState as S;

        match ( self, event ) {
            ( S::Uninitialized | S::Stopped, E::Expand ) => S::Probing,
            ( state @ ( S::Probing | S::RealAnalysis | S::Simulated ), E::Expand ) => state,

            ( S::Probing, E::ProbeSucceeded ) => S::RealAnalysis,
            ( S::Probing, E::ProbeFailed ) => S::Simulated,
            ( state @ ( S::Uninitialized | S::RealAnalysis | S::Simulated | S::Stopped ),
              E::ProbeSucceeded | E::ProbeFailed ) => state,

            ( S::Probing | S::RealAnalysis | S::Simulated, E::Collapse ) => S::Stopped,
            ( state @ ( S::Uninitialized | S::Stopped ), E::Collapse ) => state,
        }
    }


    /// Returns true while frames are being produced.
    pub fn is_animating( self ) -> bool {
        matches!( self, VisualizerState::RealAnalysis | VisualizerState::Simulated )
    }
}


/// Produces byte frequency data, 0 to 255 per bucket.
pub trait FrequencyAnalyser: Send {
    fn frequency_data( &mut self, out: &mut [u8; BARS] );
}


/// Something that can attach an analyser to the audible signal.
pub trait AnalyserSource {
    fn create_analyser( &self ) -> Result<Box<dyn FrequencyAnalyser>, VisualizerError>;
}


/// Ring of the most recent mono samples sent to the output device.
#[derive( Debug )]
pub struct AnalysisTap {
    samples: Mutex<VecDeque<f32>>,
}


impl AnalysisTap {
    /// Creates a tap holding one analysis window of silence.
    pub fn new() -> Self {
        Self { samples: Mutex::new( std::iter::repeat( 0.0 ).take( FFT_SIZE ).collect() ) }
    }


    /// Feeds interleaved output samples, downmixed to mono.
    pub fn feed( &self, interleaved: &[f32], channels: usize ) {
        let channels = channels.max( 1 );
        // Runs on the audio callback; a panicked reader must not silence it
        let mut ring = self.samples.lock().unwrap_or_else( |e| e.into_inner() );
        for frame in interleaved.chunks( channels ) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            if ring.len() == FFT_SIZE {
                ring.pop_front();
            }
            ring.push_back( mono );
        }
    }


    /// Copies the current window.
    pub fn snapshot( &self ) -> [f32; FFT_SIZE] {
        let ring = self.samples.lock().unwrap_or_else( |e| e.into_inner() );
        let mut window = [ 0.0; FFT_SIZE ];
        let offset = FFT_SIZE - ring.len().min( FFT_SIZE );
        for ( slot, sample ) in window[ offset.. ].iter_mut().zip( ring.iter() ) {
            *slot = *sample;
        }
        window
    }
}


impl Default for AnalysisTap {
    fn default() -> Self {
        Self::new()
    }
}


/// FFT analyser over an `AnalysisTap`.
///
/// Mirrors a browser analyser node: Blackman window, magnitude smoothing
/// over time, then decibels mapped linearly from [-100, -30] onto a byte.
pub struct FftAnalyser {
    tap: Arc<AnalysisTap>,
    fft: Arc<dyn Fft<f32>>,
    window: [f32; FFT_SIZE],
    smoothed: [f32; BARS],
}


impl FftAnalyser {
    /// Creates an analyser reading from `tap`.
    pub fn new( tap: Arc<AnalysisTap> ) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward( FFT_SIZE );

        let mut window = [ 0.0; FFT_SIZE ];
        for ( i, w ) in window.iter_mut().enumerate() {
            let x = 2.0 * PI * i as f32 / FFT_SIZE as f32;
            *w = 0.42 - 0.5 * x.cos() + 0.08 * ( 2.0 * x ).cos();
        }

        Self { tap, fft, window, smoothed: [ 0.0; BARS ] }
    }
}


impl FrequencyAnalyser for FftAnalyser {
    fn frequency_data( &mut self, out: &mut [u8; BARS] ) {
        let samples = self.tap.snapshot();
        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .zip( self.window.iter() )
            .map( |( s, w )| Complex::new( s * w, 0.0 ) )
            .collect();

        self.fft.process( &mut buffer );

        for ( k, byte ) in out.iter_mut().enumerate() {
            let magnitude = buffer[ k ].norm() / FFT_SIZE as f32;
            let smoothed = ANALYSER_SMOOTHING * self.smoothed[ k ]
                + ( 1.0 - ANALYSER_SMOOTHING ) * magnitude;
            self.smoothed[ k ] = smoothed;

            let db = if smoothed > 0.0 { 20.0 * smoothed.log10() } else { f32::NEG_INFINITY };
            let scaled = 255.0 * ( db - MIN_DECIBELS ) / ( MAX_DECIBELS - MIN_DECIBELS );
            *byte = scaled.clamp( 0.0, 255.0 ) as u8;
        }
    }
}


/// Target height (0 to 1) of simulated bar `index` at time `t` seconds.
pub fn simulated_target( t: f64, index: usize, playing: bool ) -> f32 {
    if !playing {
        return 0.0;
    }
    let i = index as f64;
    let wave = ( t * 3.0 + i * 0.4 ).sin() * 0.3 + ( t * 7.0 + i * 0.7 ).sin() * 0.2 + 0.5;
    ( wave * 0.7 ) as f32
}


/// Visualizer owned by the expanded player view.
pub struct Visualizer {
    state: VisualizerState,
    capability: Capability,
    analyser: Option<Box<dyn FrequencyAnalyser>>,
    heights: [f32; BARS],
    bytes: [u8; BARS],
    probes: usize,
}


impl Visualizer {
    /// Creates an uninitialized visualizer. Nothing is probed until the
    /// detailed view is first expanded.
    pub fn new() -> Self {
        Self {
            state: VisualizerState::Uninitialized,
            capability: Capability::Unknown,
            analyser: None,
            heights: [ 0.0; BARS ],
            bytes: [ 0; BARS ],
            probes: 0,
        }
    }


    /// Gets the current state.
    pub fn state( &self ) -> VisualizerState {
        self.state
    }


    /// Gets the analysis capability learned so far.
    pub fn capability( &self ) -> Capability {
        self.capability
    }


    /// Number of probe attempts made this session.
    pub fn probe_count( &self ) -> usize {
        self.probes
    }


    /// Starts animating. Probes for real analysis only while the capability
    /// is still unknown.
    pub fn expand( &mut self, source: &dyn AnalyserSource ) {
        let next = self.state.on( VisualizerEvent::Expand );
        if next != VisualizerState::Probing {
            return;
        }
        self.state = next;

        let outcome = match self.capability {
            Capability::Unavailable => VisualizerEvent::ProbeFailed,
            Capability::Available if self.analyser.is_some() => VisualizerEvent::ProbeSucceeded,
            _ => self.probe( source ),
        };

        self.state = self.state.on( outcome );
        tracing::debug!( state = ?self.state, "Visualizer expanded" );
    }


    fn probe( &mut self, source: &dyn AnalyserSource ) -> VisualizerEvent {
        self.probes += 1;
        match source.create_analyser() {
            Ok( analyser ) => {
                self.capability = Capability::Available;
                self.analyser = Some( analyser );
                VisualizerEvent::ProbeSucceeded
            }
            Err( e ) => {
                tracing::info!( "Frequency analysis unavailable, using simulated bars: {}", e );
                self.capability = Capability::Unavailable;
                VisualizerEvent::ProbeFailed
            }
        }
    }


    /// Stops animating. The analyser, if any, is kept.
    pub fn collapse( &mut self ) {
        self.state = self.state.on( VisualizerEvent::Collapse );
        self.heights = [ 0.0; BARS ];
    }


    /// Advances one UI frame and returns bar heights in `[0, 1]`, or `None`
    /// when the visualizer is not animating.
    pub fn frame( &mut self, t: f64, playing: bool ) -> Option<&[f32; BARS]> {
        match self.state {
            VisualizerState::RealAnalysis => {
                let analyser = self.analyser.as_mut()?;
                analyser.frequency_data( &mut self.bytes );
                for ( h, b ) in self.heights.iter_mut().zip( self.bytes.iter() ) {
                    *h = *b as f32 / 255.0;
                }
            }
            VisualizerState::Simulated => {
                for ( i, h ) in self.heights.iter_mut().enumerate() {
                    let target = simulated_target( t, i, playing );
                    *h += ( target - *h ) * SMOOTHING;
                }
            }
            VisualizerState::Uninitialized | VisualizerState::Probing | VisualizerState::Stopped => {
                return None;
            }
        }
        Some( &self.heights )
    }
}


impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}


impl std::fmt::Debug for Visualizer {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        f.debug_struct( "Visualizer" )
            .field( "state", &self.state )
            .field( "capability", &self.capability )
            .field( "probes", &self.probes )
            .finish_non_exhaustive()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::cell::Cell;


    struct FailingSource {
        attempts: Cell<usize>,
    }


    impl AnalyserSource for FailingSource {
        fn create_analyser( &self ) -> Result<Box<dyn FrequencyAnalyser>, VisualizerError> {
            self.attempts.set( self.attempts.get() + 1 );
            Err( VisualizerError::Unavailable( "blocked".into() ) )
        }
    }


    struct TapSource {
        tap: Arc<AnalysisTap>,
        attempts: Cell<usize>,
    }


    impl AnalyserSource for TapSource {
        fn create_analyser( &self ) -> Result<Box<dyn FrequencyAnalyser>, VisualizerError> {
            self.attempts.set( self.attempts.get() + 1 );
            Ok( Box::new( FftAnalyser::new( Arc::clone( &self.tap ) ) ) )
        }
    }


    #[test]
    fn test_transitions() {
        use VisualizerEvent as E;
        use VisualizerState as S;

        assert_eq!( S::Uninitialized.on( E::Expand ), S::Probing );
        assert_eq!( S::Probing.on( E::ProbeSucceeded ), S::RealAnalysis );
        assert_eq!( S::Probing.on( E::ProbeFailed ), S::Simulated );
        assert_eq!( S::Simulated.on( E::Collapse ), S::Stopped );
        assert_eq!( S::Stopped.on( E::Expand ), S::Probing );
        assert_eq!( S::Uninitialized.on( E::Collapse ), S::Uninitialized );
        assert_eq!( S::RealAnalysis.on( E::ProbeFailed ), S::RealAnalysis );
    }


    #[test]
    fn test_failed_probe_is_sticky() {
        let source = FailingSource { attempts: Cell::new( 0 ) };
        let mut vis = Visualizer::new();

        vis.expand( &source );
        assert_eq!( vis.state(), VisualizerState::Simulated );

        for _ in 0..5 {
            vis.collapse();
            assert_eq!( vis.state(), VisualizerState::Stopped );
            vis.expand( &source );
            assert_eq!( vis.state(), VisualizerState::Simulated );
        }

        assert_eq!( source.attempts.get(), 1 );
        assert_eq!( vis.probe_count(), 1 );
        assert_eq!( vis.capability(), Capability::Unavailable );
    }


    #[test]
    fn test_analyser_retained_across_collapse() {
        let source = TapSource { tap: Arc::new( AnalysisTap::new() ), attempts: Cell::new( 0 ) };
        let mut vis = Visualizer::new();

        vis.expand( &source );
        assert_eq!( vis.state(), VisualizerState::RealAnalysis );
        vis.collapse();
        vis.expand( &source );
        assert_eq!( vis.state(), VisualizerState::RealAnalysis );
        assert_eq!( source.attempts.get(), 1 );
    }


    #[test]
    fn test_no_frames_when_collapsed() {
        let mut vis = Visualizer::new();
        assert!( vis.frame( 0.0, true ).is_none() );
    }


    #[test]
    fn test_simulated_bars_ease_toward_target() {
        let source = FailingSource { attempts: Cell::new( 0 ) };
        let mut vis = Visualizer::new();
        vis.expand( &source );

        let bars = vis.frame( 1.0, true ).unwrap();
        let expected = simulated_target( 1.0, 3, true ) * SMOOTHING;
        assert!( ( bars[ 3 ] - expected ).abs() < 1e-6 );

        let before = vis.frame( 1.0, true ).unwrap()[ 3 ];
        let after = vis.frame( 1.0, false ).unwrap()[ 3 ];
        assert!( ( after - before * ( 1.0 - SMOOTHING ) ).abs() < 1e-6 );
    }


    #[test]
    fn test_silence_maps_to_zero() {
        let tap = Arc::new( AnalysisTap::new() );
        let mut analyser = FftAnalyser::new( Arc::clone( &tap ) );
        let mut out = [ 0xff; BARS ];
        analyser.frequency_data( &mut out );
        assert!( out.iter().all( |b| *b == 0 ) );
    }


    #[test]
    fn test_tone_lights_its_bucket() {
        let tap = Arc::new( AnalysisTap::new() );
        let bucket = 8;
        let tone: Vec<f32> = ( 0..FFT_SIZE )
            .map( |n| 0.01 * ( 2.0 * PI * bucket as f32 * n as f32 / FFT_SIZE as f32 ).sin() )
            .collect();
        tap.feed( &tone, 1 );

        let mut analyser = FftAnalyser::new( tap );
        let mut out = [ 0; BARS ];
        for _ in 0..20 {
            analyser.frequency_data( &mut out );
        }

        let loudest = out.iter().enumerate().max_by_key( |( _, b )| **b ).map( |( i, _ )| i );
        assert_eq!( loudest, Some( bucket ) );
    }


    #[test]
    fn test_tap_survives_poisoned_lock() {
        let tap = Arc::new( AnalysisTap::new() );
        let poisoner = Arc::clone( &tap );
        let _ = std::thread::spawn( move || {
            let _ring = poisoner.samples.lock().unwrap();
            panic!( "reader panicked" );
        }).join();
        assert!( tap.samples.is_poisoned() );

        tap.feed( &[ 0.5, 0.5 ], 2 );
        let window = tap.snapshot();
        assert_eq!( window[ FFT_SIZE - 1 ], 0.5 );
        assert_eq!( window[ 0 ], 0.0 );
    }
}
