//! Audio device sink
//!
//! `AudioSink` is the `MediaSink` used by the application. Each source gets
//! its own playback thread which downloads the media body, decodes it with
//! Symphonia, resamples when the device needs it and feeds the cpal output.
//! The thread is controlled over a channel and reports back through the
//! player's event channel.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, AtomicU32, AtomicU64, Ordering };
use std::sync::mpsc::{ self, Receiver, RecvTimeoutError, Sender, TryRecvError };
use std::thread;
use std::time::{ Duration, Instant };

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use tokio::runtime::Handle;

use crate::decoder::Decoder;
use crate::output::{ AudioOutput, SampleBuffer };
use crate::sink::{ MediaSink, SinkError, SinkEvent, SinkNotifier };
use crate::visualizer::{ AnalyserSource, AnalysisTap, FftAnalyser, FrequencyAnalyser, VisualizerError };


/// How often a playing source reports its position.
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis( 250 );

/// How long an idle playback thread waits for a command.
const IDLE_POLL: Duration = Duration::from_millis( 50 );


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Where a source's bytes come from.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum SourceLocation {
    Remote( String ),
    File( String ),
}


impl SourceLocation {
    /// Resolves an audio URL. Absolute URLs are fetched as is; root-relative
    /// paths are fetched from `base_url` unless they exist on disk.
    pub fn resolve( source: &str, base_url: Option<&str> ) -> Self {
        if source.starts_with( "http://" ) || source.starts_with( "https://" ) {
            return SourceLocation::Remote( source.to_string() );
        }
        match base_url {
            Some( base ) if source.starts_with( '/' ) && !Path::new( source ).exists() => {
                SourceLocation::Remote( format!( "{}{}", base.trim_end_matches( '/' ), source ) )
            }
            _ => SourceLocation::File( source.to_string() ),
        }
    }


    /// File extension used as a probing hint, ignoring any query string.
    pub fn extension( &self ) -> Option<&str> {
        let raw = match self {
            SourceLocation::Remote( url ) => url.split( [ '?', '#' ] ).next().unwrap_or( url ),
            SourceLocation::File( path ) => path,
        };
        Path::new( raw ).extension().and_then( |e| e.to_str() )
    }
}


/// Control messages for a playback thread.
#[derive( Debug )]
enum Control {
    Play( u64 ),
    Pause,
    Seek( f64 ),
}


/// State shared between the sink and its playback thread.
#[derive( Debug )]
struct Shared {
    /// Source frames decoded so far
    frames: AtomicU64,
    sample_rate: AtomicU32,
    /// Duration as f64 bits, NaN while unknown
    duration: AtomicU64,
    volume: AtomicU32,
    muted: AtomicBool,
    /// Set when the sink moves to another source
    stopped: AtomicBool,
}


impl Shared {
    fn new( volume: f32, muted: bool ) -> Self {
        Self {
            frames: AtomicU64::new( 0 ),
            sample_rate: AtomicU32::new( 0 ),
            duration: AtomicU64::new( f64::NAN.to_bits() ),
            volume: AtomicU32::new( volume.to_bits() ),
            muted: AtomicBool::new( muted ),
            stopped: AtomicBool::new( false ),
        }
    }


    fn position( &self ) -> f64 {
        let rate = self.sample_rate.load( Ordering::Relaxed );
        if rate == 0 {
            return 0.0;
        }
        self.frames.load( Ordering::Relaxed ) as f64 / rate as f64
    }


    fn set_position( &self, seconds: f64 ) {
        let rate = self.sample_rate.load( Ordering::Relaxed ) as f64;
        self.frames.store( ( seconds.max( 0.0 ) * rate ) as u64, Ordering::Relaxed );
    }


    fn duration( &self ) -> Option<f64> {
        let duration = f64::from_bits( self.duration.load( Ordering::Relaxed ) );
        duration.is_finite().then_some( duration )
    }


    fn set_duration( &self, duration: Option<f64> ) {
        let bits = duration.unwrap_or( f64::NAN ).to_bits();
        self.duration.store( bits, Ordering::Relaxed );
    }


    fn gain( &self ) -> f32 {
        if self.muted.load( Ordering::Relaxed ) {
            0.0
        } else {
            f32::from_bits( self.volume.load( Ordering::Relaxed ) )
        }
    }


    fn is_stopped( &self ) -> bool {
        self.stopped.load( Ordering::Relaxed )
    }
}


/// Everything a playback thread needs.
struct ThreadContext {
    location: SourceLocation,
    client: reqwest::Client,
    runtime: Handle,
    tap: Option<Arc<AnalysisTap>>,
    shared: Arc<Shared>,
    notifier: SinkNotifier,
    source: u64,
}


impl ThreadContext {
    /// Drops notifications from a thread whose source was replaced.
    fn notify( &self, event: SinkEvent ) {
        if !self.shared.is_stopped() {
            self.notifier.notify( self.source, event );
        }
    }
}


/// Output device plus the resampling stage in front of it.
struct Engine {
    #[allow( dead_code )] // Kept alive for its Drop impl which stops the audio stream
    output: AudioOutput,
    buffer: Arc<SampleBuffer>,
    resampler: Option<FastFixedOut<f32>>,
    /// Planar input waiting for a full resampler chunk
    pending: Vec<Vec<f32>>,
}


impl Engine {
    fn new( decoder: &Decoder, tap: Option<Arc<AnalysisTap>> ) -> Result<Self, SinkError> {
        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();

        let ( output, buffer ) = AudioOutput::new( source_rate, channels as u16, tap )
            .map_err( |e| SinkError::Blocked( e.to_string() ) )?;
        output.play().map_err( |e| SinkError::Blocked( e.to_string() ) )?;

        let target_rate = output.sample_rate();
        let resampler = if source_rate != target_rate {
            tracing::info!( "Resampling: {} Hz → {} Hz ({} device channels)", source_rate, target_rate, output.channels() );

            // FastFixedOut handles variable input sizes
            let resampler = FastFixedOut::<f32>::new(
                target_rate as f64 / source_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                1024,
                channels,
            ).map_err( |e| SinkError::Output( format!( "Failed to create resampler: {}", e ) ) )?;
            Some( resampler )
        } else {
            None
        };

        Ok( Self {
            output,
            buffer,
            resampler,
            pending: ( 0..channels ).map( |_| Vec::new() ).collect(),
        })
    }


    /// Runs decoded samples through the resampler, if any.
    fn process( &mut self, samples: Vec<f32> ) -> Vec<f32> {
        let Some( resampler ) = self.resampler.as_mut() else {
            return samples;
        };
        let channels = self.pending.len().max( 1 );

        for chunk in samples.chunks( channels ) {
            for ( ch_idx, sample ) in chunk.iter().enumerate() {
                self.pending[ ch_idx ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while self.pending[ 0 ].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let input: Vec<Vec<f32>> = self.pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            match resampler.process( &input, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    /// Flushes whatever is left in the resampler at end of stream.
    fn flush( &mut self ) -> Vec<f32> {
        let Some( resampler ) = self.resampler.as_mut() else {
            return Vec::new();
        };
        if self.pending.first().map_or( true, |ch| ch.is_empty() ) {
            return Vec::new();
        }
        let out = match resampler.process_partial( Some( &self.pending ), None ) {
            Ok( resampled ) => interleave( &resampled ),
            Err( e ) => {
                tracing::error!( "Final resample error: {}", e );
                Vec::new()
            }
        };
        self.pending.iter_mut().for_each( |ch| ch.clear() );
        out
    }


    /// Pushes samples, waiting for room in the device buffer.
    fn push( &self, samples: &[f32], shared: &Shared ) {
        let mut offset = 0;
        while offset < samples.len() && !shared.is_stopped() {
            let pushed = self.buffer.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }


    /// Drops buffered audio after a seek.
    fn reset( &mut self ) {
        self.buffer.clear();
        self.pending.iter_mut().for_each( |ch| ch.clear() );
        if let Some( resampler ) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}


#[derive( Debug, Clone, Copy, PartialEq, Eq )]
enum Phase {
    Idle,
    Decoding,
    Draining,
    Ended,
}


fn fetch( ctx: &ThreadContext ) -> Result<Vec<u8>, SinkError> {
    match &ctx.location {
        SourceLocation::Remote( url ) => {
            tracing::debug!( %url, "Fetching audio" );
            ctx.runtime.block_on( async {
                let response = ctx.client
                    .get( url )
                    .send()
                    .await
                    .and_then( |r| r.error_for_status() )
                    .map_err( |e| SinkError::Network( e.to_string() ) )?;
                let bytes = response.bytes()
                    .await
                    .map_err( |e| SinkError::Network( e.to_string() ) )?;
                Ok( bytes.to_vec() )
            })
        }
        SourceLocation::File( path ) => {
            std::fs::read( path ).map_err( |e| SinkError::Network( format!( "{}: {}", path, e ) ) )
        }
    }
}


fn playback_thread( ctx: ThreadContext, control: Receiver<Control> ) {
    let bytes = match fetch( &ctx ) {
        Ok( bytes ) => bytes,
        Err( e ) => {
            ctx.notify( SinkEvent::Error( e ) );
            return;
        }
    };
    if ctx.shared.is_stopped() {
        return;
    }

    let mut decoder = match Decoder::from_bytes( bytes, ctx.location.extension() ) {
        Ok( decoder ) => decoder,
        Err( e ) => {
            ctx.notify( SinkEvent::Error( SinkError::Decode( e.to_string() ) ) );
            return;
        }
    };

    ctx.shared.sample_rate.store( decoder.sample_rate(), Ordering::Relaxed );
    ctx.shared.set_duration( decoder.duration() );
    ctx.notify( SinkEvent::MetadataLoaded { duration: decoder.duration() } );

    let channels = decoder.channels().max( 1 );
    // Don't decode too far ahead - keep about 50ms buffered
    let target_buffer = ( decoder.sample_rate() as usize * channels ) / 20;

    let mut engine: Option<Engine> = None;
    let mut phase = Phase::Idle;
    let mut last_tick = Instant::now();

    loop {
        let command = if phase == Phase::Decoding || phase == Phase::Draining {
            match control.try_recv() {
                Ok( command ) => Some( command ),
                Err( TryRecvError::Empty ) => None,
                Err( TryRecvError::Disconnected ) => break,
            }
        } else {
            match control.recv_timeout( IDLE_POLL ) {
                Ok( command ) => Some( command ),
                Err( RecvTimeoutError::Timeout ) => None,
                Err( RecvTimeoutError::Disconnected ) => break,
            }
        };

        if ctx.shared.is_stopped() {
            tracing::debug!( "Playback thread: source replaced" );
            break;
        }

        if let Some( command ) = command {
            match command {
                Control::Play( ticket ) => {
                    if engine.is_none() {
                        match Engine::new( &decoder, ctx.tap.clone() ) {
                            Ok( created ) => engine = Some( created ),
                            Err( e ) => {
                                ctx.notify( SinkEvent::PlayResolved { ticket, result: Err( e ) } );
                                continue;
                            }
                        }
                    }
                    if phase == Phase::Ended {
                        if let Err( e ) = decoder.seek( 0.0 ) {
                            tracing::warn!( "Restart failed: {}", e );
                        }
                        ctx.shared.set_position( 0.0 );
                    }
                    if let Some( engine ) = engine.as_ref() {
                        engine.buffer.set_paused( false );
                    }
                    phase = Phase::Decoding;
                    ctx.notify( SinkEvent::PlayResolved { ticket, result: Ok(()) } );
                }
                Control::Pause => {
                    if let Some( engine ) = engine.as_ref() {
                        engine.buffer.set_paused( true );
                    }
                    if phase != Phase::Ended {
                        phase = Phase::Idle;
                    }
                }
                Control::Seek( seconds ) => match decoder.seek( seconds ) {
                    Ok(()) => {
                        ctx.shared.set_position( seconds );
                        if let Some( engine ) = engine.as_mut() {
                            engine.reset();
                        }
                        if phase == Phase::Ended || phase == Phase::Draining {
                            phase = Phase::Decoding;
                        }
                    }
                    Err( e ) => tracing::warn!( "Seek failed: {}", e ),
                },
            }
            continue;
        }

        let Some( engine ) = engine.as_mut() else {
            continue;
        };
        if phase == Phase::Idle || phase == Phase::Ended {
            continue;
        }

        engine.buffer.set_volume( ctx.shared.gain() );

        if last_tick.elapsed() >= TIME_UPDATE_INTERVAL {
            last_tick = Instant::now();
            ctx.notify( SinkEvent::TimeUpdate {
                position: ctx.shared.position(),
                duration: ctx.shared.duration(),
            });
        }

        if phase == Phase::Draining {
            if engine.buffer.is_empty() {
                tracing::info!( "Playback thread: reached end of media" );
                phase = Phase::Ended;
                ctx.notify( SinkEvent::Ended );
            } else {
                thread::sleep( Duration::from_millis( 10 ) );
            }
            continue;
        }

        if engine.buffer.len() > target_buffer {
            thread::sleep( Duration::from_millis( 5 ) );
            continue;
        }

        match decoder.decode_next() {
            Ok( Some( samples ) ) => {
                let frames = ( samples.len() / channels ) as u64;
                ctx.shared.frames.fetch_add( frames, Ordering::Relaxed );
                let output = engine.process( samples );
                engine.push( &output, &ctx.shared );
            }
            Ok( None ) => {
                let tail = engine.flush();
                engine.push( &tail, &ctx.shared );
                if ctx.shared.duration().is_none() {
                    let position = ctx.shared.position();
                    ctx.shared.set_duration( Some( position ) );
                    ctx.notify( SinkEvent::MetadataLoaded { duration: Some( position ) } );
                }
                phase = Phase::Draining;
            }
            Err( e ) => {
                ctx.notify( SinkEvent::Error( SinkError::Decode( e.to_string() ) ) );
                break;
            }
        }
    }

    tracing::debug!( "Playback thread: exiting" );
}


/// Handle on the thread playing the current source.
struct PlaybackHandle {
    control: Sender<Control>,
    shared: Arc<Shared>,
}


/// Media sink rendering to the default audio device.
pub struct AudioSink {
    notifier: SinkNotifier,
    runtime: Handle,
    client: reqwest::Client,
    base_url: Option<String>,
    tap: Option<Arc<AnalysisTap>>,
    source: Option<SourceLocation>,
    volume: f32,
    muted: bool,
    shared: Arc<Shared>,
    playback: Option<PlaybackHandle>,
    loaded: u64,
}


impl AudioSink {
    /// Creates a sink.
    ///
    /// @param notifier - Where sink events are delivered
    /// @param runtime - Runtime used to download media bodies
    /// @param base_url - Server root for root-relative audio URLs
    /// @param analysis - Whether to expose an analysis tap to the visualizer
    pub fn new(
        notifier: SinkNotifier,
        runtime: Handle,
        base_url: Option<String>,
        analysis: bool,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .user_agent( concat!( "isai/", env!( "CARGO_PKG_VERSION" ) ) )
            .build()
            .map_err( |e| SinkError::Network( e.to_string() ) )?;

        Ok( Self {
            notifier,
            runtime,
            client,
            base_url,
            tap: analysis.then( || Arc::new( AnalysisTap::new() ) ),
            source: None,
            volume: 1.0,
            muted: false,
            shared: Arc::new( Shared::new( 1.0, false ) ),
            playback: None,
            loaded: 0,
        })
    }


    /// Stops the playback thread of the current source, if any.
    fn stop( &mut self ) {
        if let Some( handle ) = self.playback.take() {
            handle.shared.stopped.store( true, Ordering::Relaxed );
            tracing::debug!( "Stopped playback thread" );
        }
    }


    fn send( &mut self, control: Control ) -> bool {
        match &self.playback {
            Some( handle ) => handle.control.send( control ).is_ok(),
            None => false,
        }
    }
}


impl MediaSink for AudioSink {
    fn set_source( &mut self, url: &str ) {
        self.stop();
        self.source = Some( SourceLocation::resolve( url, self.base_url.as_deref() ) );
        self.shared = Arc::new( Shared::new( self.volume, self.muted ) );
    }


    fn load( &mut self, source: u64 ) {
        self.stop();
        self.loaded = source;
        let Some( location ) = self.source.clone() else {
            return;
        };

        self.shared = Arc::new( Shared::new( self.volume, self.muted ) );
        let ( tx, rx ) = mpsc::channel();
        let ctx = ThreadContext {
            location,
            client: self.client.clone(),
            runtime: self.runtime.clone(),
            tap: self.tap.clone(),
            shared: Arc::clone( &self.shared ),
            notifier: self.notifier.clone(),
            source,
        };

        // Detached: a replaced thread notices `stopped` and exits on its own
        let spawned = thread::Builder::new()
            .name( "isai-playback".into() )
            .spawn( move || playback_thread( ctx, rx ) );

        match spawned {
            Ok( _ ) => {
                self.playback = Some( PlaybackHandle { control: tx, shared: Arc::clone( &self.shared ) } );
            }
            Err( e ) => {
                self.notifier.notify( source, SinkEvent::Error( SinkError::Output( e.to_string() ) ) );
            }
        }
    }


    fn play( &mut self, ticket: u64 ) {
        if self.send( Control::Play( ticket ) ) {
            return;
        }

        // The thread gave up on its source; load it again
        if self.source.is_some() {
            self.load( self.loaded );
            if self.send( Control::Play( ticket ) ) {
                return;
            }
        }
        self.notifier.notify( self.loaded, SinkEvent::PlayResolved {
            ticket,
            result: Err( SinkError::Output( "no source loaded".into() ) ),
        });
    }


    fn pause( &mut self ) {
        self.send( Control::Pause );
    }


    fn current_time( &self ) -> f64 {
        self.shared.position()
    }


    fn set_current_time( &mut self, seconds: f64 ) {
        self.shared.set_position( seconds );
        self.send( Control::Seek( seconds ) );
    }


    fn duration( &self ) -> Option<f64> {
        self.shared.duration()
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume;
        self.shared.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    fn set_muted( &mut self, muted: bool ) {
        self.muted = muted;
        self.shared.muted.store( muted, Ordering::Relaxed );
    }
}


impl AnalyserSource for AudioSink {
    fn create_analyser( &self ) -> Result<Box<dyn FrequencyAnalyser>, VisualizerError> {
        match &self.tap {
            Some( tap ) => Ok( Box::new( FftAnalyser::new( Arc::clone( tap ) ) ) ),
            None => Err( VisualizerError::NoTap ),
        }
    }
}


impl Drop for AudioSink {
    fn drop( &mut self ) {
        self.stop();
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_resolve_locations() {
        assert_eq!(
            SourceLocation::resolve( "https://cdn.example.com/a.mp3", Some( "http://localhost:5000" ) ),
            SourceLocation::Remote( "https://cdn.example.com/a.mp3".into() )
        );
        assert_eq!(
            SourceLocation::resolve( "/uploads/isai-missing/a.mp3", Some( "http://localhost:5000/" ) ),
            SourceLocation::Remote( "http://localhost:5000/uploads/isai-missing/a.mp3".into() )
        );
        assert_eq!(
            SourceLocation::resolve( "music/a.flac", Some( "http://localhost:5000" ) ),
            SourceLocation::File( "music/a.flac".into() )
        );
        assert_eq!(
            SourceLocation::resolve( "/uploads/a.mp3", None ),
            SourceLocation::File( "/uploads/a.mp3".into() )
        );
    }


    #[test]
    fn test_extension_ignores_query() {
        let remote = SourceLocation::Remote( "http://host/audio/track.ogg?token=abc".into() );
        assert_eq!( remote.extension(), Some( "ogg" ) );
        let file = SourceLocation::File( "track".into() );
        assert_eq!( file.extension(), None );
    }


    #[test]
    fn test_shared_position_and_gain() {
        let shared = Shared::new( 0.5, false );
        assert_eq!( shared.position(), 0.0 );
        assert_eq!( shared.duration(), None );

        shared.sample_rate.store( 48_000, Ordering::Relaxed );
        shared.set_position( 2.5 );
        assert!( ( shared.position() - 2.5 ).abs() < 1e-9 );

        shared.set_duration( Some( 180.0 ) );
        assert_eq!( shared.duration(), Some( 180.0 ) );

        assert_eq!( shared.gain(), 0.5 );
        shared.muted.store( true, Ordering::Relaxed );
        assert_eq!( shared.gain(), 0.0 );
    }


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ -1.0, -2.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, -1.0, 2.0, -2.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[tokio::test]
    async fn test_analyser_requires_tap() {
        let ( tx, _rx ) = tokio::sync::mpsc::unbounded_channel();
        let notifier = SinkNotifier::new( tx );

        let sink = AudioSink::new( notifier.clone(), Handle::current(), None, false ).unwrap();
        assert!( matches!( sink.create_analyser(), Err( VisualizerError::NoTap ) ) );

        let sink = AudioSink::new( notifier, Handle::current(), None, true ).unwrap();
        assert!( sink.create_analyser().is_ok() );
    }
}
