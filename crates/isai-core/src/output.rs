//! Audio output via cpal
//!
//! Handles sending decoded PCM samples to the system audio device.

use std::sync::{ Arc, Mutex };
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::collections::VecDeque;

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;

use crate::visualizer::AnalysisTap;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get default stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Shared sample buffer between producer (decoder) and consumer (audio callback).
/// Handles channel conversion between source and output, and copies what
/// is actually heard into the analysis tap.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Volume level stored as f32 bits (0.0 to 1.0)
    volume: AtomicU32,
    source_channels: u16,
    output_channels: u16,
    tap: Option<Arc<AnalysisTap>>,
}


impl SampleBuffer {
    /// Creates a new sample buffer with the given capacity and channel configuration.
    ///
    /// - `capacity`: Maximum number of samples to buffer
    /// - `source_channels`: Number of channels in the source audio (from decoder)
    /// - `output_channels`: Number of channels expected by the output device
    /// - `tap`: Receives every output block when analysis is enabled
    pub fn new(
        capacity: usize,
        source_channels: u16,
        output_channels: u16,
        tap: Option<Arc<AnalysisTap>>,
    ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels,
            output_channels,
            tap,
        }
    }


    /// Pushes samples to the buffer. Returns number of samples actually pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.buffer.lock().unwrap();
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Pops samples from the buffer into the output slice, handling channel conversion.
    /// Returns the number of output samples actually written.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        let written = if self.paused.load( Ordering::Relaxed ) {
            output.fill( 0.0 );
            0
        } else {
            self.convert( output )
        };

        if let Some( tap ) = &self.tap {
            tap.feed( output, self.output_channels as usize );
        }

        written
    }


    fn convert( &self, output: &mut [f32] ) -> usize {
        let volume = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        let mut buf = self.buffer.lock().unwrap();
        let src_ch = self.source_channels.max( 1 ) as usize;
        let out_ch = self.output_channels.max( 1 ) as usize;

        let written = if src_ch == out_ch {
            let to_pop = output.len().min( buf.len() );
            for ( slot, sample ) in output[ ..to_pop ].iter_mut().zip( buf.drain( ..to_pop ) ) {
                *slot = sample;
            }
            to_pop
        } else if src_ch == 1 && out_ch == 2 {
            // Mono to stereo: duplicate each sample
            let frames = ( output.len() / out_ch ).min( buf.len() );
            for i in 0..frames {
                let sample = buf.pop_front().unwrap_or( 0.0 );
                output[ i * 2 ] = sample;
                output[ i * 2 + 1 ] = sample;
            }
            frames * out_ch
        } else if src_ch == 2 && out_ch == 1 {
            // Stereo to mono: mix down
            let frames = output.len().min( buf.len() / src_ch );
            for slot in output[ ..frames ].iter_mut() {
                let left = buf.pop_front().unwrap_or( 0.0 );
                let right = buf.pop_front().unwrap_or( 0.0 );
                *slot = ( left + right ) * 0.5;
            }
            frames
        } else {
            // General case: keep the first channels, duplicate the last one if the device has more
            let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
            let mut frame_buf = Vec::with_capacity( src_ch );
            for frame in 0..frames {
                frame_buf.clear();
                frame_buf.extend( buf.drain( ..src_ch ) );
                for ch in 0..out_ch {
                    output[ frame * out_ch + ch ] = frame_buf[ ch.min( src_ch - 1 ) ];
                }
            }
            frames * out_ch
        };

        output[ written.. ].fill( 0.0 );

        if volume != 1.0 {
            for sample in output[ ..written ].iter_mut() {
                *sample *= volume;
            }
        }

        written
    }


    /// Returns the number of samples currently in the buffer.
    pub fn len( &self ) -> usize {
        self.buffer.lock().unwrap().len()
    }


    /// Returns true if the buffer is empty.
    pub fn is_empty( &self ) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }


    /// Clears the buffer.
    pub fn clear( &self ) {
        self.buffer.lock().unwrap().clear();
    }


    /// Sets paused state.
    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    /// Gets paused state.
    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the effective volume level (0.0 = silent, 1.0 = full).
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    /// Gets the current volume level.
    pub fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }
}


/// Audio output handler.
///
/// Not Send: `cpal::Stream` has to stay on the thread that built it, so the
/// sink creates one per playback thread.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}


impl AudioOutput {
    /// Creates a new audio output with the specified source sample rate and channels.
    ///
    /// Returns both the AudioOutput and a shared SampleBuffer that the caller should
    /// use to push decoded samples. The buffer handles channel conversion if needed.
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
        tap: Option<Arc<AnalysisTap>>,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        // Priority: 1) exact match, 2) same sample rate any channels, 3) default (resampled)
        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        let config = if let Some( supported_config ) = supported_configs.iter().find( |c| {
            c.channels() == source_channels && supports_rate( *c )
        }) {
            supported_config.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else if let Some( supported_config ) = supported_configs.iter().find( |c| supports_rate( *c ) ) {
            tracing::info!(
                "Channel conversion: source has {} channels, device using {} channels",
                source_channels,
                supported_config.channels()
            );
            supported_config.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else {
            let default_config = device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
            tracing::info!(
                "Device does not support {} Hz, resampling to {} Hz",
                source_sample_rate,
                default_config.sample_rate().0
            );
            default_config.config()
        };

        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // Buffer size: ~500ms of audio
        let buffer_capacity = ( config.sample_rate.0 as usize ) * ( source_channels as usize ) / 2;
        let sample_buffer = Arc::new( SampleBuffer::new(
            buffer_capacity,
            source_channels,
            config.channels,
            tap,
        ));
        let sample_buffer_clone = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    sample_buffer_clone.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
            sample_buffer,
        ))
    }


    /// Starts audio output.
    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Gets the actual sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Gets the actual number of channels.
    pub fn channels( &self ) -> u16 {
        self.channels
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_mono_to_stereo() {
        let buffer = SampleBuffer::new( 16, 1, 2, None );
        buffer.push( &[ 0.5, -0.5 ] );

        let mut out = [ 1.0; 6 ];
        assert_eq!( buffer.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.5, 0.5, -0.5, -0.5, 0.0, 0.0 ] );
    }


    #[test]
    fn test_stereo_to_mono() {
        let buffer = SampleBuffer::new( 16, 2, 1, None );
        buffer.push( &[ 1.0, 0.0, 0.5, 0.5 ] );

        let mut out = [ 1.0; 3 ];
        assert_eq!( buffer.pop( &mut out ), 2 );
        assert_eq!( out, [ 0.5, 0.5, 0.0 ] );
    }


    #[test]
    fn test_paused_outputs_silence_and_keeps_samples() {
        let buffer = SampleBuffer::new( 16, 2, 2, None );
        buffer.push( &[ 0.25; 4 ] );
        buffer.set_paused( true );

        let mut out = [ 1.0; 4 ];
        assert_eq!( buffer.pop( &mut out ), 0 );
        assert_eq!( out, [ 0.0; 4 ] );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_volume_applied() {
        let buffer = SampleBuffer::new( 16, 2, 2, None );
        buffer.set_volume( 0.5 );
        buffer.push( &[ 1.0, 1.0 ] );

        let mut out = [ 0.0; 2 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.5, 0.5 ] );
    }


    #[test]
    fn test_capacity_limits_push() {
        let buffer = SampleBuffer::new( 3, 1, 1, None );
        assert_eq!( buffer.push( &[ 0.1; 5 ] ), 3 );
        assert_eq!( buffer.push( &[ 0.1 ] ), 0 );
    }


    #[test]
    fn test_tap_sees_output() {
        let tap = Arc::new( AnalysisTap::new() );
        let buffer = SampleBuffer::new( 16, 2, 2, Some( Arc::clone( &tap ) ) );
        buffer.push( &[ 0.2, 0.4 ] );

        let mut out = [ 0.0; 2 ];
        buffer.pop( &mut out );
        let window = tap.snapshot();
        assert!( ( window[ window.len() - 1 ] - 0.3 ).abs() < 1e-6 );
    }
}
