//! Audio decoding via Symphonia
//!
//! Decodes a fetched media body (or a local file) into interleaved f32 PCM.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader, SeekMode, SeekTo };
use symphonia::core::io::{ MediaSource, MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use thiserror::Error;


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Seek error: {0}" )]
    Seek( String ),
}


/// Audio decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    duration: Option<f64>,
}


impl Decoder {
    /// Opens a local audio file.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let extension = path.extension().and_then( |e| e.to_str() );
        Self::from_source( Box::new( file ), extension, 64 * 1024 )
    }


    /// Opens an in-memory media body, typically a downloaded audio URL.
    ///
    /// `extension` is only a probing hint; the container is sniffed either way.
    pub fn from_bytes( bytes: Vec<u8>, extension: Option<&str> ) -> Result<Self, DecoderError> {
        Self::from_source( Box::new( Cursor::new( bytes ) ), extension, 64 * 1024 )
    }


    fn from_source(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        buffer_len: usize,
    ) -> Result<Self, DecoderError> {
        let mss_opts = MediaSourceStreamOptions { buffer_len };
        let mss = MediaSourceStream::new( source, mss_opts );

        let mut hint = Hint::new();
        if let Some( ext ) = extension {
            hint.with_extension( ext );
        }

        let format_opts = FormatOptions::default();
        let metadata_opts = MetadataOptions::default();

        // Probe the stream to determine format
        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &format_opts, &metadata_opts )
            .map_err( |_| DecoderError::UnsupportedFormat )?;

        let format_reader = probed.format;

        // Find the first audio track
        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );

        let duration = codec_params.n_frames.map( |frames| {
            frames as f64 / sample_rate as f64
        });

        tracing::info!(
            "Opened audio: {} Hz, {} channels, duration: {:?}s",
            sample_rate,
            channels,
            duration
        );

        let decoder_opts = DecoderOptions::default();
        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &decoder_opts )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
            duration,
        })
    }


    /// Returns the sample rate of the audio.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the number of channels.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the duration in seconds, if known.
    pub fn duration( &self ) -> Option<f64> {
        self.duration
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when EOF is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => {
                    // Decode errors are recoverable, skip this packet
                    continue;
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            let too_small = self.sample_buf
                .as_ref()
                .map_or( true, |buf| buf.capacity() < num_frames );
            if too_small {
                self.sample_buf = Some( SampleBuffer::new( num_frames as u64, spec ) );
            }

            let Some( sample_buf ) = self.sample_buf.as_mut() else {
                continue;
            };
            sample_buf.copy_interleaved_ref( decoded );

            return Ok( Some( sample_buf.samples().to_vec() ) );
        }
    }


    /// Seeks to a position in seconds.
    pub fn seek( &mut self, position_secs: f64 ) -> Result<(), DecoderError> {
        let seek_to = SeekTo::Time {
            time: Time::from( position_secs ),
            track_id: Some( self.track_id ),
        };

        self.format_reader
            .seek( SeekMode::Accurate, seek_to )
            .map_err( |e| DecoderError::Seek( e.to_string() ) )?;

        self.decoder.reset();

        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_garbage_is_unsupported() {
        let result = Decoder::from_bytes( b"definitely not audio".to_vec(), Some( "mp3" ) );
        assert!( matches!( result, Err( DecoderError::UnsupportedFormat ) ) );
    }


    #[test]
    fn test_missing_file() {
        let result = Decoder::open( Path::new( "/nonexistent/isai/track.mp3" ) );
        assert!( matches!( result, Err( DecoderError::FileOpen( _ ) ) ) );
    }
}
