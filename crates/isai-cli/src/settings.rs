//! Application settings management
//!
//! Persists the server URL and the listening preferences that survive a
//! restart (volume, shuffle, repeat) along with feature toggles.

use std::fs;
use std::path::PathBuf;

use isai_core::DEFAULT_VOLUME;
use serde::{ Deserialize, Serialize };


/// Server used when neither the settings file nor `--server` names one.
pub const DEFAULT_SERVER: &str = "http://localhost:5000";


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Storefront server root
    pub server_url: String,

    /// Last volume, 0.0 to 1.0
    pub volume: f32,

    pub shuffle: bool,

    pub repeat: bool,

    /// Route output through the FFT tap so the visualizer shows real bars
    pub analysis: bool,

    /// Publish now-playing to the system media controls (Windows)
    pub media_controls: bool,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER.to_string(),
            volume: DEFAULT_VOLUME,
            shuffle: false,
            repeat: false,
            analysis: true,
            media_controls: true,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "isai" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::from_json( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Parses settings, falling back to defaults for a corrupt file.
    fn from_json( contents: &str ) -> Self {
        let mut settings: Self = serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Ignoring malformed settings: {}", e );
            Self::default()
        });
        settings.volume = if settings.volume.is_finite() {
            settings.volume.clamp( 0.0, 1.0 )
        } else {
            DEFAULT_VOLUME
        };
        settings
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return,
        };

        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( &path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = Settings::from_json( r#"{ "shuffle": true }"# );
        assert!( settings.shuffle );
        assert_eq!( settings.server_url, DEFAULT_SERVER );
        assert_eq!( settings.volume, DEFAULT_VOLUME );
    }


    #[test]
    fn test_volume_is_clamped() {
        let settings = Settings::from_json( r#"{ "volume": 3.5 }"# );
        assert_eq!( settings.volume, 1.0 );
    }


    #[test]
    fn test_garbage_falls_back() {
        assert_eq!( Settings::from_json( "not json" ), Settings::default() );
    }
}
