//! Track metadata and identifiers
//!
//! Catalog responses carry song ids as JSON numbers, while search results and
//! externally sourced songs may carry them as strings. Everything is folded
//! into one canonical `TrackId` at deserialization time.

use std::fmt;
use std::str::FromStr;

use serde::{ Deserialize, Deserializer, Serialize, Serializer };


/// Canonical track identifier.
///
/// Numeric ids are stored in their shortest decimal form so that `12`,
/// `"12"`, `"012"` and `" 12 "` all compare equal. Anything else is kept
/// verbatim (minus surrounding whitespace).
#[derive( Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord )]
pub struct TrackId( String );


impl TrackId {
    /// Normalizes a raw identifier.
    pub fn new( raw: &str ) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok( n ) => Self( n.to_string() ),
            Err( _ ) => Self( trimmed.to_string() ),
        }
    }


    /// Returns the canonical string form.
    pub fn as_str( &self ) -> &str {
        &self.0
    }


    /// Returns the numeric value if this id is numeric.
    pub fn as_number( &self ) -> Option<i64> {
        self.0.parse().ok()
    }
}


impl From<i64> for TrackId {
    fn from( n: i64 ) -> Self {
        Self( n.to_string() )
    }
}


impl From<&str> for TrackId {
    fn from( s: &str ) -> Self {
        Self::new( s )
    }
}


impl FromStr for TrackId {
    type Err = std::convert::Infallible;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        Ok( Self::new( s ) )
    }
}


impl fmt::Display for TrackId {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( &self.0 )
    }
}


#[derive( Deserialize )]
#[serde( untagged )]
enum RawId {
    Int( i64 ),
    Float( f64 ),
    Text( String ),
}


impl<'de> Deserialize<'de> for TrackId {
    fn deserialize<D: Deserializer<'de>>( deserializer: D ) -> Result<Self, D::Error> {
        Ok( match RawId::deserialize( deserializer )? {
            RawId::Int( n ) => TrackId::from( n ),
            RawId::Float( f ) if f.fract() == 0.0 && f.is_finite() => TrackId::from( f as i64 ),
            RawId::Float( f ) => TrackId( f.to_string() ),
            RawId::Text( s ) => TrackId::new( &s ),
        })
    }
}


impl Serialize for TrackId {
    fn serialize<S: Serializer>( &self, serializer: S ) -> Result<S::Ok, S::Error> {
        match self.as_number() {
            Some( n ) => serializer.serialize_i64( n ),
            None => serializer.serialize_str( &self.0 ),
        }
    }
}


/// A playable song as returned by the catalog API.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    #[serde( default )]
    pub artist_name: String,
    #[serde( default )]
    pub album_name: Option<String>,
    #[serde( default )]
    pub genre: Option<String>,
    /// Length in seconds as reported by the catalog.
    #[serde( default )]
    pub duration: u32,
    pub audio_url: String,
    #[serde( default )]
    pub video_url: Option<String>,
    #[serde( default )]
    pub cover_image_url: Option<String>,
    #[serde( default )]
    pub plays: u64,
    #[serde( default )]
    pub liked: bool,
}


impl Track {
    /// Creates a track with the fields the engine needs; everything else defaults.
    pub fn new(
        id: impl Into<TrackId>,
        title: impl Into<String>,
        artist_name: impl Into<String>,
        audio_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist_name: artist_name.into(),
            album_name: None,
            genre: None,
            duration: 0,
            audio_url: audio_url.into(),
            video_url: None,
            cover_image_url: None,
            plays: 0,
            liked: false,
        }
    }


    /// Album name, or an empty string when the catalog has none.
    pub fn album( &self ) -> &str {
        self.album_name.as_deref().unwrap_or( "" )
    }


    /// Video URL, treating an empty string as absent.
    pub fn video( &self ) -> Option<&str> {
        self.video_url.as_deref().filter( |url| !url.is_empty() )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_numeric_ids_normalize() {
        assert_eq!( TrackId::from( 12 ), TrackId::new( "12" ) );
        assert_eq!( TrackId::new( " 012 " ), TrackId::from( 12 ) );
        assert_eq!( TrackId::new( "jio_AbC" ).as_str(), "jio_AbC" );
        assert_eq!( TrackId::new( "jio_AbC" ).as_number(), None );
    }


    #[test]
    fn test_deserialize_number_or_string() {
        let a: TrackId = serde_json::from_str( "7" ).unwrap();
        let b: TrackId = serde_json::from_str( "\"7\"" ).unwrap();
        let c: TrackId = serde_json::from_str( "7.0" ).unwrap();
        assert_eq!( a, b );
        assert_eq!( b, c );
    }


    #[test]
    fn test_track_from_catalog_json() {
        let json = r#"{
            "id": 3,
            "title": "Kaatril",
            "artistName": "Ilaiyaraaja",
            "albumName": null,
            "duration": 245,
            "audioUrl": "https://cdn.example/3.mp3",
            "videoUrl": "",
            "plays": 41,
            "liked": true,
            "featured": false
        }"#;
        let track: Track = serde_json::from_str( json ).unwrap();
        assert_eq!( track.id, TrackId::from( 3 ) );
        assert_eq!( track.album(), "" );
        assert_eq!( track.video(), None );
        assert_eq!( track.plays, 41 );
        assert!( track.liked );
    }


    #[test]
    fn test_serialize_numeric_id_as_number() {
        let json = serde_json::to_string( &TrackId::from( 5 ) ).unwrap();
        assert_eq!( json, "5" );
        let json = serde_json::to_string( &TrackId::new( "ext-9" ) ).unwrap();
        assert_eq!( json, "\"ext-9\"" );
    }
}
