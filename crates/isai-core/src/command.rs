//! Player commands and slash command parsing.
//!
//! Every input surface (keyboard shortcuts, mouse hits on either player
//! widget, host media buttons, typed slash commands) is reduced to a
//! `Command` before it reaches the player.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::track::TrackId;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// A request against the playback engine or the front end.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playback commands
    Play { id: TrackId },
    TogglePlayPause,
    Next,
    Prev,
    Shuffle,
    Repeat,
    /// Seek to a fraction of the duration.
    Seek { fraction: f64 },
    /// Seek to an absolute position.
    SeekTo { position: Duration },
    /// Relative seek in seconds.
    SeekBy { seconds: f64 },
    Volume { level: f32 },
    VolumeBy { delta: f32 },
    Mute,
    Like,

    // Queue and catalog commands
    Liked,
    Playlist { id: String },
    Search { term: String },
    Home,

    // UI commands
    Expand,
    Help,
    Quit,
}


/// Percentage argument like `40` or `40%`.
struct Percent( f64 );


impl FromStr for Percent {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        let value: f64 = s.trim().trim_end_matches( '%' ).parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid percentage: {}", s ) ) )?;
        if !( 0.0..=100.0 ).contains( &value ) {
            return Err( CommandError::InvalidArgument( format!( "Out of range: {}", s ) ) );
        }
        Ok( Percent( value / 100.0 ) )
    }
}


impl Command {
    /// Parses a command string (without the leading `/`).
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            // Playback commands
            "play" | "p" => match args {
                Some( id ) => Ok( Command::Play { id: TrackId::new( id ) } ),
                None => Ok( Command::TogglePlayPause ),
            },
            "pause" | "pa" | "toggle" => Ok( Command::TogglePlayPause ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "shuffle" | "sh" => Ok( Command::Shuffle ),
            "repeat" | "rep" => Ok( Command::Repeat ),
            "seek" | "sk" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                if arg.ends_with( '%' ) {
                    let Percent( fraction ) = arg.parse()?;
                    Ok( Command::Seek { fraction } )
                } else {
                    Ok( Command::SeekTo { position: parse_time( arg )? } )
                }
            }
            "vol" | "volume" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "volume level".into() ) )?;
                let Percent( level ) = arg.parse()?;
                Ok( Command::Volume { level: level as f32 } )
            }
            "mute" | "m" => Ok( Command::Mute ),
            "like" | "heart" => Ok( Command::Like ),

            // Queue and catalog commands
            "liked" => Ok( Command::Liked ),
            "playlist" | "pl" => {
                let id = args
                    .ok_or_else( || CommandError::MissingArgument( "playlist id".into() ) )?;
                Ok( Command::Playlist { id: id.to_string() } )
            }
            "search" | "find" | "?" => {
                let term = args
                    .ok_or_else( || CommandError::MissingArgument( "search term".into() ) )?;
                Ok( Command::Search { term: term.to_string() } )
            }
            "home" | "~" | "reload" => Ok( Command::Home ),

            // UI commands
            "expand" | "vis" | "visualizer" => Ok( Command::Expand ),
            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Play { .. } => "Play a track by id",
            Command::TogglePlayPause => "Toggle play/pause",
            Command::Next => "Next track",
            Command::Prev => "Previous track (or restart)",
            Command::Shuffle => "Toggle shuffle",
            Command::Repeat => "Toggle repeat",
            Command::Seek { .. } => "Seek to percentage",
            Command::SeekTo { .. } => "Seek to position",
            Command::SeekBy { .. } => "Seek relative",
            Command::Volume { .. } => "Set volume (0-100)",
            Command::VolumeBy { .. } => "Change volume",
            Command::Mute => "Toggle mute",
            Command::Like => "Like/unlike current track",
            Command::Liked => "Play liked songs",
            Command::Playlist { .. } => "Play a playlist",
            Command::Search { .. } => "Search the catalog",
            Command::Home => "Reload the catalog",
            Command::Expand => "Toggle expanded player",
            Command::Help => "Show help",
            Command::Quit => "Quit application",
        }
    }
}


/// Parses a time string like "1:30" or "90" into a Duration.
///
/// @param s - Time string in format "MM:SS", "M:SS", or just seconds
///
/// @returns Duration or error
fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        Ok( Duration::from_secs( minutes * 60 + seconds ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playback Commands:
  /play [id]      Play track by id, or toggle  [Space]
  /next           Next track                   [n]
  /prev           Previous track / restart     [p]
  /seek <time>    Seek (1:30, 90 or 40%)       [Left/Right]
  /vol <0-100>    Set volume                   [Up/Down]
  /mute           Toggle mute                  [m]
  /shuffle        Toggle shuffle               [s]
  /repeat         Toggle repeat                [r]
  /like           Like the current track       [l]

Queue Commands:
  /liked          Play liked songs
  /playlist <id>  Play a playlist
  /search <term>  Search the catalog
  /home           Reload the catalog

Other Commands:
  /expand         Toggle expanded player       [e]
  /help           Show this help               [?]
  /quit           Exit isai                    [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play_with_id() {
        let cmd = Command::parse( "play 12" ).unwrap();
        assert_eq!( cmd, Command::Play { id: TrackId::from( 12 ) } );
    }


    #[test]
    fn test_parse_play_without_id_toggles() {
        assert_eq!( Command::parse( "play" ).unwrap(), Command::TogglePlayPause );
        assert_eq!( Command::parse( "p  " ).unwrap(), Command::TogglePlayPause );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::SeekTo { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_percent() {
        let cmd = Command::parse( "seek 25%" ).unwrap();
        assert_eq!( cmd, Command::Seek { fraction: 0.25 } );
    }


    #[test]
    fn test_parse_volume() {
        let cmd = Command::parse( "vol 70" ).unwrap();
        assert_eq!( cmd, Command::Volume { level: 0.7 } );
        assert!( matches!( Command::parse( "vol 170" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_playlist() {
        let cmd = Command::parse( "pl 4" ).unwrap();
        assert_eq!( cmd, Command::Playlist { id: "4".into() } );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "search" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
