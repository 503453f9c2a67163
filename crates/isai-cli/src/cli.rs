//! Command-line argument parsing for Isai.

use std::path::PathBuf;

use clap::Parser;


/// Isai - terminal client for the Isai music storefront.
#[derive( Parser, Debug )]
#[command( name = "isai" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Storefront server URL. Overrides the saved setting.
    #[arg( short, long )]
    pub server: Option<String>,

    /// Directory for log files. Defaults to the platform data directory.
    #[arg( long )]
    pub log_dir: Option<PathBuf>,

    /// Never route audio through the analysis tap; the visualizer animates instead.
    #[arg( long )]
    pub no_analysis: bool,

    /// Track ids to queue and start playing.
    #[arg( trailing_var_arg = true )]
    pub tracks: Vec<String>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parses_tracks_and_flags() {
        let args = Args::parse_from([ "isai", "--server", "http://shop:8080", "--no-analysis", "3", "7" ]);
        assert_eq!( args.server.as_deref(), Some( "http://shop:8080" ) );
        assert!( args.no_analysis );
        assert_eq!( args.tracks, vec![ "3".to_string(), "7".to_string() ] );
    }
}
