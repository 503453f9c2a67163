//! View mode management for the TUI.
//!
//! Defines the different views available in the application.


/// Current view mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum ViewMode {
    /// Track listing (home, liked songs, search results, a playlist).
    #[default]
    Library,

    /// Expanded player with the visualizer.
    Expanded,

    /// Help overlay - shows available commands.
    Help,
}


impl ViewMode {
    /// Returns the next view in tab order (excluding Help overlay).
    pub fn next_tab( self ) -> Self {
        match self {
            ViewMode::Library => ViewMode::Expanded,
            ViewMode::Expanded => ViewMode::Library,
            ViewMode::Help => ViewMode::Help, // Help stays on Help until dismissed
        }
    }


    /// Returns the name shown in the header.
    pub fn name( self ) -> &'static str {
        match self {
            ViewMode::Library => "Library",
            ViewMode::Expanded => "Now Playing",
            ViewMode::Help => "Help",
        }
    }
}


/// What the library view is currently listing.
#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub enum Listing {
    #[default]
    Home,
    Liked,
    Search( String ),
    Playlist( String ),
}


impl Listing {
    /// Title for the list block.
    pub fn title( &self ) -> String {
        match self {
            Listing::Home => "All Songs".to_string(),
            Listing::Liked => "Liked Songs".to_string(),
            Listing::Search( term ) => format!( "Search: {}", term ),
            Listing::Playlist( name ) => format!( "Playlist: {}", name ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_tab_toggles_player_views() {
        assert_eq!( ViewMode::Library.next_tab(), ViewMode::Expanded );
        assert_eq!( ViewMode::Expanded.next_tab(), ViewMode::Library );
        assert_eq!( ViewMode::Help.next_tab(), ViewMode::Help );
    }
}
