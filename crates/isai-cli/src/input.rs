//! Input handling for the TUI.
//!
//! Manages the current input mode (Normal, Command, Search), provides an
//! input buffer for text entry, maps key presses to player commands, and
//! resolves mouse clicks against the regions drawn last frame.

use crossterm::event::{ KeyCode, KeyEvent, KeyModifiers };
use isai_core::Command;
use ratatui::layout::Rect;


/// Seconds skipped by the arrow keys.
pub const SEEK_STEP_SECS: f64 = 10.0;

/// Volume change per arrow key press.
pub const VOLUME_STEP: f32 = 0.1;


/// Current input mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    /// Normal mode - keyboard shortcuts active.
    #[default]
    Normal,

    /// Command mode - typing a slash command.
    Command,

    /// Search mode - typing a catalog search term.
    Search,
}


/// Input buffer for command/search text entry.
#[derive( Debug, Default )]
pub struct InputBuffer {
    content: String,
    cursor: usize,
}


impl InputBuffer {
    /// Creates a new empty input buffer.
    pub fn new() -> Self {
        Self::default()
    }


    /// Inserts a character at the cursor position.
    pub fn insert( &mut self, c: char ) {
        self.content.insert( self.cursor, c );
        self.cursor += c.len_utf8();
    }


    /// Deletes the character before the cursor.
    pub fn backspace( &mut self ) {
        if self.cursor > 0 {
            let prev_char_boundary = self.content[ ..self.cursor ]
                .char_indices()
                .last()
                .map( |( i, _ )| i )
                .unwrap_or( 0 );
            self.content.remove( prev_char_boundary );
            self.cursor = prev_char_boundary;
        }
    }


    /// Deletes the character at the cursor position.
    pub fn delete( &mut self ) {
        if self.cursor < self.content.len() {
            self.content.remove( self.cursor );
        }
    }


    /// Clears the buffer.
    pub fn clear( &mut self ) {
        self.content.clear();
        self.cursor = 0;
    }


    /// Gets the current content.
    pub fn content( &self ) -> &str {
        &self.content
    }


    /// Gets the cursor position as character count (for display).
    pub fn cursor_char_pos( &self ) -> usize {
        self.content[ ..self.cursor ].chars().count()
    }


    /// Moves cursor left by one character.
    pub fn move_left( &mut self ) {
        if self.cursor > 0 {
            self.cursor = self.content[ ..self.cursor ]
                .char_indices()
                .last()
                .map( |( i, _ )| i )
                .unwrap_or( 0 );
        }
    }


    /// Moves cursor right by one character.
    pub fn move_right( &mut self ) {
        if self.cursor < self.content.len() {
            self.cursor = self.content[ self.cursor.. ]
                .char_indices()
                .nth( 1 )
                .map( |( i, _ )| self.cursor + i )
                .unwrap_or( self.content.len() );
        }
    }


    /// Moves cursor to the beginning.
    pub fn move_home( &mut self ) {
        self.cursor = 0;
    }


    /// Moves cursor to the end.
    pub fn move_end( &mut self ) {
        self.cursor = self.content.len();
    }


    /// Returns true if the buffer is empty.
    pub fn is_empty( &self ) -> bool {
        self.content.is_empty()
    }
}


/// Maps a key press in normal mode to a player or UI command.
///
/// Returns None for keys that are not bindings, including every key
/// pressed with Ctrl or Alt held.
pub fn key_command( key: &KeyEvent ) -> Option<Command> {
    if key.modifiers.intersects( KeyModifiers::CONTROL | KeyModifiers::ALT ) {
        return None;
    }

    let command = match key.code {
        KeyCode::Char( ' ' ) => Command::TogglePlayPause,
        KeyCode::Right => Command::SeekBy { seconds: SEEK_STEP_SECS },
        KeyCode::Left => Command::SeekBy { seconds: -SEEK_STEP_SECS },
        KeyCode::Up => Command::VolumeBy { delta: VOLUME_STEP },
        KeyCode::Down => Command::VolumeBy { delta: -VOLUME_STEP },
        KeyCode::Char( 'n' | 'N' ) => Command::Next,
        KeyCode::Char( 'p' | 'P' ) => Command::Prev,
        KeyCode::Char( 'm' | 'M' ) => Command::Mute,
        KeyCode::Char( 's' ) => Command::Shuffle,
        KeyCode::Char( 'r' ) => Command::Repeat,
        KeyCode::Char( 'l' ) => Command::Like,
        KeyCode::Char( 'e' ) => Command::Expand,
        KeyCode::Char( '?' ) => Command::Help,
        KeyCode::Char( 'q' ) => Command::Quit,
        _ => return None,
    };
    Some( command )
}


/// What a clickable region does.
#[derive( Debug, Clone, PartialEq )]
pub enum HitTarget {
    /// Progress bar: seeks to the clicked fraction.
    Progress,
    /// Volume bar: sets volume to the clicked fraction.
    Volume,
    /// Button or list row bound to a fixed command.
    Button( Command ),
}


/// Clickable regions registered while drawing.
///
/// Cleared at the start of every frame, so clicks always resolve against
/// what is on screen. Later regions win where they overlap.
#[derive( Debug, Default )]
pub struct HitMap {
    regions: Vec<( Rect, HitTarget )>,
}


impl HitMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }


    /// Forgets all regions.
    pub fn clear( &mut self ) {
        self.regions.clear();
    }


    /// Registers a region.
    pub fn add( &mut self, area: Rect, target: HitTarget ) {
        if area.width > 0 && area.height > 0 {
            self.regions.push(( area, target ));
        }
    }


    /// Resolves a click at `( column, row )` to a command.
    pub fn hit( &self, column: u16, row: u16 ) -> Option<Command> {
        let ( area, target ) = self.regions
            .iter()
            .rev()
            .find( |( area, _ )| contains( *area, column, row ) )?;

        let command = match target {
            HitTarget::Progress => Command::Seek { fraction: fraction_at( *area, column ) },
            HitTarget::Volume => Command::Volume { level: fraction_at( *area, column ) as f32 },
            HitTarget::Button( command ) => command.clone(),
        };
        Some( command )
    }
}


fn contains( area: Rect, column: u16, row: u16 ) -> bool {
    column >= area.x
        && column < area.x.saturating_add( area.width )
        && row >= area.y
        && row < area.y.saturating_add( area.height )
}


/// Horizontal position of `column` inside `area`, 0.0 at the left edge and
/// 1.0 at the right edge.
fn fraction_at( area: Rect, column: u16 ) -> f64 {
    if area.width <= 1 {
        return 0.0;
    }
    let offset = column.saturating_sub( area.x ) as f64;
    ( offset / ( area.width - 1 ) as f64 ).clamp( 0.0, 1.0 )
}


#[cfg( test )]
mod tests {
    use super::*;
    use isai_core::TrackId;


    fn key( code: KeyCode ) -> KeyEvent {
        KeyEvent::new( code, KeyModifiers::NONE )
    }


    #[test]
    fn test_buffer_editing_handles_multibyte() {
        let mut buffer = InputBuffer::new();
        for c in "héllo".chars() {
            buffer.insert( c );
        }
        buffer.move_left();
        buffer.backspace();
        assert_eq!( buffer.content(), "hélo" );
        assert_eq!( buffer.cursor_char_pos(), 3 );

        buffer.move_home();
        buffer.delete();
        assert_eq!( buffer.content(), "élo" );
    }


    #[test]
    fn test_transport_keys() {
        assert_eq!( key_command( &key( KeyCode::Char( ' ' ) ) ), Some( Command::TogglePlayPause ) );
        assert_eq!( key_command( &key( KeyCode::Char( 'N' ) ) ), Some( Command::Next ) );
        assert_eq!( key_command( &key( KeyCode::Char( 'p' ) ) ), Some( Command::Prev ) );
        assert_eq!( key_command( &key( KeyCode::Char( 'm' ) ) ), Some( Command::Mute ) );
        assert_eq!( key_command( &key( KeyCode::Left ) ), Some( Command::SeekBy { seconds: -10.0 } ) );
        assert_eq!( key_command( &key( KeyCode::Up ) ), Some( Command::VolumeBy { delta: 0.1 } ) );
        assert_eq!( key_command( &key( KeyCode::Char( 'x' ) ) ), None );
    }


    #[test]
    fn test_modified_keys_are_ignored() {
        let ctrl_n = KeyEvent::new( KeyCode::Char( 'n' ), KeyModifiers::CONTROL );
        assert_eq!( key_command( &ctrl_n ), None );
    }


    #[test]
    fn test_progress_click_seeks_by_fraction() {
        let mut hits = HitMap::new();
        hits.add( Rect::new( 10, 5, 21, 1 ), HitTarget::Progress );

        assert_eq!( hits.hit( 20, 5 ), Some( Command::Seek { fraction: 0.5 } ) );
        assert_eq!( hits.hit( 10, 5 ), Some( Command::Seek { fraction: 0.0 } ) );
        assert_eq!( hits.hit( 30, 5 ), Some( Command::Seek { fraction: 1.0 } ) );
        assert_eq!( hits.hit( 31, 5 ), None );
        assert_eq!( hits.hit( 20, 6 ), None );
    }


    #[test]
    fn test_both_surfaces_share_commands() {
        let mut hits = HitMap::new();
        hits.add( Rect::new( 0, 0, 3, 1 ), HitTarget::Button( Command::Next ) );
        hits.add( Rect::new( 0, 10, 3, 1 ), HitTarget::Button( Command::Next ) );
        hits.add( Rect::new( 40, 10, 11, 1 ), HitTarget::Volume );

        assert_eq!( hits.hit( 1, 0 ), hits.hit( 2, 10 ) );
        assert_eq!( hits.hit( 50, 10 ), Some( Command::Volume { level: 1.0 } ) );
    }


    #[test]
    fn test_later_region_wins_and_clear_forgets() {
        let mut hits = HitMap::new();
        hits.add( Rect::new( 0, 0, 10, 10 ), HitTarget::Button( Command::Home ) );
        hits.add( Rect::new( 2, 2, 2, 1 ), HitTarget::Button( Command::Play { id: TrackId::from( 4 ) } ) );

        assert_eq!( hits.hit( 3, 2 ), Some( Command::Play { id: TrackId::from( 4 ) } ) );
        assert_eq!( hits.hit( 8, 8 ), Some( Command::Home ) );

        hits.clear();
        assert_eq!( hits.hit( 3, 2 ), None );
    }
}
