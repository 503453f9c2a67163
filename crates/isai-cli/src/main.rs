//! Isai CLI - Terminal client for the Isai music storefront

mod cli;
mod input;
mod logging;
mod media_controls;
mod settings;
mod view;

use std::io;
use std::sync::Arc;
use std::time::{ Duration, Instant };

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    layout::Alignment,
    prelude::*,
    widgets::{ Block, Borders, List, ListItem, ListState, Paragraph, Wrap },
};
use tokio::sync::mpsc::{ self, UnboundedReceiver, UnboundedSender };
use tokio::sync::watch;

use cli::Args;
use input::{ key_command, HitMap, HitTarget, InputBuffer, InputMode };
use settings::Settings;
use view::{ Listing, ViewMode };

use isai_core::{
    command,
    AudioSink, CatalogError, Command, HttpCatalog, Player, PlayerEvent, Progress, RemoteCatalog,
    SessionSnapshot, SinkNotifier, Track, TrackId, TransportState, Visualizer, BARS,
};


/// Result of a catalog request made on behalf of the UI.
enum Loaded {
    /// A listing for the library view; `play` replaces the queue and starts it.
    Listing { listing: Listing, tracks: Vec<Track>, play: bool },
    /// Tracks named on the command line.
    Queue( Vec<Track> ),
    Failed( String ),
}


/// Application state.
struct App {
    player: Player<AudioSink>,
    events: UnboundedReceiver<PlayerEvent>,
    catalog: Arc<HttpCatalog>,
    should_quit: bool,

    // Catalog requests
    loaded_tx: UnboundedSender<Loaded>,
    loaded_rx: UnboundedReceiver<Loaded>,
    listing: Listing,

    // View state
    view_mode: ViewMode,
    list_state: ListState,
    help_scroll: u16,
    visualizer: Visualizer,
    started: Instant,

    // One subscription per player surface
    mini_progress: watch::Receiver<Progress>,
    expanded_progress: watch::Receiver<Progress>,

    // Clickable regions of the last frame
    hits: HitMap,

    // Input state
    input_mode: InputMode,
    input_buffer: InputBuffer,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,

    settings: Settings,
}


impl App {
    /// Creates a new App instance. Must be called inside the tokio runtime.
    fn new( args: &Args, runtime: tokio::runtime::Handle ) -> Result<Self> {
        let mut settings = Settings::load();
        if let Some( server ) = &args.server {
            settings.server_url = server.clone();
        }
        if args.no_analysis {
            settings.analysis = false;
        }

        let catalog = Arc::new( HttpCatalog::new( settings.server_url.as_str() )? );
        tracing::info!( server = %catalog.base_url(), "Starting isai" );

        let ( tx, events ) = mpsc::unbounded_channel();
        let sink = AudioSink::new(
            SinkNotifier::new( tx.clone() ),
            runtime,
            Some( catalog.base_url().to_string() ),
            settings.analysis,
        )?;

        let remote: Arc<dyn RemoteCatalog> = catalog.clone();
        let mut player = Player::new( sink, remote, tx )
            .with_media_session( media_controls::media_session( settings.media_controls ) );
        player.set_volume( settings.volume );
        player.set_shuffle( settings.shuffle );
        player.set_repeat( settings.repeat );

        let mini_progress = player.subscribe_progress();
        let expanded_progress = player.subscribe_progress();
        let ( loaded_tx, loaded_rx ) = mpsc::unbounded_channel();

        let app = Self {
            player,
            events,
            catalog,
            should_quit: false,
            loaded_tx,
            loaded_rx,
            listing: Listing::Home,
            view_mode: ViewMode::default(),
            list_state: ListState::default(),
            help_scroll: 0,
            visualizer: Visualizer::new(),
            started: Instant::now(),
            mini_progress,
            expanded_progress,
            hits: HitMap::new(),
            input_mode: InputMode::Normal,
            input_buffer: InputBuffer::new(),
            status_message: None,
            status_clear_at: None,
            settings,
        };

        app.load( Listing::Home, false );
        if !args.tracks.is_empty() {
            app.load_queue( args.tracks.iter().map( |raw| TrackId::new( raw ) ).collect() );
        }

        Ok( app )
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Updates app state: clears expired messages and applies everything
    /// the player and catalog requests reported since the last tick.
    fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }

        while let Ok( event ) = self.events.try_recv() {
            self.player.handle_event( event );
        }

        while let Ok( loaded ) = self.loaded_rx.try_recv() {
            self.apply_loaded( loaded );
        }
    }


    /// Requests a listing from the server.
    fn load( &self, listing: Listing, play: bool ) {
        let catalog = Arc::clone( &self.catalog );
        let tx = self.loaded_tx.clone();
        tokio::spawn( async move {
            let loaded = match fetch_listing( &catalog, listing ).await {
                Ok(( listing, tracks )) => Loaded::Listing { listing, tracks, play },
                Err( e ) => Loaded::Failed( e.to_string() ),
            };
            let _ = tx.send( loaded );
        });
    }


    /// Resolves the given ids and queues whichever exist.
    fn load_queue( &self, ids: Vec<TrackId> ) {
        let catalog = Arc::clone( &self.catalog );
        let tx = self.loaded_tx.clone();
        tokio::spawn( async move {
            let mut tracks = Vec::with_capacity( ids.len() );
            for id in ids {
                match catalog.fetch_track( &id ).await {
                    Ok( Some( track ) ) => tracks.push( track ),
                    Ok( None ) => tracing::warn!( %id, "Track not found, skipping" ),
                    Err( e ) => {
                        let _ = tx.send( Loaded::Failed( e.to_string() ) );
                        return;
                    }
                }
            }
            let _ = tx.send( Loaded::Queue( tracks ) );
        });
    }


    fn apply_loaded( &mut self, loaded: Loaded ) {
        match loaded {
            Loaded::Listing { listing, tracks, play } => {
                tracing::debug!( listing = %listing.title(), count = tracks.len(), "Listing loaded" );
                if tracks.is_empty() {
                    self.set_status( format!( "{}: nothing here", listing.title() ) );
                }
                if play {
                    self.player.play_all( tracks.clone() );
                }
                self.player.set_catalog( tracks );
                self.list_state.select( if self.player.catalog().is_empty() { None } else { Some( 0 ) } );
                self.listing = listing;
            }
            Loaded::Queue( tracks ) => {
                if tracks.is_empty() {
                    self.set_status( "None of the requested tracks exist" );
                } else {
                    self.set_status( format!( "Queued {} tracks", tracks.len() ) );
                    self.player.play_all( tracks );
                }
            }
            Loaded::Failed( e ) => {
                tracing::warn!( "Catalog request failed: {}", e );
                self.set_status( format!( "Server error: {}", e ) );
            }
        }
    }


    /// Switches view, starting or stopping the visualizer as the expanded
    /// player appears or disappears.
    fn set_view( &mut self, mode: ViewMode ) {
        if mode == self.view_mode {
            return;
        }
        if mode == ViewMode::Expanded {
            self.visualizer.expand( self.player.sink() );
        } else if self.view_mode == ViewMode::Expanded {
            self.visualizer.collapse();
        }
        self.view_mode = mode;
    }


    /// Handles key events.
    fn handle_key( &mut self, key: KeyEvent ) {
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key( key ),
            InputMode::Command | InputMode::Search => self.handle_text_key( key.code ),
        }
    }


    /// Handles mouse events.
    fn handle_mouse( &mut self, column: u16, row: u16, kind: MouseEventKind ) {
        match kind {
            MouseEventKind::Down( MouseButton::Left ) => {
                if let Some( cmd ) = self.hits.hit( column, row ) {
                    self.run_command( cmd );
                }
            }
            MouseEventKind::ScrollUp => self.scroll( -1 ),
            MouseEventKind::ScrollDown => self.scroll( 1 ),
            _ => {}
        }
    }


    fn handle_normal_key( &mut self, key: KeyEvent ) {
        // Keys that only make sense in the TUI
        match key.code {
            KeyCode::Char( '/' ) => {
                self.input_mode = InputMode::Command;
                self.input_buffer.clear();
                return;
            }
            KeyCode::Char( 'f' ) => {
                self.input_mode = InputMode::Search;
                self.input_buffer.clear();
                return;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.set_view( self.view_mode.next_tab() );
                return;
            }
            KeyCode::Esc => {
                self.set_view( ViewMode::Library );
                return;
            }
            KeyCode::Char( 'j' ) => {
                self.scroll( 1 );
                return;
            }
            KeyCode::Char( 'k' ) => {
                self.scroll( -1 );
                return;
            }
            KeyCode::Enter if self.view_mode == ViewMode::Library => {
                self.play_selected();
                return;
            }
            _ => {}
        }

        if let Some( cmd ) = key_command( &key ) {
            self.run_command( cmd );
        }
    }


    /// Handles keys while a command or search prompt has focus. Player
    /// bindings are inactive here.
    fn handle_text_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                let input = self.input_buffer.content().to_string();
                match self.input_mode {
                    InputMode::Search if !input.trim().is_empty() => {
                        self.run_command( Command::Search { term: input.trim().to_string() } );
                    }
                    InputMode::Command => self.execute_command( &input ),
                    _ => {}
                }
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Backspace => {
                if self.input_buffer.is_empty() {
                    self.input_mode = InputMode::Normal;
                } else {
                    self.input_buffer.backspace();
                }
            }
            KeyCode::Delete => {
                self.input_buffer.delete();
            }
            KeyCode::Left => {
                self.input_buffer.move_left();
            }
            KeyCode::Right => {
                self.input_buffer.move_right();
            }
            KeyCode::Home => {
                self.input_buffer.move_home();
            }
            KeyCode::End => {
                self.input_buffer.move_end();
            }
            KeyCode::Char( c ) => {
                self.input_buffer.insert( c );
            }
            _ => {}
        }
    }


    fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( cmd ) => self.run_command( cmd ),
            Err( e ) => self.set_status( format!( "{}", e ) ),
        }
    }


    fn run_command( &mut self, cmd: Command ) {
        match cmd {
            Command::Liked => {
                self.set_status( "Loading liked songs..." );
                self.load( Listing::Liked, true );
            }
            Command::Playlist { id } => {
                self.set_status( format!( "Loading playlist {}...", id ) );
                self.load( Listing::Playlist( id ), true );
            }
            Command::Search { term } => {
                self.set_status( format!( "Searching for \"{}\"...", term ) );
                self.load( Listing::Search( term ), false );
            }
            Command::Home => {
                self.load( Listing::Home, false );
            }
            Command::Expand => {
                let mode = if self.view_mode == ViewMode::Expanded { ViewMode::Library } else { ViewMode::Expanded };
                self.set_view( mode );
            }
            Command::Help => {
                let mode = if self.view_mode == ViewMode::Help { ViewMode::Library } else { ViewMode::Help };
                self.set_view( mode );
            }
            Command::Quit => {
                self.should_quit = true;
            }
            cmd => {
                self.player.execute( &cmd );
                match cmd {
                    Command::Shuffle => {
                        let on = self.player.shuffle();
                        self.set_status( if on { "Shuffle on" } else { "Shuffle off" } );
                    }
                    Command::Repeat => {
                        let on = self.player.repeat();
                        self.set_status( if on { "Repeat on" } else { "Repeat off" } );
                    }
                    Command::Volume { .. } | Command::VolumeBy { .. } => {
                        let percent = ( self.player.volume() * 100.0 ).round();
                        self.set_status( format!( "Volume: {}%", percent ) );
                    }
                    _ => {}
                }
            }
        }
    }


    /// Moves the library selection, or scrolls help.
    fn scroll( &mut self, delta: i32 ) {
        match self.view_mode {
            ViewMode::Library => {
                let len = self.player.catalog().len();
                if len == 0 {
                    return;
                }
                let current = self.list_state.selected().unwrap_or( 0 ) as i64;
                let next = ( current + delta as i64 ).clamp( 0, len as i64 - 1 );
                self.list_state.select( Some( next as usize ) );
            }
            ViewMode::Help => {
                self.help_scroll = self.help_scroll.saturating_add_signed( delta as i16 );
            }
            ViewMode::Expanded => {}
        }
    }


    fn play_selected( &mut self ) {
        let id = self.list_state
            .selected()
            .and_then( |i| self.player.catalog().tracks().get( i ) )
            .map( |t| t.id.clone() );
        if let Some( id ) = id {
            self.player.play( id );
        }
    }


    /// Persists listening preferences.
    fn save_settings( &mut self ) {
        self.settings.volume = self.player.volume();
        self.settings.shuffle = self.player.shuffle();
        self.settings.repeat = self.player.repeat();
        self.settings.save();
    }
}


/// Fetches a listing. Playlists come back renamed to their title.
async fn fetch_listing( catalog: &HttpCatalog, listing: Listing ) -> Result<( Listing, Vec<Track> ), CatalogError> {
    let tracks = match &listing {
        Listing::Home => catalog.list_tracks().await?,
        Listing::Liked => catalog.liked_tracks().await?,
        Listing::Search( term ) => catalog.search( term ).await?,
        Listing::Playlist( id ) => {
            let playlist = catalog.playlist( id ).await?;
            return Ok(( Listing::Playlist( playlist.name ), playlist.songs ));
        }
    };
    Ok(( listing, tracks ))
}


fn main() -> Result<()> {
    let args = Args::parse();

    let log_dir = args.log_dir.clone().unwrap_or_else( logging::default_log_dir );
    let _log_guard = logging::init( &log_dir )?;

    // The UI loop stays synchronous; async work is spawned onto this runtime
    let runtime = tokio::runtime::Runtime::new()?;
    let _runtime_guard = runtime.enter();

    let mut app = App::new( &args, runtime.handle().clone() )?;

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    io::stdout().execute( crossterm::event::EnableMouseCapture )?;

    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    let result = run( &mut terminal, &mut app );

    // Cleanup
    io::stdout().execute( crossterm::event::DisableMouseCapture )?;
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    app.save_settings();
    tracing::info!( "Exiting" );
    result
}


fn run( terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App ) -> Result<()> {
    loop {
        app.tick();

        terminal.draw( |frame| draw_ui( frame, app ) )?;

        // Faster frames while the visualizer animates
        let timeout = if app.visualizer.state().is_animating() {
            Duration::from_millis( 33 )
        } else {
            Duration::from_millis( 100 )
        };

        if event::poll( timeout )? {
            match event::read()? {
                Event::Key( key ) if key.kind == KeyEventKind::Press => {
                    app.handle_key( key );
                }
                Event::Mouse( mouse ) => {
                    app.handle_mouse( mouse.column, mouse.row, mouse.kind );
                }
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &mut App ) {
    app.hits.clear();
    let area = frame.area();

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Main content
            Constraint::Length( 5 ),  // Mini player
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( area );

    let header = Paragraph::new( format!( "  ISAI - {}", app.view_mode.name().to_uppercase() ) )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[0] );

    match app.view_mode {
        ViewMode::Library => draw_library( frame, app, chunks[1] ),
        ViewMode::Expanded => draw_expanded( frame, app, chunks[1] ),
        ViewMode::Help => draw_help( frame, app, chunks[1] ),
    }

    draw_mini_player( frame, app, chunks[2] );
    draw_status_bar( frame, app, chunks[3] );
}


fn draw_library( frame: &mut Frame, app: &mut App, area: Rect ) {
    let playing = app.player.current().map( |t| t.id.clone() );
    let tracks = app.player.catalog().tracks();

    let items: Vec<ListItem> = tracks
        .iter()
        .map( |track| {
            let prefix = if Some( &track.id ) == playing.as_ref() { "▶ " } else { "  " };
            let heart = if track.liked { " ♥" } else { "" };
            let line = Line::from( vec![
                Span::raw( format!( "{}{}", prefix, track.title ) ),
                Span::styled( format!( "  {}", track.artist_name ), Style::default().fg( Color::Gray ) ),
                Span::styled(
                    format!( "  {}  {} plays{}", isai_core::format_time( track.duration as f64 ), track.plays, heart ),
                    Style::default().fg( Color::DarkGray ),
                ),
            ]);
            ListItem::new( line )
        })
        .collect();

    let title = format!( " {} ({}) ", app.listing.title(), tracks.len() );
    let widget = List::new( items )
        .block( Block::default().title( title ).borders( Borders::ALL ) )
        .highlight_style( Style::default().bg( Color::DarkGray ) )
        .highlight_symbol( ">> " );

    let len = tracks.len();
    frame.render_stateful_widget( widget, area, &mut app.list_state );

    // Clicking a row plays it
    let offset = app.list_state.offset();
    let visible = area.height.saturating_sub( 2 ) as usize;
    for ( row, index ) in ( offset..len.min( offset + visible ) ).enumerate() {
        if let Some( track ) = app.player.catalog().tracks().get( index ) {
            let rect = Rect::new( area.x + 1, area.y + 1 + row as u16, area.width.saturating_sub( 2 ), 1 );
            app.hits.add( rect, HitTarget::Button( Command::Play { id: track.id.clone() } ) );
        }
    }
}


fn draw_help( frame: &mut Frame, app: &mut App, area: Rect ) {
    let help_text = command::help_text();
    let line_count = help_text.lines().count() as u16;
    let visible_height = area.height.saturating_sub( 2 ); // Account for borders

    // Clamp scroll to valid range
    let max_scroll = line_count.saturating_sub( visible_height );
    if app.help_scroll > max_scroll {
        app.help_scroll = max_scroll;
    }

    let help = Paragraph::new( help_text )
        .block( Block::default()
            .title( " Help (j/k scroll, ? or Esc to close) " )
            .borders( Borders::ALL )
        )
        .wrap( Wrap { trim: false } )
        .scroll(( app.help_scroll, 0 ));

    frame.render_widget( help, area );
}


/// Draws the expanded player: details, visualizer, and a second set of controls.
fn draw_expanded( frame: &mut Frame, app: &mut App, area: Rect ) {
    let snapshot = app.player.snapshot();
    let block = Block::default().title( " Now Playing " ).borders( Borders::ALL );
    let inner = block.inner( area );
    frame.render_widget( block, area );

    let rows = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 4 ),  // Details
            Constraint::Min( 0 ),     // Visualizer
            Constraint::Length( 1 ),  // Progress
            Constraint::Length( 1 ),  // Controls
        ])
        .split( inner );

    let mut details = Vec::new();
    match &snapshot.track {
        Some( track ) => {
            details.push( Line::from( Span::styled( track.title.clone(), Style::default().bold() ) ) );
            details.push( Line::from( Span::styled( track.artist_name.clone(), Style::default().fg( Color::Gray ) ) ) );
            if !track.album().is_empty() {
                details.push( Line::from( Span::styled( track.album().to_string(), Style::default().fg( Color::DarkGray ) ) ) );
            }
            if let Some( video ) = track.video() {
                details.push( Line::from( Span::styled( format!( "Video: {}", video ), Style::default().fg( Color::Blue ) ) ) );
            }
        }
        None => details.push( Line::from( Span::styled( "Nothing playing", Style::default().fg( Color::DarkGray ).italic() ) ) ),
    }
    frame.render_widget( Paragraph::new( details ).alignment( Alignment::Center ), rows[0] );

    let t = app.started.elapsed().as_secs_f64();
    let bars = app.visualizer.frame( t, snapshot.state.is_playing() ).copied();
    draw_visualizer( frame, bars.as_ref(), rows[1] );

    let progress = app.expanded_progress.borrow().clone();
    draw_progress_row( frame, &mut app.hits, rows[2], &progress );
    draw_controls_row( frame, &mut app.hits, rows[3], &snapshot );
}


/// Draws the frequency bars, one column per bar when the area is wide enough.
fn draw_visualizer( frame: &mut Frame, bars: Option<&[f32; BARS]>, area: Rect ) {
    let height = area.height as usize;
    let width = area.width as usize;
    if height == 0 || width == 0 {
        return;
    }

    let Some( data ) = bars else {
        return;
    };

    let mut lines = Vec::with_capacity( height );
    draw_vis_bars( &mut lines, data, height, width );

    let visualizer = Paragraph::new( lines ).alignment( Alignment::Center );
    frame.render_widget( visualizer, area );
}


fn draw_vis_bars( lines: &mut Vec<Line<'static>>, data: &[f32; BARS], height: usize, width: usize ) {
    let vis_chars = [ '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█' ];

    let bar_width = if width >= BARS * 2 { 2 } else { 1 };
    let num_bars = ( width / bar_width ).min( BARS );

    for row in ( 0..height ).rev() {
        let mut line_content = String::with_capacity( num_bars * bar_width );

        for bar_idx in 0..num_bars {
            let data_idx = ( bar_idx * BARS ) / num_bars;
            let amp = data[ data_idx.min( BARS - 1 ) ].clamp( 0.0, 1.0 );
            let filled = amp * height as f32;

            let ch = if filled >= ( row + 1 ) as f32 {
                '█'
            } else if filled > row as f32 {
                let level = (( filled - row as f32 ) * 8.0 ) as usize;
                vis_chars[ level.min( 7 ) ]
            } else {
                ' '
            };
            for _ in 0..bar_width {
                line_content.push( ch );
            }
        }

        lines.push( Line::from( Span::styled( line_content, Style::default().fg( Color::Cyan ) ) ) );
    }
}


fn draw_mini_player( frame: &mut Frame, app: &mut App, area: Rect ) {
    let snapshot = app.player.snapshot();
    let block = Block::default().title( " Player " ).borders( Borders::ALL );
    let inner = block.inner( area );
    frame.render_widget( block, area );

    let rows = Layout::default()
        .direction( Direction::Vertical )
        .constraints([ Constraint::Length( 1 ), Constraint::Length( 1 ), Constraint::Length( 1 ) ])
        .split( inner );

    let title = match &snapshot.track {
        Some( track ) => {
            let heart = if track.liked { "  ♥" } else { "" };
            Line::from( vec![
                Span::styled( format!( " {} {}", state_icon( snapshot.state ), track.title ), Style::default().bold() ),
                Span::styled( format!( " - {}", track.artist_name ), Style::default().fg( Color::Gray ) ),
                Span::styled( heart.to_string(), Style::default().fg( Color::Red ) ),
            ])
        }
        None => Line::from( Span::styled( " No track", Style::default().fg( Color::DarkGray ) ) ),
    };
    frame.render_widget( Paragraph::new( title ), rows[0] );

    let progress = app.mini_progress.borrow().clone();
    draw_progress_row( frame, &mut app.hits, rows[1], &progress );
    draw_controls_row( frame, &mut app.hits, rows[2], &snapshot );
}


fn state_icon( state: TransportState ) -> &'static str {
    match state {
        TransportState::Playing => "▶",
        TransportState::Paused => "||",
        TransportState::Loading => "…",
        TransportState::Stopped => "■",
    }
}


/// Renders `ratio` as a bar of `width` cells.
fn bar( ratio: f64, width: u16 ) -> String {
    let width = width as usize;
    let filled = (( ratio.clamp( 0.0, 1.0 ) * width as f64 ).round() as usize ).min( width );
    format!( "{}{}", "█".repeat( filled ), "░".repeat( width - filled ) )
}


/// `elapsed [bar] total`, with the bar registered as a seek target.
fn draw_progress_row( frame: &mut Frame, hits: &mut HitMap, area: Rect, progress: &Progress ) {
    let elapsed = format!( " {} ", progress.elapsed );
    let total = format!( " {} ", progress.total );
    let bar_width = area.width.saturating_sub( ( elapsed.chars().count() + total.chars().count() ) as u16 );

    let line = Line::from( vec![
        Span::raw( elapsed.clone() ),
        Span::styled( bar( progress.ratio(), bar_width ), Style::default().fg( Color::Cyan ) ),
        Span::raw( total ),
    ]);
    frame.render_widget( Paragraph::new( line ), area );

    let bar_rect = Rect::new( area.x + elapsed.chars().count() as u16, area.y, bar_width, 1 );
    hits.add( bar_rect, HitTarget::Progress );
}


/// Transport buttons on the left, volume bar on the right.
fn draw_controls_row( frame: &mut Frame, hits: &mut HitMap, area: Rect, snapshot: &SessionSnapshot ) {
    let on = Style::default().fg( Color::Yellow ).bold();
    let off = Style::default().fg( Color::Gray );
    let liked = snapshot.track.as_ref().is_some_and( |t| t.liked );

    let buttons = [
        ( "[shuf]", if snapshot.shuffle { on } else { off }, Command::Shuffle ),
        ( "[|<]", off, Command::Prev ),
        ( if snapshot.state.is_playing() { "[||]" } else { "[>]" }, on, Command::TogglePlayPause ),
        ( "[>|]", off, Command::Next ),
        ( "[rep]", if snapshot.repeat { on } else { off }, Command::Repeat ),
        ( "[♥]", if liked { Style::default().fg( Color::Red ) } else { off }, Command::Like ),
    ];

    let mut spans = vec![ Span::raw( " " ) ];
    let mut x = area.x + 1;
    for ( label, style, command ) in buttons {
        let width = label.chars().count() as u16;
        hits.add( Rect::new( x, area.y, width, 1 ), HitTarget::Button( command ) );
        spans.push( Span::styled( label, style ) );
        spans.push( Span::raw( " " ) );
        x += width + 1;
    }
    frame.render_widget( Paragraph::new( Line::from( spans ) ), area );

    // Volume bar, right aligned
    let label = if snapshot.muted { " mute " } else { " vol " };
    let bar_width = 10;
    let total = label.len() as u16 + bar_width + 1;
    if area.width < total || area.x + area.width - total < x {
        return;
    }
    let vol_area = Rect::new( area.x + area.width - total, area.y, total, 1 );
    let level = if snapshot.muted { 0.0 } else { snapshot.volume as f64 };
    let line = Line::from( vec![
        Span::styled( label, Style::default().fg( Color::Gray ) ),
        Span::styled( bar( level, bar_width ), Style::default().fg( Color::Green ) ),
    ]);
    frame.render_widget( Paragraph::new( line ), vol_area );
    hits.add( Rect::new( vol_area.x + label.len() as u16, area.y, bar_width, 1 ), HitTarget::Volume );
}


fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    let ( text, style ) = match app.input_mode {
        InputMode::Command => {
            ( format!( "/{}", app.input_buffer.content() ), Style::default().fg( Color::Yellow ) )
        }
        InputMode::Search => {
            ( format!( "Search: {}", app.input_buffer.content() ), Style::default().fg( Color::Yellow ) )
        }
        InputMode::Normal => {
            if let Some( ref msg ) = app.status_message {
                ( msg.clone(), Style::default().fg( Color::Green ) )
            } else {
                let hint = match app.view_mode {
                    ViewMode::Library => " [/]Cmd [f]Find [Enter]Play [Space]Pause [n/p]Skip [e]Expand [?]Help [q]Quit ",
                    ViewMode::Expanded => " [Space]Pause [←→]Seek [↑↓]Vol [n/p]Skip [l]Like [e/Esc]Close ",
                    ViewMode::Help => " [j/k]Scroll [?/Esc]Close ",
                };
                ( hint.to_string(), Style::default().fg( Color::DarkGray ) )
            }
        }
    };

    let status = Paragraph::new( text ).style( style );
    frame.render_widget( status, area );

    // Show cursor in command/search mode
    if app.input_mode != InputMode::Normal {
        let prefix = if app.input_mode == InputMode::Command { 1 } else { 8 };
        let cursor_x = area.x + prefix + app.input_buffer.cursor_char_pos() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_bar_fills_proportionally() {
        assert_eq!( bar( 0.5, 4 ), "██░░" );
        assert_eq!( bar( 2.0, 3 ), "███" );
        assert_eq!( bar( 0.0, 0 ), "" );
    }


    #[test]
    fn test_vis_bars_full_and_empty() {
        let mut data = [ 0.0f32; BARS ];
        data[ 0 ] = 1.0;
        let mut lines = Vec::new();
        draw_vis_bars( &mut lines, &data, 2, BARS );

        assert_eq!( lines.len(), 2 );
        for line in &lines {
            let text: String = line.spans.iter().map( |s| s.content.as_ref() ).collect();
            assert!( text.starts_with( '█' ) );
            assert_eq!( text.chars().filter( |c| *c != ' ' ).count(), 1 );
        }
    }
}
