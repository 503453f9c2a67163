//! System media transport controls integration
//!
//! Provides the host media session for the player:
//! - Windows: System Media Transport Controls (SMTC) via souvlaki
//! - Elsewhere: no media session

use isai_core::MediaSessionHost;


#[cfg( target_os = "windows" )]
mod platform {
    use std::collections::HashMap;
    use std::ffi::c_void;
    use std::sync::{ Arc, Mutex };

    use isai_core::{ ActionHandler, MediaAction, MediaSessionHost, NowPlaying, TransportState };
    use souvlaki::{ MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, PlatformConfig };
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{ GetLastError, HWND, LPARAM, LRESULT, WPARAM };
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, RegisterClassW,
        CS_HREDRAW, CS_VREDRAW, CW_USEDEFAULT, WNDCLASSW, WS_OVERLAPPEDWINDOW,
    };

    // ERROR_CLASS_ALREADY_EXISTS = 1410
    const ERROR_CLASS_ALREADY_EXISTS: u32 = 1410;


    type Handlers = Arc<Mutex<HashMap<MediaAction, ActionHandler>>>;


    /// Window procedure for the hidden SMTC window.
    unsafe extern "system" fn wnd_proc( hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM ) -> LRESULT {
        DefWindowProcW( hwnd, msg, wparam, lparam )
    }


    /// Maps an SMTC button to the action whose handler it fires.
    fn action_for( event: &MediaControlEvent ) -> Option<MediaAction> {
        match event {
            MediaControlEvent::Play | MediaControlEvent::Toggle => Some( MediaAction::Play ),
            MediaControlEvent::Pause => Some( MediaAction::Pause ),
            MediaControlEvent::Next => Some( MediaAction::NextTrack ),
            MediaControlEvent::Previous => Some( MediaAction::PreviousTrack ),
            _ => None,
        }
    }


    /// Media session backed by the Windows SMTC.
    pub struct SystemMediaSession {
        controls: MediaControls,
        handlers: Handlers,
        #[allow( dead_code )]
        hwnd: HWND, // Keep the window alive
    }


    impl SystemMediaSession {
        /// Creates the session.
        ///
        /// Returns None if media controls are not available.
        pub fn new() -> Option<Self> {
            // Create a hidden window for SMTC (console windows don't work well)
            let hwnd = Self::create_hidden_window()?;

            let config = PlatformConfig {
                dbus_name: "isai",
                display_name: "Isai",
                hwnd: Some( hwnd.0 as *mut c_void ),
            };

            let mut controls = match MediaControls::new( config ) {
                Ok( c ) => c,
                Err( e ) => {
                    tracing::warn!( "Failed to create media controls: {:?}", e );
                    return None;
                }
            };

            // SMTC calls back on its own thread; handlers are looked up per event
            // so re-registration on track change takes effect immediately.
            let handlers: Handlers = Arc::default();
            let registered = Arc::clone( &handlers );
            if let Err( e ) = controls.attach( move |event: MediaControlEvent| {
                let Some( action ) = action_for( &event ) else {
                    return;
                };
                let handler = registered.lock().unwrap().get( &action ).cloned();
                match handler {
                    Some( handler ) => handler.invoke(),
                    None => tracing::debug!( ?action, "No handler registered for media action" ),
                }
            }) {
                tracing::warn!( "Failed to attach media control handler: {:?}", e );
                return None;
            }

            tracing::info!( "SMTC initialized with hidden window" );
            Some( Self { controls, handlers, hwnd })
        }


        /// Creates a hidden window for SMTC binding.
        fn create_hidden_window() -> Option<HWND> {
            unsafe {
                // Set AppUserModelID so Windows identifies our app correctly in SMTC
                use windows::Win32::UI::Shell::SetCurrentProcessExplicitAppUserModelID;
                use windows::core::HSTRING;

                let app_id = HSTRING::from( "Isai.Player" );
                let _ = SetCurrentProcessExplicitAppUserModelID( &app_id );

                let class_name: Vec<u16> = "IsaiSMTC\0".encode_utf16().collect();

                let wc = WNDCLASSW {
                    style: CS_HREDRAW | CS_VREDRAW,
                    lpfnWndProc: Some( wnd_proc ),
                    hInstance: windows::Win32::Foundation::HINSTANCE::default(),
                    lpszClassName: PCWSTR( class_name.as_ptr() ),
                    ..Default::default()
                };

                let atom = RegisterClassW( &wc );
                if atom == 0 {
                    let error = GetLastError();
                    if error.0 != ERROR_CLASS_ALREADY_EXISTS {
                        tracing::warn!( "Failed to register SMTC window class: {:?}", error );
                        return None;
                    }
                    tracing::debug!( "SMTC window class already registered, reusing" );
                }

                let window_name: Vec<u16> = "Isai\0".encode_utf16().collect();

                let hwnd = match CreateWindowExW(
                    windows::Win32::UI::WindowsAndMessaging::WINDOW_EX_STYLE::default(),
                    PCWSTR( class_name.as_ptr() ),
                    PCWSTR( window_name.as_ptr() ),
                    WS_OVERLAPPEDWINDOW, // Don't use WS_VISIBLE - keep it hidden
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    HWND::default(),
                    None,
                    None,
                    None,
                ) {
                    Ok( hwnd ) => hwnd,
                    Err( e ) => {
                        tracing::warn!( "Failed to create SMTC hidden window: {:?}", e );
                        return None;
                    }
                };

                if hwnd.0.is_null() {
                    tracing::warn!( "SMTC hidden window handle is null" );
                    return None;
                }

                Some( hwnd )
            }
        }
    }


    impl MediaSessionHost for SystemMediaSession {
        fn set_metadata( &mut self, now_playing: &NowPlaying ) {
            let metadata = MediaMetadata {
                title: Some( now_playing.title.as_str() ),
                artist: Some( now_playing.artist.as_str() ),
                album: Some( now_playing.album.as_str() ),
                ..Default::default()
            };
            if let Err( e ) = self.controls.set_metadata( metadata ) {
                tracing::warn!( "SMTC metadata error: {:?}", e );
            }
        }


        fn set_action_handler( &mut self, action: MediaAction, handler: ActionHandler ) {
            self.handlers.lock().unwrap().insert( action, handler );
        }


        fn set_playback_state( &mut self, state: TransportState ) {
            let playback = match state {
                TransportState::Playing => MediaPlayback::Playing { progress: None },
                TransportState::Paused | TransportState::Loading => MediaPlayback::Paused { progress: None },
                TransportState::Stopped => MediaPlayback::Stopped,
            };
            if let Err( e ) = self.controls.set_playback( playback ) {
                tracing::debug!( "Failed to set playback state: {:?}", e );
            }
        }
    }


    /// Creates the SMTC session, if the platform allows it.
    pub fn create() -> Option<Box<dyn MediaSessionHost>> {
        SystemMediaSession::new().map( |s| Box::new( s ) as Box<dyn MediaSessionHost> )
    }
}


// Stub module for non-Windows platforms
#[cfg( not( target_os = "windows" ) )]
mod platform {
    use isai_core::MediaSessionHost;


    /// No system media session on this platform.
    pub fn create() -> Option<Box<dyn MediaSessionHost>> {
        None
    }
}


/// Returns the system media session, or a no-op session when it is
/// disabled or unavailable.
pub fn media_session( enabled: bool ) -> Box<dyn MediaSessionHost> {
    if enabled {
        if let Some( session ) = platform::create() {
            return session;
        }
        tracing::info!( "System media controls unavailable" );
    }
    Box::new( isai_core::media_session::NoMediaSession )
}
