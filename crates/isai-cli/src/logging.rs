//! File-based logging
//!
//! The terminal belongs to the UI, so tracing output goes to a daily-rotated
//! file instead. `RUST_LOG` overrides the default filter.

use std::path::{ Path, PathBuf };

use anyhow::{ Context, Result };
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{ RollingFileAppender, Rotation };
use tracing_subscriber::{ fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter };


const LOG_FILE_PREFIX: &str = "isai";
const DEFAULT_FILTER: &str = "isai=debug,isai_core=debug,isai_cli=debug,warn";


/// Default log directory: `<data dir>/isai/logs`, or `./.logs` when the
/// platform has no data directory.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map( |p| p.join( "isai" ).join( "logs" ) )
        .unwrap_or_else( || PathBuf::from( ".logs" ) )
}


/// Installs the global subscriber writing to `dir`.
///
/// The returned guard flushes buffered lines when dropped and must live
/// until the app exits.
pub fn init( dir: &Path ) -> Result<WorkerGuard> {
    std::fs::create_dir_all( dir )
        .with_context( || format!( "Failed to create log directory {}", dir.display() ) )?;

    let appender = RollingFileAppender::new( Rotation::DAILY, dir, LOG_FILE_PREFIX );
    let ( writer, guard ) = tracing_appender::non_blocking( appender );

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else( |_| EnvFilter::new( DEFAULT_FILTER ) );

    let layer = fmt::layer()
        .with_writer( writer )
        .with_ansi( false )
        .with_target( true );

    tracing_subscriber::registry()
        .with( filter )
        .with( layer )
        .try_init()
        .context( "Failed to install tracing subscriber" )?;

    tracing::info!( "Logging to {}", dir.display() );
    Ok( guard )
}
