//! `meadow`: command-line access to Meadow boards.

mod cli;
mod commands;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use meadow_hcom::{Connection, ConnectionManager, OperationOptions, Route};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Cmd};
use settings::Settings;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings_path = Settings::default_path()?;
    let mut settings = Settings::load_from(&settings_path)?;

    let cmd = match cli.cmd {
        Cmd::Config(cmd) => return commands::config(cmd, &mut settings, &settings_path),
        cmd => cmd,
    };

    let route = resolve_route(cli.route.as_deref(), &settings)?;
    let manager = ConnectionManager::new(settings.connection.clone());
    let conn = manager
        .connect(&route)
        .with_context(|| format!("connecting to {}", route))?;
    let opts = OperationOptions::with_timeout(Duration::from_secs(cli.timeout));
    conn.attach(&opts)
        .with_context(|| format!("waiting for a Meadow on {}", route))?;

    let result = run(cmd, conn, opts);
    manager.disconnect();
    result
}

fn run(cmd: Cmd, conn: Arc<Connection>, opts: OperationOptions) -> Result<()> {
    match cmd {
        Cmd::Config(_) => unreachable!("config runs without a device"),
        Cmd::Device(cmd) => commands::device(cmd, &conn, &opts),
        Cmd::File(cmd) => commands::file(cmd, &conn, opts),
        Cmd::Flash(cmd) => commands::flash(cmd, &conn, &opts),
        Cmd::Runtime { action } => commands::runtime(action, &conn, &opts),
        Cmd::Trace(cmd) => commands::trace(cmd, &conn, &opts),
        Cmd::Developer { parameter, value } => {
            conn.set_developer_parameter(parameter, value, &opts)?;
            Ok(())
        }
        Cmd::Listen => commands::listen(&conn),
        Cmd::Debug { port } => commands::debug(conn, port, opts),
    }
}

fn resolve_route(flag: Option<&str>, settings: &Settings) -> Result<Route> {
    flag.or(settings.route.as_deref())
        .map(Route::parse)
        .ok_or_else(|| anyhow!("no route configured; pass --route or run `meadow config route <ROUTE>`"))
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides_saved_route() {
        let settings = Settings {
            route: Some("/dev/ttyACM0".to_string()),
            ..Settings::default()
        };
        let route = resolve_route(Some("192.168.1.20"), &settings).unwrap();
        assert!(matches!(route, Route::Tcp { .. }));
    }

    #[test]
    fn test_saved_route_used() {
        let settings = Settings {
            route: Some("/dev/ttyACM0".to_string()),
            ..Settings::default()
        };
        let route = resolve_route(None, &settings).unwrap();
        assert_eq!(route, Route::Serial("/dev/ttyACM0".to_string()));
    }

    #[test]
    fn test_missing_route_is_an_error() {
        assert!(resolve_route(None, &Settings::default()).is_err());
    }
}
