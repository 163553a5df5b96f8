use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{select, Receiver};
use meadow_hcom::{debugging, Connection, ConnectionEvent, OperationOptions, Route};
use tracing::{info, warn};

use crate::cli::{ConfigCmd, DeviceCmd, FileCmd, FlashCmd, RuntimeAction, TraceCmd};
use crate::settings::Settings;

// ============================================================================
// Config
// ============================================================================

pub fn config(cmd: ConfigCmd, settings: &mut Settings, path: &Path) -> Result<()> {
    match cmd {
        ConfigCmd::Show => {
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
        ConfigCmd::Route { route } => {
            if matches!(Route::parse(&route), Route::Local) {
                bail!("the local route is not supported by this tool");
            }
            settings.route = Some(route.clone());
            settings.save_to(path)?;
            println!("route set to {}", route);
        }
        ConfigCmd::Ports => {
            let ports = serialport::available_ports().context("listing serial ports")?;
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for port in ports {
                println!("{}", port.port_name);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Device commands
// ============================================================================

pub fn device(cmd: DeviceCmd, conn: &Connection, opts: &OperationOptions) -> Result<()> {
    match cmd {
        DeviceCmd::Info => {
            let info = conn.get_device_info(opts)?;
            println!("{}", info);
        }
        DeviceCmd::Reset => {
            conn.reset_device(opts)?;
            println!("device reset");
        }
        DeviceCmd::Dfu => {
            conn.enter_dfu_mode(opts)?;
            println!("device is entering DFU mode");
        }
    }
    Ok(())
}

pub fn file(cmd: FileCmd, conn: &Connection, opts: OperationOptions) -> Result<()> {
    match cmd {
        FileCmd::List { crc, part } => {
            let opts = opts.on_partition(part.partition);
            let files = conn.get_file_list(crc, &opts)?;
            for entry in &files {
                match (entry.crc, entry.size) {
                    (Some(crc), Some(size)) => {
                        println!("{:<40} {:#010x} {:>10}", entry.name, crc, size)
                    }
                    (Some(crc), None) => println!("{:<40} {:#010x}", entry.name, crc),
                    _ => println!("{}", entry.name),
                }
            }
            println!("{} file(s)", files.len());
        }
        FileCmd::Write { file, name, part } => {
            let opts = opts.on_partition(part.partition);
            let progress = ProgressPrinter::start(conn.subscribe());
            let result = conn.write_file(&file, name.as_deref(), &opts);
            progress.stop();
            result.with_context(|| format!("writing {}", file.display()))?;
            println!("wrote {}", file.display());
        }
        FileCmd::Read { name, output, part } => {
            let opts = opts.on_partition(part.partition);
            let output = output.unwrap_or_else(|| PathBuf::from(&name));
            let progress = ProgressPrinter::start(conn.subscribe());
            let result = conn.read_file(&name, &output, &opts);
            progress.stop();
            let bytes = result.with_context(|| format!("reading {}", name))?;
            println!("read {} ({} bytes) into {}", name, bytes, output.display());
        }
        FileCmd::Delete { name, part } => {
            let opts = opts.on_partition(part.partition);
            conn.delete_file(&name, &opts)?;
            println!("deleted {}", name);
        }
    }
    Ok(())
}

pub fn flash(cmd: FlashCmd, conn: &Connection, opts: &OperationOptions) -> Result<()> {
    match cmd {
        FlashCmd::Erase => {
            conn.erase_flash(opts)?;
            println!("flash erased");
        }
        FlashCmd::Verify => {
            conn.verify_erased_flash(opts)?;
            println!("flash is erased");
        }
    }
    Ok(())
}

pub fn runtime(action: RuntimeAction, conn: &Connection, opts: &OperationOptions) -> Result<()> {
    match action {
        RuntimeAction::Enable => {
            conn.runtime_enable(opts)?;
            println!("runtime enabled");
        }
        RuntimeAction::Disable => {
            conn.runtime_disable(opts)?;
            println!("runtime disabled");
        }
        RuntimeAction::State => {
            let enabled = conn.runtime_state(opts)?;
            println!("runtime is {}", if enabled { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}

pub fn trace(cmd: TraceCmd, conn: &Connection, opts: &OperationOptions) -> Result<()> {
    match cmd {
        TraceCmd::Level { level } => conn.set_trace_level(level, opts)?,
        TraceCmd::Host { state } => conn.trace_to_host(state.enabled(), opts)?,
        TraceCmd::Uart { state } => conn.trace_to_uart(state.enabled(), opts)?,
    }
    Ok(())
}

// ============================================================================
// Long-running commands
// ============================================================================

/// Print device output until Ctrl-C.
pub fn listen(conn: &Connection) -> Result<()> {
    let events = conn.subscribe();
    let interrupted = interrupt_channel()?;
    info!(device = conn.name(), "listening, press Ctrl-C to stop");

    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => print_event(&event),
                Err(_) => break,
            },
            recv(interrupted) -> _ => break,
        }
    }
    Ok(())
}

/// Start a debugging session and proxy the debugger port until Ctrl-C.
pub fn debug(conn: Arc<Connection>, port: u16, opts: OperationOptions) -> Result<()> {
    let interrupted = interrupt_channel()?;
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;

    runtime.block_on(async move {
        let server = debugging::start_session(conn.clone(), port, opts)
            .await
            .context("starting debugging session")?;
        println!("debugger proxy listening on {}", server.local_addr());

        let events = conn.subscribe();
        tokio::task::spawn_blocking(move || loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => print_event(&event),
                    Err(_) => break,
                },
                recv(interrupted) -> _ => break,
            }
        })
        .await
        .context("event loop")?;

        server.stop();
        Ok::<(), anyhow::Error>(())
    })
}

fn interrupt_channel() -> Result<Receiver<()>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;
    Ok(rx)
}

fn print_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::DeviceMessage { message, source } => {
            println!("[{}] {}", source, message.trim_end())
        }
        ConnectionEvent::ConnectionError(message) => warn!("{}", message),
        ConnectionEvent::StateChanged(state) => info!(?state, "connection state changed"),
        _ => {}
    }
}

/// Prints transfer progress on stderr from a background thread.
struct ProgressPrinter {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl ProgressPrinter {
    fn start(events: Receiver<ConnectionEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                let Ok(event) = events.recv_timeout(Duration::from_millis(100)) else {
                    continue;
                };
                match event {
                    ConnectionEvent::FileWriteProgress {
                        file_name,
                        completed,
                        total,
                    } => eprint!("\r{} {}/{} bytes", file_name, completed, total),
                    ConnectionEvent::FileReadProgress {
                        file_name,
                        received,
                    } => eprint!("\r{} {} bytes", file_name, received),
                    ConnectionEvent::DeviceMessage { message, source } => {
                        eprintln!("\r[{}] {}", source, message.trim_end())
                    }
                    _ => {}
                }
            }
        });
        Self { stop, handle }
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.handle.join();
        eprintln!();
    }
}
