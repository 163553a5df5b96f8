use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "meadow", version, about = "Talk to Meadow boards over HCOM")]
pub struct Cli {
    /// Route to the device: serial port, host:port or IP address.
    /// Overrides the configured route.
    #[arg(long, short, global = true)]
    pub route: Option<String>,

    /// Seconds to wait for the device
    #[arg(long, global = true, default_value_t = 10)]
    pub timeout: u64,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Show or change saved settings
    #[command(subcommand)]
    Config(ConfigCmd),
    /// Device information and control
    #[command(subcommand)]
    Device(DeviceCmd),
    /// Files on the device
    #[command(subcommand)]
    File(FileCmd),
    /// External flash
    #[command(subcommand)]
    Flash(FlashCmd),
    /// Managed runtime
    Runtime {
        #[arg(value_enum)]
        action: RuntimeAction,
    },
    /// OS tracing
    #[command(subcommand)]
    Trace(TraceCmd),
    /// Set a developer parameter
    Developer {
        /// Parameter id
        parameter: u16,
        /// Parameter value
        value: u32,
    },
    /// Print device output until interrupted
    Listen,
    /// Start a debugging session and proxy a local debugger port
    Debug {
        /// Local TCP port for the debugger
        #[arg(long, default_value_t = 4024)]
        port: u16,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCmd {
    /// Print the settings file
    Show,
    /// Save the default route
    Route {
        /// Serial port, host:port or IP address
        route: String,
    },
    /// List serial ports on this machine
    Ports,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DeviceCmd {
    /// Print device information
    Info,
    /// Restart the device
    Reset,
    /// Reboot into the DFU bootloader
    Dfu,
}

#[derive(Args, Debug, Clone)]
pub struct PartitionOpts {
    /// Partition to use
    #[arg(long, default_value_t = 0)]
    pub partition: u16,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FileCmd {
    /// List files
    List {
        /// Include CRCs and sizes
        #[arg(long, default_value_t = false)]
        crc: bool,
        #[command(flatten)]
        part: PartitionOpts,
    },
    /// Copy a local file to the device
    Write {
        /// Local file
        file: PathBuf,
        /// Name on the device (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        part: PartitionOpts,
    },
    /// Copy a device file to this machine
    Read {
        /// Name on the device
        name: String,
        /// Local destination (defaults to the device file name)
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        part: PartitionOpts,
    },
    /// Delete a file on the device
    Delete {
        /// Name on the device
        name: String,
        #[command(flatten)]
        part: PartitionOpts,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum FlashCmd {
    /// Erase the whole external flash
    Erase,
    /// Verify the flash is erased
    Verify,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeAction {
    Enable,
    Disable,
    State,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        self == Switch::On
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum TraceCmd {
    /// Set the OS trace level
    Level { level: u32 },
    /// Forward trace output to the host
    Host {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Mirror trace output to the debug UART
    Uart {
        #[arg(value_enum)]
        state: Switch,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_file_write() {
        let cli = Cli::parse_from([
            "meadow", "--route", "COM3", "file", "write", "App.dll", "--partition", "1",
        ]);
        assert_eq!(cli.route.as_deref(), Some("COM3"));
        match cli.cmd {
            Cmd::File(FileCmd::Write { file, name, part }) => {
                assert_eq!(file, PathBuf::from("App.dll"));
                assert_eq!(name, None);
                assert_eq!(part.partition, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verbose_counts() {
        let cli = Cli::parse_from(["meadow", "-vv", "listen"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.cmd, Cmd::Listen));
    }

    #[test]
    fn test_trace_switch() {
        let cli = Cli::parse_from(["meadow", "trace", "host", "off"]);
        match cli.cmd {
            Cmd::Trace(TraceCmd::Host { state }) => assert!(!state.enabled()),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
