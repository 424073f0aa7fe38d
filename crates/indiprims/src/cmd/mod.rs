use clap::{ArgGroup, Args, Subcommand};
use indiprims_transport::ServerAddress;
use indiprims_wire::BlobMode;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod devices;
pub mod get;
pub mod session;
pub mod set;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream client events until interrupted.
    Watch(WatchArgs),
    /// List the devices announced by the server.
    Devices(DevicesArgs),
    /// Print the property vectors of one device.
    Get(GetArgs),
    /// Send new values for one property vector.
    Set(SetArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, server: &ServerArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Watch(args) => watch::run(args, server, format),
        Command::Devices(args) => devices::run(args, server, format),
        Command::Get(args) => get::run(args, server, format),
        Command::Set(args) => set::run(args, server, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// INDI server as host[:port].
    #[arg(
        long,
        short = 's',
        env = "INDI_SERVER",
        default_value = "localhost:7624",
        global = true
    )]
    pub server: ServerAddress,
    /// Connect timeout (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s", global = true)]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Only show events for this device.
    #[arg(long, short = 'd')]
    pub device: Option<String>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// BLOB policy to request for the watched device (Never, Also, Only).
    #[arg(long, value_name = "MODE", requires = "device")]
    pub blobs: Option<BlobMode>,
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    /// Only devices with this driver interface (name such as `ccd`, `all`,
    /// or a numeric mask).
    #[arg(long, short = 'i', value_name = "MASK")]
    pub interface: Option<String>,
    /// How long to collect definitions before printing.
    #[arg(long, default_value = "2s")]
    pub settle: String,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Device name.
    pub device: String,
    /// Only this property vector.
    #[arg(long, short = 'p')]
    pub property: Option<String>,
    /// How long to collect definitions before printing.
    #[arg(long, default_value = "2s")]
    pub settle: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("kind").args(["switch", "number", "text"])))]
pub struct SetArgs {
    /// Device name.
    pub device: String,
    /// Property vector name.
    pub property: String,
    /// Element values.
    #[arg(required = true, value_name = "NAME=VALUE")]
    pub elements: Vec<String>,
    /// Send a switch vector.
    #[arg(long)]
    pub switch: bool,
    /// Send a number vector.
    #[arg(long)]
    pub number: bool,
    /// Send a text vector.
    #[arg(long)]
    pub text: bool,
    /// How long to wait for the property to be announced, then for the
    /// driver's answer.
    #[arg(long, default_value = "2s")]
    pub settle: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
