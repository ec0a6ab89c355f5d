use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "corevpn-link",
    about = "corevpn-link: provision WireGuard + BGP links between Core VPN devices in NetBox",
    version
)]
pub struct Cli {
    /// First device name
    #[arg(required_unless_present = "list_devices")]
    pub device_a: Option<String>,
    /// Second device name
    #[arg(required_unless_present = "list_devices")]
    pub device_b: Option<String>,
    /// List Core VPN devices and exit (no changes are made)
    #[arg(long, conflicts_with_all = ["device_a", "device_b"])]
    pub list_devices: bool,
    /// Config file (default: ~/.corevpn/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
