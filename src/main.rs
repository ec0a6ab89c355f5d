mod cli;
mod config;
mod netbox;
mod secret;

use anyhow::{Context, Result};
use clap::Parser;
use corevpn_core::render::render_pair;
use corevpn_core::{build_pair, Error, Inventory, Resolver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::ClientConfig;
use netbox::NetboxClient;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(&cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let pair = match (&cli.device_a, &cli.device_b) {
        (Some(a), Some(b)) => {
            anyhow::ensure!(a != b, "cannot link '{a}' to itself");
            Some((a.as_str(), b.as_str()))
        }
        _ => None,
    };

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    config.apply_env();
    let token = match &config.netbox.token {
        Some(token) => token.clone(),
        None => secret::lookup_token()?,
    };
    let client = NetboxClient::new(&config.netbox, &token)?;
    info!(url = %config.netbox.url, "using NetBox");
    let mut resolver = Resolver::new(&client, config.tags.resolve());

    if cli.list_devices {
        return cmd_list_devices(&mut resolver);
    }
    let (a, b) = pair.context("two device names are required")?;
    print!("{}", cmd_link(&mut resolver, a, b)?);
    Ok(())
}

/// Resolve both ends of the link between `a` and `b` and render their configuration.
/// Nothing is returned unless both sides resolved.
fn cmd_link<I: Inventory + ?Sized>(resolver: &mut Resolver<'_, I>, a: &str, b: &str) -> Result<String> {
    let a = resolver.device(a)?;
    let b = resolver.device(b)?;
    let (a_side, b_side) = build_pair(resolver, &a, &b)?;
    Ok(render_pair(&a_side, &b_side))
}

#[derive(tabled::Tabled)]
struct DeviceRow {
    name: String,
    asn: u32,
    #[tabled(rename = "public address")]
    public_ip: String,
    tunnels: String,
}

fn device_rows<I: Inventory + ?Sized>(resolver: &mut Resolver<'_, I>) -> Result<Vec<DeviceRow>> {
    let names: Vec<String> = resolver
        .device_records()?
        .iter()
        .map(|d| d.name.clone())
        .collect();
    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let device = match resolver.device(&name) {
            Ok(device) => device,
            Err(Error::MissingAsn(_)) => {
                warn!(device = %name, "not listed: its site has no ASN");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let tunnels: Vec<String> = device
            .interfaces
            .iter()
            .filter(|i| i.tunnel_index().is_some())
            .map(|i| format!("{} → {}", i.name, i.description))
            .collect();
        rows.push(DeviceRow {
            name: device.name,
            asn: device.asn,
            public_ip: device
                .public_ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "-".into()),
            tunnels: if tunnels.is_empty() {
                "-".into()
            } else {
                tunnels.join(", ")
            },
        });
    }
    Ok(rows)
}

fn cmd_list_devices<I: Inventory + ?Sized>(resolver: &mut Resolver<'_, I>) -> Result<()> {
    let rows = device_rows(resolver)?;
    if rows.is_empty() {
        println!("No devices tagged '{}'.", resolver.tags().device);
        return Ok(());
    }
    println!("{}", tabled::Table::new(rows));
    Ok(())
}
