use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result as AnyResult;
use corevpn_core::{Error, Inventory, Result};
use corevpn_types::netbox::*;
use corevpn_types::{Address, DeviceRecord, Interface, Prefix};
use ipnet::IpNet;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::NetboxSection;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PAGE_LIMIT: &str = "250";

pub fn normalize_url(url: &str) -> AnyResult<String> {
    let normalized = url.trim().trim_end_matches('/').to_string();
    if normalized.is_empty() {
        anyhow::bail!("NetBox URL cannot be empty");
    }
    let rest = normalized
        .strip_prefix("http://")
        .or_else(|| normalized.strip_prefix("https://"))
        .ok_or_else(|| anyhow::anyhow!("NetBox URL must start with http:// or https:// (got '{normalized}')"))?;
    if rest.is_empty() || rest.starts_with('/') {
        anyhow::bail!("NetBox URL must include host");
    }
    Ok(normalized)
}

/// NetBox REST client backing the [`Inventory`] trait.
pub struct NetboxClient {
    base_url: String,
    auth_header: String,
    agent: ureq::Agent,
    site_asns: Mutex<HashMap<u64, Option<u32>>>,
}

impl NetboxClient {
    pub fn new(netbox: &NetboxSection, token: &str) -> AnyResult<Self> {
        let base_url = normalize_url(&netbox.url)?;
        let agent = ureq::AgentBuilder::new()
            .user_agent(&format!("corevpn-link/{}", env!("CARGO_PKG_VERSION")))
            .timeout_connect(HTTP_CONNECT_TIMEOUT)
            .timeout_read(Duration::from_secs(netbox.timeout_secs))
            .build();
        Ok(Self {
            base_url,
            auth_header: format!("Token {}", token.trim()),
            agent,
            site_asns: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn fetch<T: DeserializeOwned>(&self, request: ureq::Request) -> Result<T> {
        let resp = request
            .set("Authorization", &self.auth_header)
            .set("Accept", "application/json")
            .call()
            .map_err(handle_error)?;
        decode(resp)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(self.agent.get(&self.url(path)))
    }

    /// GET every page of a list endpoint.
    fn list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let mut request = self.agent.get(&self.url(path)).query("limit", PAGE_LIMIT);
        for (key, value) in query {
            request = request.query(key, value);
        }
        let first: Page<T> = self.fetch(request)?;
        collect_pages(first, |next| self.fetch(self.agent.get(next)))
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &impl serde::Serialize) -> Result<T> {
        let resp = self
            .agent
            .post(&self.url(path))
            .set("Authorization", &self.auth_header)
            .set("Accept", "application/json")
            .send_json(body)
            .map_err(handle_error)?;
        decode(resp)
    }

    fn site_asn(&self, site_id: u64) -> Result<Option<u32>> {
        let mut cache = self.site_asns.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(asn) = cache.get(&site_id) {
            return Ok(*asn);
        }
        let site: Site = self.get(&format!("/api/dcim/sites/{site_id}/"))?;
        let asn = site.asn();
        cache.insert(site_id, asn);
        Ok(asn)
    }
}

/// Follow `next` links until the last page. `count` is whatever the server
/// claims and is not used for sizing.
fn collect_pages<T>(first: Page<T>, mut fetch_next: impl FnMut(&str) -> Result<Page<T>>) -> Result<Vec<T>> {
    let mut page = first;
    let mut items = Vec::new();
    loop {
        items.extend(page.results);
        match page.next {
            Some(next) => {
                debug!(%next, "following page");
                page = fetch_next(&next)?;
            }
            None => break,
        }
    }
    Ok(items)
}

fn decode<T: DeserializeOwned>(resp: ureq::Response) -> Result<T> {
    let url = resp.get_url().to_string();
    resp.into_json()
        .map_err(|e| Error::InventoryUnavailable(format!("failed to decode response from {url}: {e}")))
}

fn handle_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(status, resp) => {
            let url = resp.get_url().to_string();
            let body = resp.into_string().unwrap_or_default();
            Error::InventoryUnavailable(status_message(status, &url, &body))
        }
        ureq::Error::Transport(t) => Error::InventoryUnavailable(format!("connection error: {t}")),
    }
}

fn status_message(status: u16, url: &str, body: &str) -> String {
    match serde_json::from_str::<ErrorDetail>(body) {
        Ok(err) => format!("NetBox error ({status}) for {url}: {}", err.detail),
        Err(_) => format!("NetBox error ({status}) for {url}: {}", body.trim()),
    }
}

impl Inventory for NetboxClient {
    fn list_devices(&self, tag: &str) -> Result<Vec<DeviceRecord>> {
        let vms: Vec<VirtualMachine> = self.list("/api/virtualization/virtual-machines/", &[])?;
        let mut devices = Vec::new();
        for vm in vms.into_iter().filter(|vm| vm.has_tag(tag)) {
            let asn = match &vm.site {
                Some(site) => self.site_asn(site.id)?,
                None => None,
            };
            devices.push(DeviceRecord {
                id: vm.id,
                public_key: vm.public_key(),
                name: vm.name,
                asn,
            });
        }
        Ok(devices)
    }

    fn list_interfaces(&self, device: &str) -> Result<Vec<Interface>> {
        let records: Vec<VmInterface> = self.list(
            "/api/virtualization/interfaces/",
            &[("virtual_machine", device)],
        )?;
        Ok(records.into_iter().map(Interface::from).collect())
    }

    fn get_address(&self, interface_id: u64) -> Result<Option<Address>> {
        let id = interface_id.to_string();
        let records: Vec<IpAddressRecord> =
            self.list("/api/ipam/ip-addresses/", &[("vminterface_id", id.as_str())])?;
        Ok(records.into_iter().next().map(Address::from))
    }

    fn create_interface(&self, device: &str, name: &str, description: &str) -> Result<Interface> {
        let req = CreateInterfaceRequest {
            name: name.to_string(),
            virtual_machine: VmSelector {
                name: device.to_string(),
            },
            description: description.to_string(),
        };
        let record: VmInterface = self.post("/api/virtualization/interfaces/", &req)?;
        Ok(record.into())
    }

    fn get_pool_prefix(&self, tag: &str) -> Result<Prefix> {
        let records: Vec<PrefixRecord> = self.list("/api/ipam/prefixes/", &[("tag", tag)])?;
        let mut records = records.into_iter();
        match (records.next(), records.next()) {
            (Some(pool), None) => Ok(pool.into()),
            _ => Err(Error::MissingPool(tag.to_string())),
        }
    }

    fn list_prefixes_within(&self, parent: &IpNet) -> Result<Vec<Prefix>> {
        let parent = parent.to_string();
        let records: Vec<PrefixRecord> =
            self.list("/api/ipam/prefixes/", &[("within", parent.as_str())])?;
        Ok(records.into_iter().map(Prefix::from).collect())
    }

    fn create_sub_prefix(&self, parent: &Prefix, length: u8, description: &str) -> Result<Prefix> {
        let req = CreatePrefixRequest {
            prefix_length: length,
            description: description.to_string(),
        };
        let record: PrefixRecord = self.post(
            &format!("/api/ipam/prefixes/{}/available-prefixes/", parent.id),
            &req,
        )?;
        Ok(record.into())
    }

    fn list_addresses_within(&self, prefix: &IpNet) -> Result<Vec<Address>> {
        let parent = prefix.to_string();
        let records: Vec<IpAddressRecord> =
            self.list("/api/ipam/ip-addresses/", &[("parent", parent.as_str())])?;
        Ok(records.into_iter().map(Address::from).collect())
    }

    fn create_address(&self, prefix: &Prefix, description: &str) -> Result<Address> {
        let req = CreateAddressRequest {
            description: description.to_string(),
        };
        let record: IpAddressRecord = self.post(
            &format!("/api/ipam/prefixes/{}/available-ips/", prefix.id),
            &req,
        )?;
        Ok(record.into())
    }
}
