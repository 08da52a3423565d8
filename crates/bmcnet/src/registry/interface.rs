//! Per-interface managed object: runtime properties, owned addresses and
//! static neighbors, and persisted configuration emission.

use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use tracing::debug;

use crate::config::{ConfigWriter, NetworkConfig, intf_conf_path, intf_dev_path};
use crate::netlink::types::link::{arphrd, iff};

use super::info::{AddrPrefix, AddressInfo, AllIntfInfo, InterfaceInfo, NeighborInfo, format_mac};
use super::{Error, Result};

/// Scope value for globally routable addresses (RT_SCOPE_UNIVERSE).
const SCOPE_GLOBAL: u8 = 0;

/// A managed Ethernet interface.
///
/// Owned exclusively by the registry; holds the runtime view of one link
/// plus the pieces of persisted configuration the daemon reads back
/// (DHCP mode, DNS/NTP servers, LLDP emission).
#[derive(Debug)]
pub struct EthernetInterface {
    name: String,
    ifidx: u32,
    mac: Option<[u8; 6]>,
    mtu: Option<u32>,
    link_up: bool,
    nic_enabled: bool,
    /// VLAN properties when this is a stacked vlan device.
    vlan: Option<VlanProps>,
    /// Names of vlan children stacked on this interface.
    vlans: BTreeSet<String>,
    addrs: HashMap<AddrPrefix, AddressInfo>,
    static_neighbors: HashMap<IpAddr, NeighborInfo>,
    default_gateway: Option<Ipv4Addr>,
    default_gateway6: Option<Ipv6Addr>,
    dns_servers: Vec<String>,
    ntp_servers: Vec<String>,
    dhcp4: bool,
    dhcp6: bool,
    emit_lldp: bool,
    object_path: String,
}

/// VLAN facts for stacked devices.
#[derive(Debug, Clone)]
struct VlanProps {
    parent: String,
    id: u16,
}

impl EthernetInterface {
    /// Create the managed object for a link.
    pub fn new(info: &AllIntfInfo, config: &NetworkConfig, managed: bool, obj_root: &str) -> Self {
        let name = info
            .intf
            .name
            .clone()
            .expect("interface objects are only created for named links");
        let (dhcp4, dhcp6) = config.dhcp_enabled();

        let vlan = match (&info.intf.kind, info.intf.vlan_id) {
            (Some(kind), Some(id)) if kind == "vlan" => name
                .rsplit_once('.')
                .map(|(parent, _)| VlanProps {
                    parent: parent.to_string(),
                    id,
                }),
            _ => None,
        };

        let object_path = object_path_for(obj_root, &name);

        Self {
            ifidx: info.intf.idx,
            mac: info.intf.mac,
            mtu: info.intf.mtu,
            link_up: info.intf.flags & iff::RUNNING != 0,
            nic_enabled: managed,
            vlan,
            vlans: BTreeSet::new(),
            addrs: info.addrs.clone(),
            static_neighbors: info.static_neighs.clone(),
            default_gateway: info.defgw4,
            default_gateway6: info.defgw6,
            dns_servers: Vec::new(),
            ntp_servers: Vec::new(),
            dhcp4,
            dhcp6,
            emit_lldp: config.emit_lldp(),
            object_path,
            name,
        }
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kernel link index.
    pub fn ifindex(&self) -> u32 {
        self.ifidx
    }

    /// Whether the supervisor manages this link.
    pub fn nic_enabled(&self) -> bool {
        self.nic_enabled
    }

    /// Whether the lower layer is up.
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Hardware address in canonical form.
    pub fn mac_address(&self) -> Option<String> {
        self.mac.as_ref().map(format_mac)
    }

    /// MTU.
    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    /// Whether this interface emits LLDP.
    pub fn emit_lldp(&self) -> bool {
        self.emit_lldp
    }

    /// The object identifier exported for this interface.
    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// VLAN ID when this is a stacked vlan device.
    pub fn vlan_id(&self) -> Option<u16> {
        self.vlan.as_ref().map(|v| v.id)
    }

    /// Parent interface name when this is a stacked vlan device.
    pub fn parent_interface(&self) -> Option<&str> {
        self.vlan.as_ref().map(|v| v.parent.as_str())
    }

    /// IPv4 default gateway.
    pub fn default_gateway(&self) -> Option<Ipv4Addr> {
        self.default_gateway
    }

    /// Set or clear the IPv4 default gateway.
    pub fn set_default_gateway(&mut self, gw: Option<Ipv4Addr>) {
        self.default_gateway = gw;
    }

    /// IPv6 default gateway.
    pub fn default_gateway6(&self) -> Option<Ipv6Addr> {
        self.default_gateway6
    }

    /// Set or clear the IPv6 default gateway.
    pub fn set_default_gateway6(&mut self, gw: Option<Ipv6Addr>) {
        self.default_gateway6 = gw;
    }

    /// Configured DNS servers.
    pub fn dns_servers(&self) -> &[String] {
        &self.dns_servers
    }

    /// Configured NTP servers.
    pub fn ntp_servers(&self) -> &[String] {
        &self.ntp_servers
    }

    /// Refresh runtime properties from a new kernel report.
    ///
    /// Replaying an identical report leaves the object unchanged.
    pub fn update_info(&mut self, info: &InterfaceInfo) {
        self.ifidx = info.idx;
        self.link_up = info.flags & iff::RUNNING != 0;
        if info.mac.is_some() {
            self.mac = info.mac;
        }
        if info.mtu.is_some() {
            self.mtu = info.mtu;
        }
    }

    /// Record an address reported by the kernel.
    pub fn add_addr(&mut self, info: AddressInfo) {
        self.addrs.insert(info.addr, info);
    }

    /// Drop an address the kernel removed.
    pub fn remove_addr(&mut self, key: &AddrPrefix) {
        self.addrs.remove(key);
    }

    /// Addresses currently held by this interface.
    pub fn addrs(&self) -> &HashMap<AddrPrefix, AddressInfo> {
        &self.addrs
    }

    /// Record a static neighbor reported by the kernel.
    pub fn add_static_neigh(&mut self, info: NeighborInfo) {
        if let Some(addr) = info.addr {
            self.static_neighbors.insert(addr, info);
        }
    }

    /// Drop a static neighbor the kernel removed.
    pub fn remove_static_neigh(&mut self, addr: &IpAddr) {
        self.static_neighbors.remove(addr);
    }

    /// Static neighbors currently held by this interface.
    pub fn static_neighbors(&self) -> &HashMap<IpAddr, NeighborInfo> {
        &self.static_neighbors
    }

    /// Load static DNS servers from persisted configuration.
    pub fn load_name_servers(&mut self, config: &NetworkConfig) {
        self.dns_servers = config.dns_servers();
    }

    /// Load static NTP servers from persisted configuration.
    pub fn load_ntp_servers(&mut self, config: &NetworkConfig) {
        self.ntp_servers = config.ntp_servers();
    }

    /// DHCP= value for emission.
    fn dhcp_value(&self) -> &'static str {
        match (self.dhcp4, self.dhcp6) {
            (true, true) => "true",
            (true, false) => "ipv4",
            (false, true) => "ipv6",
            (false, false) => "false",
        }
    }

    /// Emit this interface's `.network` file.
    ///
    /// Idempotent: emission depends only on the object's current state.
    pub fn write_configuration_file(&self, conf_dir: &Path) -> Result<()> {
        let mut writer = ConfigWriter::new();

        writer.section("Match").entry("Name", &self.name);

        writer.section("Link").entry(
            "ActivationPolicy",
            if self.nic_enabled { "up" } else { "down" },
        );
        if let Some(mac) = self.mac_address() {
            writer.entry("MACAddress", mac);
        }

        writer
            .section("Network")
            .entry("DHCP", self.dhcp_value())
            .entry("LinkLocalAddressing", "yes");
        for dns in &self.dns_servers {
            writer.entry("DNS", dns);
        }
        for ntp in &self.ntp_servers {
            writer.entry("NTP", ntp);
        }
        if self.emit_lldp {
            writer.entry("EmitLLDP", "true");
        }
        for vlan in &self.vlans {
            writer.entry("VLAN", vlan);
        }

        let mut static_addrs: Vec<_> = self
            .addrs
            .values()
            .filter(|a| a.scope == SCOPE_GLOBAL && !self.dhcp_for(a.addr.addr))
            .collect();
        static_addrs.sort_by_key(|a| a.addr.to_string());
        for addr in static_addrs {
            writer.section("Address").entry("Address", addr.addr.to_string());
        }

        let mut neighbors: Vec<_> = self.static_neighbors.values().collect();
        neighbors.sort_by_key(|n| n.addr.map(|a| a.to_string()));
        for neigh in neighbors {
            let (Some(addr), Some(lladdr)) = (neigh.addr, neigh.lladdr.as_ref()) else {
                continue;
            };
            writer
                .section("Neighbor")
                .entry("Address", addr.to_string())
                .entry("LinkLayerAddress", format_mac(lladdr));
        }

        if let Some(gw) = self.default_gateway
            && !self.dhcp4
        {
            writer.section("Route").entry("Gateway", gw.to_string());
        }
        if let Some(gw) = self.default_gateway6
            && !self.dhcp6
        {
            writer.section("Route").entry("Gateway", gw.to_string());
        }

        let path = intf_conf_path(conf_dir, &self.name);
        std::fs::write(&path, writer.finish())?;
        debug!(intf = %self.name, path = %path.display(), "wrote interface configuration");
        Ok(())
    }

    /// Whether addresses of this family are DHCP-assigned rather than static.
    fn dhcp_for(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(_) => self.dhcp4,
            IpAddr::V6(_) => self.dhcp6,
        }
    }

    /// Create a VLAN child on this interface.
    ///
    /// Writes the child's `.netdev` declaration, records the child in this
    /// interface's VLAN list and returns the child object. The kernel link
    /// for the child appears only after the supervisor reload; its NEWLINK
    /// then refreshes the object through the normal path.
    pub fn create_vlan(&mut self, id: u16, conf_dir: &Path, obj_root: &str) -> Result<EthernetInterface> {
        let child_name = format!("{}.{}", self.name, id);
        if self.vlans.contains(&child_name) {
            return Err(Error::InvalidArgument {
                name: "VLANId",
                value: format!("{id} already exists on {}", self.name),
            });
        }

        let mut writer = ConfigWriter::new();
        writer
            .section("NetDev")
            .entry("Name", &child_name)
            .entry("Kind", "vlan");
        writer.section("VLAN").entry("Id", id.to_string());
        std::fs::write(intf_dev_path(conf_dir, &child_name), writer.finish())?;

        let info = AllIntfInfo::new(InterfaceInfo {
            idx: 0,
            name: Some(child_name.clone()),
            hw_type: arphrd::ETHER,
            mtu: self.mtu,
            kind: Some("vlan".to_string()),
            parent_idx: Some(self.ifidx),
            vlan_id: Some(id),
            ..Default::default()
        });
        let child = EthernetInterface::new(
            &info,
            &NetworkConfig::load(conf_dir, &child_name),
            self.nic_enabled,
            obj_root,
        );

        self.vlans.insert(child_name);
        self.write_configuration_file(conf_dir)?;
        child.write_configuration_file(conf_dir)?;

        Ok(child)
    }
}

/// Object identifier for an interface name under the export root.
fn object_path_for(obj_root: &str, name: &str) -> String {
    format!("{}/{}", obj_root, name.replace('.', "_"))
}
