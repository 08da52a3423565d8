//! The interface registry: authoritative maps, mutation rules, and the
//! dispatch point for kernel and supervisor events.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::config::NetworkConfig;
use crate::netlink::RtnlEvent;
use crate::netlink::types::link::arphrd;
use crate::reload::ReloadCoordinator;
use crate::supervisor::LinkSupervisor;

use super::info::{
    AddressInfo, AllIntfInfo, DefaultGateway, InterfaceInfo, NeighborInfo,
};
use super::interface::EthernetInterface;
use super::{Error, Result};

/// Default object root under which interface identifiers are formed.
pub const DEFAULT_OBJECT_ROOT: &str = "/xyz/openbmc_project/network";

/// The interface registry.
///
/// Owns every managed interface object. Kernel events, supervisor state
/// updates and timer firings all reach it as plain method calls; the
/// daemon loop guarantees the calls never interleave.
pub struct Manager {
    conf_dir: PathBuf,
    obj_root: String,
    /// Every observed non-ignored link, keyed by kernel index.
    intf_info: HashMap<u32, AllIntfInfo>,
    /// Managed objects, keyed by interface name. The sole owner.
    interfaces: HashMap<String, EthernetInterface>,
    /// Index into `interfaces`: link index to owning name key.
    interfaces_by_idx: HashMap<u32, String>,
    /// Links the registry permanently refuses to manage.
    ignored_intf: HashSet<u32>,
    /// Static interface name ignore list, queried once at startup.
    ignored_names: HashSet<String>,
    /// Ignored names already logged, so each is reported once.
    warned_ignored: HashSet<String>,
    /// Supervisor opinion per link: true = managed, false = unmanaged,
    /// absent = not yet known.
    supervisor_state: HashMap<u32, bool>,
    /// Whether a configuration write is already queued for the next firing.
    config_write_pending: bool,
    /// Debounced reload trigger.
    pub reload: ReloadCoordinator,
}

impl Manager {
    /// Create a registry writing configuration under `conf_dir`.
    pub fn new(conf_dir: impl Into<PathBuf>, ignored_names: HashSet<String>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            obj_root: DEFAULT_OBJECT_ROOT.to_string(),
            intf_info: HashMap::new(),
            interfaces: HashMap::new(),
            interfaces_by_idx: HashMap::new(),
            ignored_intf: HashSet::new(),
            ignored_names,
            warned_ignored: HashSet::new(),
            supervisor_state: HashMap::new(),
            config_write_pending: false,
            reload: ReloadCoordinator::default(),
        }
    }

    /// Persist the registry's state and ask the supervisor to pick it up.
    ///
    /// Every mutation that affects persisted configuration ends here: the
    /// emission runs as a pre-hook of the next firing, registered once per
    /// quiet period, so a burst of kernel events produces a single write
    /// and a single reload.
    fn persist_and_reload(&mut self) {
        if !self.config_write_pending {
            self.config_write_pending = true;
            self.reload.add_pre_hook(|manager| {
                manager.config_write_pending = false;
                manager.write_to_configuration_file()
            });
        }
        self.reload.schedule();
    }

    /// The configuration directory.
    pub fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    /// Whether a link index is in the ignore set.
    pub fn is_ignored(&self, idx: u32) -> bool {
        self.ignored_intf.contains(&idx)
    }

    /// Look up a managed interface by name.
    pub fn interface(&self, name: &str) -> Option<&EthernetInterface> {
        self.interfaces.get(name)
    }

    /// Look up a managed interface through the by-index map.
    pub fn interface_by_idx(&self, idx: u32) -> Option<&EthernetInterface> {
        let name = self.interfaces_by_idx.get(&idx)?;
        self.interfaces.get(name)
    }

    /// Iterate over all managed interfaces.
    pub fn interfaces(&self) -> impl Iterator<Item = &EthernetInterface> {
        self.interfaces.values()
    }

    /// Iterate over the by-index bindings as (index, name key) pairs.
    pub fn index_bindings(&self) -> impl Iterator<Item = (u32, &str)> {
        self.interfaces_by_idx
            .iter()
            .map(|(idx, name)| (*idx, name.as_str()))
    }

    /// The registry's view of one link.
    pub fn intf_info(&self, idx: u32) -> Option<&AllIntfInfo> {
        self.intf_info.get(&idx)
    }

    /// Whether the supervisor has reported a state for this link.
    pub fn supervisor_state(&self, idx: u32) -> Option<bool> {
        self.supervisor_state.get(&idx).copied()
    }

    // ========================================================================
    // Kernel event dispatch
    // ========================================================================

    /// Apply one kernel event to the registry.
    pub fn handle_event(&mut self, event: RtnlEvent) -> Result<()> {
        match event {
            RtnlEvent::NewLink(msg) => {
                self.add_interface(InterfaceInfo::from_link(&msg));
                Ok(())
            }
            RtnlEvent::DelLink(msg) => {
                self.remove_interface(&InterfaceInfo::from_link(&msg));
                Ok(())
            }
            RtnlEvent::NewAddress(msg) => {
                let info = AddressInfo::from_msg(&msg)
                    .ok_or(Error::MissingAttribute("address"))?;
                self.add_address(info)
            }
            RtnlEvent::DelAddress(msg) => {
                if let Some(info) = AddressInfo::from_msg(&msg) {
                    self.remove_address(&info);
                }
                Ok(())
            }
            RtnlEvent::NewRoute(msg) => {
                // Non-default routes are dropped without comment.
                if let Some(gw) = DefaultGateway::from_route(&msg) {
                    self.add_def_gw(gw.ifidx, gw.addr);
                }
                Ok(())
            }
            RtnlEvent::DelRoute(msg) => {
                if let Some(gw) = DefaultGateway::from_route(&msg) {
                    self.remove_def_gw(gw.ifidx, gw.addr);
                }
                Ok(())
            }
            RtnlEvent::NewNeighbor(msg) => self.add_neighbor(NeighborInfo::from_msg(&msg)),
            RtnlEvent::DelNeighbor(msg) => {
                self.remove_neighbor(&NeighborInfo::from_msg(&msg));
                Ok(())
            }
        }
    }

    /// Apply one kernel event, logging failures at the loop boundary.
    ///
    /// Errors referring to an ignored link index are suppressed.
    pub fn dispatch(&mut self, event: RtnlEvent) {
        let ifidx = event.ifindex();
        if let Err(err) = self.handle_event(event) {
            match ifidx {
                Some(idx) if self.ignored_intf.contains(&idx) => {}
                _ => error!(%err, "failed handling netlink event"),
            }
        }
    }

    // ========================================================================
    // Registry mutations
    // ========================================================================

    /// Record a link report and create its managed object if the
    /// supervisor state is already known.
    pub fn add_interface(&mut self, info: InterfaceInfo) {
        if info.hw_type != arphrd::ETHER {
            self.ignored_intf.insert(info.idx);
            return;
        }
        if let Some(name) = &info.name
            && self.ignored_names.contains(name)
        {
            if self.warned_ignored.insert(name.clone()) {
                info!(intf = %name, "ignoring interface");
            }
            self.ignored_intf.insert(info.idx);
            return;
        }

        let idx = info.idx;
        match self.intf_info.entry(idx) {
            Entry::Occupied(mut entry) => entry.get_mut().intf = info,
            Entry::Vacant(entry) => {
                entry.insert(AllIntfInfo::new(info));
            }
        }

        if let Some(&managed) = self.supervisor_state.get(&idx) {
            self.create_interface(idx, managed);
        }
    }

    /// Create or refresh the managed object for a known link.
    fn create_interface(&mut self, idx: u32, managed: bool) {
        if self.ignored_intf.contains(&idx) {
            return;
        }
        let Some(all) = self.intf_info.get(&idx).cloned() else {
            return;
        };

        if let Some(existing) = self.interfaces_by_idx.get(&idx).cloned() {
            match &all.intf.name {
                Some(new_name) if *new_name != existing => {
                    // Renamed: drop the old bindings and re-create below.
                    self.interfaces_by_idx.remove(&idx);
                    self.interfaces.remove(&existing);
                }
                _ => {
                    if let Some(obj) = self.interfaces.get_mut(&existing) {
                        obj.update_info(&all.intf);
                        self.persist_and_reload();
                    }
                    return;
                }
            }
        } else if let Some(name) = &all.intf.name
            && let Some(obj) = self.interfaces.get_mut(name)
        {
            // A different index claimed an existing name; reuse the object.
            obj.update_info(&all.intf);
            self.persist_and_reload();
            return;
        }

        let Some(name) = all.intf.name.clone() else {
            error!(idx, "cannot create an interface without a name");
            return;
        };

        let config = NetworkConfig::load(&self.conf_dir, &name);
        let mut intf = EthernetInterface::new(&all, &config, managed, &self.obj_root);
        intf.load_name_servers(&config);
        intf.load_ntp_servers(&config);

        self.interfaces.insert(name.clone(), intf);
        self.interfaces_by_idx.insert(idx, name);
        self.persist_and_reload();
    }

    /// Remove a link and its managed object.
    ///
    /// If the by-name and by-index lookups resolve to different objects
    /// the registry is corrupt and the process aborts.
    pub fn remove_interface(&mut self, info: &InterfaceInfo) {
        let by_idx = self.interfaces_by_idx.get(&info.idx).cloned();
        let mut by_name: Option<String> = None;

        if let Some(name) = &info.name {
            if self.interfaces.contains_key(name) {
                by_name = Some(name.clone());
                if let Some(idx_name) = &by_idx
                    && idx_name != name
                {
                    error!(idx = info.idx, name = %name, "interface registry desync detected");
                    std::process::abort();
                }
            }
        } else if let Some(idx_name) = &by_idx {
            by_name = Some(idx_name.clone());
        }

        // Ordering: the index binding goes first, then the owning entry.
        if by_idx.is_some() {
            self.interfaces_by_idx.remove(&info.idx);
        } else {
            self.ignored_intf.remove(&info.idx);
        }
        if let Some(name) = by_name {
            self.interfaces.remove(&name);
            self.persist_and_reload();
        }
        self.intf_info.remove(&info.idx);
    }

    /// Record an address report.
    pub fn add_address(&mut self, info: AddressInfo) -> Result<()> {
        if info.is_deprecated() {
            return Ok(());
        }
        if let Some(all) = self.intf_info.get_mut(&info.ifidx) {
            all.addrs.insert(info.addr, info);
            if let Some(name) = self.interfaces_by_idx.get(&info.ifidx)
                && let Some(obj) = self.interfaces.get_mut(name)
            {
                obj.add_addr(info);
                self.persist_and_reload();
            }
            Ok(())
        } else if !self.ignored_intf.contains(&info.ifidx) {
            Err(Error::UnknownInterface {
                ifidx: info.ifidx,
                what: "addr",
            })
        } else {
            Ok(())
        }
    }

    /// Drop an address report. Tolerates unknown links and absent entries.
    pub fn remove_address(&mut self, info: &AddressInfo) {
        if let Some(all) = self.intf_info.get_mut(&info.ifidx) {
            all.addrs.remove(&info.addr);
        }
        if let Some(name) = self.interfaces_by_idx.get(&info.ifidx)
            && let Some(obj) = self.interfaces.get_mut(name)
        {
            obj.remove_addr(&info.addr);
            self.persist_and_reload();
        }
    }

    /// Record a neighbor report. Only permanent entries with an address
    /// are retained.
    pub fn add_neighbor(&mut self, info: NeighborInfo) -> Result<()> {
        if !info.is_permanent() {
            return Ok(());
        }
        let Some(addr) = info.addr else {
            return Ok(());
        };
        if let Some(all) = self.intf_info.get_mut(&info.ifidx) {
            all.static_neighs.insert(addr, info);
            if let Some(name) = self.interfaces_by_idx.get(&info.ifidx)
                && let Some(obj) = self.interfaces.get_mut(name)
            {
                obj.add_static_neigh(info);
                self.persist_and_reload();
            }
            Ok(())
        } else if !self.ignored_intf.contains(&info.ifidx) {
            Err(Error::UnknownInterface {
                ifidx: info.ifidx,
                what: "neigh",
            })
        } else {
            Ok(())
        }
    }

    /// Drop a neighbor report. Tolerates absence.
    pub fn remove_neighbor(&mut self, info: &NeighborInfo) {
        let Some(addr) = info.addr else {
            return;
        };
        if let Some(all) = self.intf_info.get_mut(&info.ifidx) {
            all.static_neighs.remove(&addr);
        }
        if let Some(name) = self.interfaces_by_idx.get(&info.ifidx)
            && let Some(obj) = self.interfaces.get_mut(name)
        {
            obj.remove_static_neigh(&addr);
            self.persist_and_reload();
        }
    }

    /// Record a default gateway; re-adding replaces per family.
    pub fn add_def_gw(&mut self, ifidx: u32, addr: IpAddr) {
        if let Some(all) = self.intf_info.get_mut(&ifidx) {
            match addr {
                IpAddr::V4(v4) => all.defgw4 = Some(v4),
                IpAddr::V6(v6) => all.defgw6 = Some(v6),
            }
            if let Some(name) = self.interfaces_by_idx.get(&ifidx)
                && let Some(obj) = self.interfaces.get_mut(name)
            {
                match addr {
                    IpAddr::V4(v4) => obj.set_default_gateway(Some(v4)),
                    IpAddr::V6(v6) => obj.set_default_gateway6(Some(v6)),
                }
                self.persist_and_reload();
            }
        } else if !self.ignored_intf.contains(&ifidx) {
            error!(ifidx, "interface not found for gateway");
        }
    }

    /// Clear a default gateway, but only while it still holds the address
    /// being removed; a newer value that already replaced it survives.
    pub fn remove_def_gw(&mut self, ifidx: u32, addr: IpAddr) {
        let Some(all) = self.intf_info.get_mut(&ifidx) else {
            return;
        };
        match addr {
            IpAddr::V4(v4) => {
                if all.defgw4 == Some(v4) {
                    all.defgw4 = None;
                }
            }
            IpAddr::V6(v6) => {
                if all.defgw6 == Some(v6) {
                    all.defgw6 = None;
                }
            }
        }
        if let Some(name) = self.interfaces_by_idx.get(&ifidx)
            && let Some(obj) = self.interfaces.get_mut(name)
        {
            let cleared = match addr {
                IpAddr::V4(v4) if obj.default_gateway() == Some(v4) => {
                    obj.set_default_gateway(None);
                    true
                }
                IpAddr::V6(v6) if obj.default_gateway6() == Some(v6) => {
                    obj.set_default_gateway6(None);
                    true
                }
                _ => false,
            };
            if cleared {
                self.persist_and_reload();
            }
        }
    }

    // ========================================================================
    // Supervisor state
    // ========================================================================

    /// Apply an administrative-state report from the supervisor.
    pub fn handle_admin_state(&mut self, state: &str, ifidx: u32) {
        match state {
            "initialized" | "linger" => {
                self.supervisor_state.remove(&ifidx);
            }
            _ => {
                let managed = state != "unmanaged";
                self.supervisor_state.insert(ifidx, managed);
                if self.intf_info.contains_key(&ifidx) {
                    self.create_interface(ifidx, managed);
                }
            }
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create a VLAN on an existing interface, returning the new object's
    /// identifier.
    pub fn vlan(&mut self, interface_name: &str, id: u32) -> Result<String> {
        if id == 0 || id >= 4095 {
            error!(vlan = id, "VLAN ID is not valid");
            return Err(Error::InvalidArgument {
                name: "VLANId",
                value: id.to_string(),
            });
        }
        let parent = self
            .interfaces
            .get_mut(interface_name)
            .ok_or_else(|| Error::NotFound(interface_name.to_string()))?;

        let child = parent.create_vlan(id as u16, &self.conf_dir, &self.obj_root)?;
        let path = child.object_path().to_string();
        self.interfaces.insert(child.name().to_string(), child);
        self.persist_and_reload();
        Ok(path)
    }

    /// Delete every file in the configuration directory, ignoring
    /// per-file errors. In-memory objects are untouched; the next reload
    /// re-materialises their configuration.
    pub fn reset(&mut self) {
        if let Ok(entries) = std::fs::read_dir(&self.conf_dir) {
            for entry in entries.flatten() {
                let _ = std::fs::remove_file(entry.path());
            }
        }
        info!("network configuration purged");
    }

    /// Re-emit every managed interface's configuration file.
    pub fn write_to_configuration_file(&self) -> Result<()> {
        for intf in self.interfaces.values() {
            intf.write_configuration_file(&self.conf_dir)?;
        }
        Ok(())
    }

    /// Emit the lldpd configuration for all managed interfaces.
    pub fn write_lldpd_config(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        out.push_str("configure system description BMC\n");
        out.push_str("configure system ip management pattern eth*\n");

        let mut names: Vec<_> = self.interfaces.keys().collect();
        names.sort();
        for name in names {
            let status = if self.interfaces[name].emit_lldp() {
                "tx-only"
            } else {
                "disabled"
            };
            out.push_str(&format!("configure ports {name} lldp status {status}\n"));
        }

        std::fs::write(path, out)?;
        Ok(())
    }

    // ========================================================================
    // Reload firing
    // ========================================================================

    /// Fire a scheduled reload: run pre-hooks, issue the supervisor
    /// reload, then run post-hooks.
    ///
    /// Hook failures are logged and never abort the sequence. A failed
    /// supervisor reload discards the post-hooks. Both lists are one-shot.
    pub async fn run_reload<S: LinkSupervisor>(&mut self, supervisor: &S) {
        let (pre_hooks, post_hooks) = self.reload.take_firing();

        for hook in pre_hooks {
            if let Err(err) = hook(self) {
                error!(%err, "reload pre-hook failed, continuing");
            }
        }

        if let Err(err) = supervisor.reload().await {
            error!(%err, "failed to reload network supervisor");
            return;
        }
        info!("reloaded network supervisor");

        for hook in post_hooks {
            if let Err(err) = hook(self) {
                error!(%err, "reload post-hook failed, continuing");
            }
        }
    }
}
