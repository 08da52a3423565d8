//! End-to-end registry scenarios, driven through the same typed-event API
//! the daemon uses.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bmcnet::netlink::RtnlEvent;
use bmcnet::netlink::messages::{AddressMessage, LinkMessage, NeighborMessage, RouteMessage};
use bmcnet::netlink::types::addr::IfAddrMsg;
use bmcnet::netlink::types::link::{IfInfoMsg, arphrd};
use bmcnet::netlink::types::neigh::{NdMsg, nud};
use bmcnet::registry::Manager;
use bmcnet::supervisor::{self, LinkSupervisor};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn manager(dir: &tempfile::TempDir) -> Manager {
    Manager::new(dir.path(), HashSet::from(["usb0".to_string()]))
}

fn link(idx: i32, name: &str) -> LinkMessage {
    let mut header = IfInfoMsg::new().with_index(idx);
    header.ifi_type = arphrd::ETHER;
    LinkMessage {
        header,
        name: Some(name.to_string()),
        mtu: Some(1500),
        ..Default::default()
    }
}

fn addr4(idx: u32, addr: &str, prefix: u8) -> AddressMessage {
    let mut header = IfAddrMsg::new().with_index(idx);
    header.ifa_family = libc::AF_INET as u8;
    header.ifa_prefixlen = prefix;
    AddressMessage {
        header,
        address: Some(addr.parse().unwrap()),
        ..Default::default()
    }
}

fn default_route4(oif: u32, gateway: &str) -> RouteMessage {
    RouteMessage {
        oif: Some(oif),
        gateway: Some(gateway.parse().unwrap()),
        ..Default::default()
    }
}

fn permanent_neigh(idx: i32, addr: &str, mac: [u8; 6]) -> NeighborMessage {
    let mut header = NdMsg::new().with_ifindex(idx).with_state(nud::PERMANENT);
    header.ndm_family = libc::AF_INET as u8;
    NeighborMessage {
        header,
        destination: Some(addr.parse().unwrap()),
        lladdr: Some(mac),
    }
}

#[derive(Default)]
struct MockSupervisor {
    reloads: AtomicUsize,
    fail: bool,
}

impl MockSupervisor {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LinkSupervisor for MockSupervisor {
    async fn reload(&self) -> supervisor::Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(supervisor::Error::UnexpectedReply("Reload"))
        } else {
            Ok(())
        }
    }
}

/// The structural invariants every scenario must leave intact.
fn assert_registry_consistent(mgr: &Manager) {
    for (idx, name) in mgr.index_bindings() {
        let obj = mgr
            .interface(name)
            .unwrap_or_else(|| panic!("binding {idx} -> {name} has no owning entry"));
        assert_eq!(obj.name(), name);
        let info = mgr
            .intf_info(idx)
            .unwrap_or_else(|| panic!("binding {idx} has no intf_info entry"));
        assert_eq!(info.intf.name.as_deref(), Some(name));
        assert!(!mgr.is_ignored(idx), "bound index {idx} is also ignored");
        assert!(
            info.addrs.values().all(|a| !a.is_deprecated()),
            "deprecated address retained on {name}"
        );
        assert!(
            info.static_neighs
                .values()
                .all(|n| n.is_permanent() && n.addr.is_some()),
            "invalid static neighbor retained on {name}"
        );
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Cold start with the supervisor down: kernel state is recorded but no
/// managed object exists until a state report arrives.
#[test]
fn scenario_cold_start_supervisor_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    mgr.dispatch(RtnlEvent::NewLink(link(2, "eth0")));
    mgr.dispatch(RtnlEvent::NewAddress(addr4(2, "192.168.1.5", 24)));

    let info = mgr.intf_info(2).expect("link recorded");
    assert_eq!(info.intf.name.as_deref(), Some("eth0"));
    assert_eq!(info.addrs.len(), 1);
    assert_eq!(mgr.interfaces().count(), 0);
    assert_registry_consistent(&mgr);
}

/// Continuing the cold start: the supervisor reports the link as managed
/// and the object appears with the recorded address.
#[test]
fn scenario_supervisor_reports_managed() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    mgr.dispatch(RtnlEvent::NewLink(link(2, "eth0")));
    mgr.dispatch(RtnlEvent::NewAddress(addr4(2, "192.168.1.5", 24)));
    mgr.handle_admin_state("configured", 2);

    let intf = mgr.interface("eth0").expect("managed object created");
    assert!(intf.nic_enabled());
    assert_eq!(intf.addrs().len(), 1);
    assert_registry_consistent(&mgr);
}

/// A name change results in exactly one object, keyed under the new name,
/// reachable through the same index.
#[test]
fn scenario_name_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    mgr.dispatch(RtnlEvent::NewLink(link(7, "eth0")));
    mgr.handle_admin_state("configured", 7);
    mgr.dispatch(RtnlEvent::NewLink(link(7, "lan0")));

    assert!(mgr.interface("eth0").is_none());
    let by_name = mgr.interface("lan0").expect("re-keyed under new name");
    let by_idx = mgr.interface_by_idx(7).expect("index still bound");
    assert_eq!(by_name.name(), by_idx.name());
    assert_eq!(by_idx.ifindex(), 7);
    assert_eq!(mgr.interfaces().count(), 1);
    assert_registry_consistent(&mgr);
}

/// VLAN creation returns a new object identifier; the kernel's subsequent
/// NEWLINK for the child refreshes the same object. Out-of-range IDs are
/// rejected as invalid arguments.
#[test]
fn scenario_vlan_creation() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    mgr.dispatch(RtnlEvent::NewLink(link(2, "eth0")));
    mgr.handle_admin_state("configured", 2);

    let path = mgr.vlan("eth0", 100).unwrap();
    assert_eq!(path, "/xyz/openbmc_project/network/eth0_100");
    assert!(mgr.reload.deadline().is_some(), "vlan creation schedules a reload");

    // The kernel reports the new link once the supervisor created it.
    let mut child = link(5, "eth0.100");
    child.link_info = Some(bmcnet::netlink::messages::LinkInfo {
        kind: Some("vlan".to_string()),
        data: None,
    });
    child.link = Some(2);
    mgr.dispatch(RtnlEvent::NewLink(child));
    mgr.handle_admin_state("configured", 5);

    let intf = mgr.interface("eth0.100").expect("vlan object integrated");
    assert_eq!(intf.ifindex(), 5);
    assert_eq!(mgr.interfaces().count(), 2);

    for id in [0, 4095] {
        assert!(mgr.vlan("eth0", id).is_err());
    }
    assert_registry_consistent(&mgr);
}

/// Ignored interfaces produce no entries and their address events are
/// silently dropped.
#[test]
fn scenario_ignored_interface() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    mgr.dispatch(RtnlEvent::NewLink(link(9, "usb0")));
    mgr.dispatch(RtnlEvent::NewAddress(addr4(9, "10.4.0.1", 16)));

    assert!(mgr.is_ignored(9));
    assert!(mgr.intf_info(9).is_none());
    assert_eq!(mgr.interfaces().count(), 0);
    assert_registry_consistent(&mgr);
}

/// Default gateways and static neighbors flow through to the managed
/// object; removing a superseded gateway leaves the newer one alone.
#[test]
fn scenario_gateway_and_neighbor_flow() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    mgr.dispatch(RtnlEvent::NewLink(link(2, "eth0")));
    mgr.handle_admin_state("configured", 2);

    mgr.dispatch(RtnlEvent::NewRoute(default_route4(2, "192.168.1.1")));
    mgr.dispatch(RtnlEvent::NewNeighbor(permanent_neigh(
        2,
        "192.168.1.1",
        [0xAA, 0xBB, 0xCC, 0, 0, 1],
    )));

    let intf = mgr.interface("eth0").unwrap();
    assert_eq!(
        intf.default_gateway(),
        Some("192.168.1.1".parse().unwrap())
    );
    assert_eq!(intf.static_neighbors().len(), 1);

    // A non-default route is dropped without touching the gateway.
    let mut prefixed = default_route4(2, "192.168.2.1");
    prefixed.header.rtm_dst_len = 24;
    mgr.dispatch(RtnlEvent::NewRoute(prefixed));
    assert_eq!(
        mgr.interface("eth0").unwrap().default_gateway(),
        Some("192.168.1.1".parse().unwrap())
    );

    // addDefGw followed by removeDefGw of the same address clears it.
    mgr.dispatch(RtnlEvent::DelRoute(default_route4(2, "192.168.1.1")));
    assert!(mgr.interface("eth0").unwrap().default_gateway().is_none());
    assert_registry_consistent(&mgr);
}

/// Schedules at t=0, 1s and 2s collapse into a single firing at t=5s.
#[tokio::test(start_paused = true)]
async fn scenario_debounced_reload() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);
    let supervisor = MockSupervisor::default();

    let start = tokio::time::Instant::now();
    mgr.reload.schedule();
    tokio::time::advance(Duration::from_secs(1)).await;
    mgr.reload.schedule();
    tokio::time::advance(Duration::from_secs(1)).await;
    mgr.reload.schedule();

    let hook_runs = std::sync::Arc::new(AtomicUsize::new(0));
    {
        let hook_runs = hook_runs.clone();
        mgr.reload.add_pre_hook(move |_| {
            hook_runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let deadline = mgr.reload.deadline().expect("reload scheduled");
    assert_eq!(deadline - start, Duration::from_secs(5));

    tokio::time::sleep_until(deadline).await;
    mgr.run_reload(&supervisor).await;

    assert_eq!(supervisor.reload_count(), 1);
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    assert!(mgr.reload.deadline().is_none(), "firing disarms the timer");

    // Hooks are one-shot: a second firing runs nothing further.
    mgr.run_reload(&supervisor).await;
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
}

/// Hooks registered during a firing run on the next firing only.
#[tokio::test(start_paused = true)]
async fn scenario_hooks_registered_during_firing() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);
    let supervisor = MockSupervisor::default();

    let late_runs = std::sync::Arc::new(AtomicUsize::new(0));
    {
        let late_runs = late_runs.clone();
        mgr.reload.add_pre_hook(move |inner| {
            let late_runs = late_runs.clone();
            inner.reload.add_post_hook(move |_| {
                late_runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });
    }

    mgr.run_reload(&supervisor).await;
    assert_eq!(late_runs.load(Ordering::SeqCst), 0, "runs next firing only");

    mgr.run_reload(&supervisor).await;
    assert_eq!(late_runs.load(Ordering::SeqCst), 1);
}

/// A failed supervisor reload runs the pre-hooks but discards post-hooks.
#[tokio::test(start_paused = true)]
async fn scenario_reload_failure_discards_post_hooks() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);
    let supervisor = MockSupervisor::failing();

    let pre_runs = std::sync::Arc::new(AtomicUsize::new(0));
    let post_runs = std::sync::Arc::new(AtomicUsize::new(0));
    {
        let pre_runs = pre_runs.clone();
        mgr.reload.add_pre_hook(move |_| {
            pre_runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let post_runs = post_runs.clone();
        mgr.reload.add_post_hook(move |_| {
            post_runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    mgr.run_reload(&supervisor).await;
    assert_eq!(pre_runs.load(Ordering::SeqCst), 1);
    assert_eq!(post_runs.load(Ordering::SeqCst), 0);

    // The discarded post-hook does not resurface on the next firing.
    let ok = MockSupervisor::default();
    mgr.run_reload(&ok).await;
    assert_eq!(post_runs.load(Ordering::SeqCst), 0);
}

/// Replaying the same reports leaves the registry unchanged; a full
/// removal clears every binding.
#[test]
fn scenario_replay_and_removal() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    for _ in 0..2 {
        mgr.dispatch(RtnlEvent::NewLink(link(2, "eth0")));
        mgr.dispatch(RtnlEvent::NewAddress(addr4(2, "192.168.1.5", 24)));
    }
    mgr.handle_admin_state("configured", 2);

    assert_eq!(mgr.interfaces().count(), 1);
    assert_eq!(mgr.intf_info(2).unwrap().addrs.len(), 1);
    assert_registry_consistent(&mgr);

    mgr.dispatch(RtnlEvent::DelLink(link(2, "eth0")));
    assert!(mgr.interface("eth0").is_none());
    assert!(mgr.interface_by_idx(2).is_none());
    assert!(mgr.intf_info(2).is_none());
    assert_registry_consistent(&mgr);
}

/// Kernel-driven changes on a managed interface are persisted and
/// reloaded into the supervisor through the debounced firing.
#[tokio::test(start_paused = true)]
async fn scenario_kernel_changes_persist_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);
    let supervisor = MockSupervisor::default();

    mgr.dispatch(RtnlEvent::NewLink(link(2, "eth0")));
    assert!(
        mgr.reload.deadline().is_none(),
        "nothing persisted before the object exists"
    );

    mgr.handle_admin_state("configured", 2);
    mgr.dispatch(RtnlEvent::NewAddress(addr4(2, "192.168.1.5", 24)));
    mgr.dispatch(RtnlEvent::NewRoute(default_route4(2, "192.168.1.1")));

    let deadline = mgr.reload.deadline().expect("mutations schedule a reload");
    tokio::time::sleep_until(deadline).await;
    mgr.run_reload(&supervisor).await;

    assert_eq!(supervisor.reload_count(), 1);
    let conf_path = dir.path().join("00-bmc-eth0.network");
    let text = std::fs::read_to_string(&conf_path).unwrap();
    assert!(text.contains("Address=192.168.1.5/24"));
    assert!(text.contains("Gateway=192.168.1.1"));

    // A later change queues a fresh write for the next firing.
    mgr.dispatch(RtnlEvent::DelRoute(default_route4(2, "192.168.1.1")));
    let deadline = mgr.reload.deadline().expect("new mutation re-arms the timer");
    tokio::time::sleep_until(deadline).await;
    mgr.run_reload(&supervisor).await;

    assert_eq!(supervisor.reload_count(), 2);
    let text = std::fs::read_to_string(&conf_path).unwrap();
    assert!(!text.contains("Gateway=192.168.1.1"));
}

/// Configuration emission is idempotent and reflects registry contents.
#[test]
fn scenario_write_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let mut mgr = manager(&dir);

    mgr.dispatch(RtnlEvent::NewLink(link(2, "eth0")));
    mgr.handle_admin_state("configured", 2);
    mgr.dispatch(RtnlEvent::NewAddress(addr4(2, "192.168.1.5", 24)));

    mgr.write_to_configuration_file().unwrap();
    let path = dir.path().join("00-bmc-eth0.network");
    let first = std::fs::read_to_string(&path).unwrap();
    assert!(first.contains("Name=eth0"));
    assert!(first.contains("Address=192.168.1.5/24"));

    mgr.write_to_configuration_file().unwrap();
    let second = std::fs::read_to_string(&path).unwrap();
    assert_eq!(first, second);
}
