use crate::*;

use std::net::SocketAddr;

use streamhost_services::{DiscoveryError, HostInput, PairState};
use tokio::net::UdpSocket;

#[tokio::test]
async fn round_discovers_every_host() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let office = FakeHost::spawn(2, "office").await?;
    let (manager, engine) = client(&[&den, &office], 1_000, 300);
    let (_, log) = record(&manager);

    let summary = engine.run_round_now().await?;
    assert_eq!(summary.added, 2);

    let hosts = manager.get_all();
    assert_eq!(hosts.len(), 2);
    let mut names: Vec<_> = hosts.iter().map(|h| h.name.as_str()).collect();
    names.sort();
    assert_eq!(names, ["den", "office"]);
    for host in &hosts {
        assert_eq!(host.status, HostStatus::Online);
        assert_eq!(host.address, "127.0.0.1:47989".parse::<SocketAddr>()?);
        assert!(host.last_seen.is_some());
        assert!(!host.selected);
    }
    assert!(log.lock().unwrap().iter().all(|(e, _)| *e == HostEvent::Added));

    den.shutdown().await?;
    office.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn rediscovery_keeps_order_and_selection() -> Result<()> {
    let a = FakeHost::spawn(1, "a").await?;
    let b = FakeHost::spawn(2, "b").await?;
    let c = FakeHost::spawn(3, "c").await?;
    let (manager, engine) = client(&[&a, &b, &c], 1_000, 300);

    engine.run_round_now().await?;
    let order: Vec<HostId> = manager.get_all().iter().map(|h| h.id).collect();
    manager.select(&order[1])?;

    let (_, log) = record(&manager);
    let summary = engine.run_round_now().await?;
    assert_eq!(summary.updated, 3);
    assert_eq!(summary.added, 0);

    let after = manager.get_all();
    assert_eq!(after.iter().map(|h| h.id).collect::<Vec<_>>(), order);
    assert_eq!(manager.selected().map(|h| h.id), Some(order[1]));
    assert_eq!(after.iter().filter(|h| h.selected).count(), 1);
    assert!(log.lock().unwrap().iter().all(|(e, _)| *e == HostEvent::Updated));

    for host in [a, b, c] {
        host.shutdown().await?;
    }
    Ok(())
}

#[tokio::test]
async fn discovery_refreshes_manual_host_in_place() -> Result<()> {
    let den = FakeHost::spawn_with(1, "den-renamed", HostStatus::Busy).await?;
    let (manager, engine) = client(&[&den], 1_000, 300);

    manager.add_host(HostInput::manual(den.id, "10.0.0.1:47989".parse()?, "den"));
    manager.add_host(HostInput::manual(HostId([9; 16]), "10.0.0.9:47989".parse()?, "other"));
    manager.set_pair_state(&den.id, PairState::Paired)?;

    engine.run_round_now().await?;

    let hosts = manager.get_all();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0].id, den.id);
    assert_eq!(hosts[0].name, "den-renamed");
    assert_eq!(hosts[0].status, HostStatus::Busy);
    assert_eq!(hosts[0].address, "127.0.0.1:47989".parse::<SocketAddr>()?);
    assert_eq!(hosts[0].pair_state, PairState::Paired);
    assert_eq!(hosts[1].status, HostStatus::Unknown);

    den.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn silent_network_leaves_registry_untouched() -> Result<()> {
    // bound but never answers, so no ICMP errors either
    let silent = UdpSocket::bind("127.0.0.1:0").await?;
    let manager = HostManager::new();
    let engine = manager.discovery(
        Arc::new(UdpProbe::new(vec![silent.local_addr()?])),
        DiscoverySettings::new(Duration::from_millis(1_000), Duration::from_millis(100)),
    );
    manager.add_host(HostInput::manual(HostId([9; 16]), "10.0.0.9:47989".parse()?, "known"));
    let before = manager.get_all();
    let (_, log) = record(&manager);

    let result = engine.run_round_now().await;
    assert!(matches!(result, Err(DiscoveryError::Timeout(_))));
    assert_eq!(manager.get_all(), before);
    assert!(log.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn garbage_replies_are_ignored() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let noisy = UdpSocket::bind("127.0.0.1:0").await?;
    let noisy_addr = noisy.local_addr()?;
    let noise = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        if let Ok((_, from)) = noisy.recv_from(&mut buf).await {
            let _ = noisy.send_to(b"definitely not an announcement", from).await;
        }
    });

    let manager = HostManager::new();
    let engine = manager.discovery(
        Arc::new(UdpProbe::new(vec![noisy_addr, den.addr])),
        DiscoverySettings::new(Duration::from_millis(1_000), Duration::from_millis(300)),
    );

    let summary = engine.run_round_now().await?;
    assert_eq!(summary.added, 1);
    assert_eq!(summary.malformed, 1);
    assert_eq!(manager.get_all().len(), 1);

    noise.await?;
    den.shutdown().await?;
    Ok(())
}
