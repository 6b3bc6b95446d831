use crate::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use streamhost_services::{DiscoveryError, EngineState};
use tokio::net::UdpSocket;

#[tokio::test]
async fn background_discovery_finds_host() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let (manager, engine) = client(&[&den], 50, 30);
    let (_, log) = record(&manager);

    engine.start().await?;
    assert_eq!(engine.state(), EngineState::Running);

    let found = wait_until(Duration::from_secs(3), || !manager.get_all().is_empty()).await;
    assert!(found, "host was not discovered");
    assert!(
        wait_until(Duration::from_secs(3), || log.lock().unwrap().len() >= 2).await,
        "host was not refreshed by a later round"
    );

    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Stopped);

    let events = log.lock().unwrap().clone();
    assert_eq!(events[0], (HostEvent::Added, den.id));
    assert!(events[1..].iter().all(|e| *e == (HostEvent::Updated, den.id)));
    assert_eq!(manager.get_all().len(), 1);

    den.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn stop_does_not_wait_out_the_round() -> Result<()> {
    let silent = UdpSocket::bind("127.0.0.1:0").await?;
    let manager = HostManager::new();
    let engine = manager.discovery(
        Arc::new(UdpProbe::new(vec![silent.local_addr()?])),
        DiscoverySettings::new(Duration::from_secs(30), Duration::from_secs(30)),
    );

    engine.start().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = tokio::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(2), engine.stop())
        .await
        .context("stop blocked on the reply window")?;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(engine.state(), EngineState::Stopped);
    Ok(())
}

#[tokio::test]
async fn stop_cuts_short_a_manual_refresh() -> Result<()> {
    let silent = UdpSocket::bind("127.0.0.1:0").await?;
    let manager = HostManager::new();
    let engine = Arc::new(manager.discovery(
        Arc::new(UdpProbe::new(vec![silent.local_addr()?])),
        DiscoverySettings::new(Duration::from_secs(30), Duration::from_secs(30)),
    ));

    let refresh = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_round_now().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), engine.stop())
        .await
        .context("stop blocked on the manual refresh")?;
    let result = tokio::time::timeout(Duration::from_secs(2), refresh)
        .await
        .context("manual refresh kept running after stop")??;
    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    assert!(manager.get_all().is_empty());
    Ok(())
}

#[tokio::test]
async fn state_transitions_are_published() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let (_manager, engine) = client(&[&den], 100, 50);
    let mut states = engine.subscribe_state();
    assert_eq!(*states.borrow_and_update(), EngineState::Stopped);

    engine.start().await?;
    engine.start().await?;
    assert_eq!(*states.borrow_and_update(), EngineState::Running);

    engine.stop().await;
    engine.stop().await;
    assert_eq!(*states.borrow_and_update(), EngineState::Stopped);

    engine.start().await?;
    assert_eq!(engine.state(), EngineState::Running);
    engine.stop().await;

    den.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unregistered_listener_hears_nothing_more() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let (manager, engine) = client(&[&den], 20, 10);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let token = manager.register(Arc::new(EventFn(
        move |_: HostEvent, _: &Host| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )));
    let (_, other) = record(&manager);

    engine.start().await?;
    assert!(wait_until(Duration::from_secs(3), || calls.load(Ordering::SeqCst) > 0).await);

    assert!(manager.unregister(token));
    let seen_by_other = other.lock().unwrap().len();

    // a dispatch already in flight may still reach the unregistered
    // listener; once `other` has heard one more event it has finished
    assert!(
        wait_until(Duration::from_secs(3), || other.lock().unwrap().len() > seen_by_other).await
    );
    let frozen = calls.load(Ordering::SeqCst);
    let settled = other.lock().unwrap().len();

    // let several more rounds run
    assert!(
        wait_until(Duration::from_secs(3), || other.lock().unwrap().len() > settled + 2).await
    );
    engine.stop().await;

    assert_eq!(calls.load(Ordering::SeqCst), frozen);
    assert!(!manager.unregister(token));

    den.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn failing_listener_does_not_starve_others() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let (manager, engine) = client(&[&den], 1_000, 200);

    manager.register(Arc::new(EventFn(
        |_: HostEvent, _: &Host| -> anyhow::Result<()> { anyhow::bail!("ui went away") },
    )));
    let (_, log) = record(&manager);

    engine.run_round_now().await?;
    assert_eq!(*log.lock().unwrap(), vec![(HostEvent::Added, den.id)]);

    den.shutdown().await?;
    Ok(())
}
