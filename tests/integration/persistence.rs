use crate::*;

use std::path::PathBuf;

use streamhost_services::{HostInput, HostSnapshot, HostStore, PairState};

fn temp_store(name: &str) -> (HostStore, PathBuf) {
    let dir = std::env::temp_dir().join(format!("streamhost-it-{}-{name}", std::process::id()));
    (HostStore::new(dir.join("hosts.json")), dir)
}

#[tokio::test]
async fn saved_hosts_survive_restart_and_merge_with_discovery() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let office = FakeHost::spawn(2, "office").await?;
    let (store, dir) = temp_store("restart");

    // first session: discover, pick a host, pair it, save
    {
        let (manager, engine) = client(&[&den], 1_000, 300);
        engine.run_round_now().await?;
        manager.select(&den.id)?;
        manager.set_pair_state(&den.id, PairState::Paired)?;
        store.save(&manager.save())?;
    }

    // second session: load silently, then discover both hosts
    let (manager, engine) = client(&[&den, &office], 1_000, 300);
    let (_, log) = record(&manager);
    let snapshot = store.load()?.context("saved host list missing")?;
    let report = manager.load(snapshot);
    assert_eq!(report.loaded, 1);
    assert!(log.lock().unwrap().is_empty());

    let selected = manager.selected().context("selection not restored")?;
    assert_eq!(selected.id, den.id);
    assert_eq!(selected.pair_state, PairState::Paired);

    engine.run_round_now().await?;
    let hosts = manager.get_all();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0].id, den.id);
    assert!(hosts[0].selected);
    assert_eq!(hosts[0].pair_state, PairState::Paired);
    assert_eq!(hosts[1].id, office.id);

    let events = log.lock().unwrap().clone();
    assert!(events.contains(&(HostEvent::Updated, den.id)));
    assert!(events.contains(&(HostEvent::Added, office.id)));

    let _ = std::fs::remove_dir_all(dir);
    den.shutdown().await?;
    office.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn corrupt_snapshot_is_compacted_on_load() -> Result<()> {
    let manager = HostManager::new();
    let mut hosts: Vec<Host> = Vec::new();
    for (byte, name) in [(1u8, "a"), (2, "b"), (1, "a-dup")] {
        let source = HostManager::new();
        let (mut host, _) = source.add_host(HostInput::manual(
            HostId([byte; 16]),
            format!("10.0.0.{byte}:47989").parse()?,
            name,
        ));
        host.selected = true;
        hosts.push(host);
    }

    let report = manager.load(HostSnapshot { version: 1, hosts });
    assert_eq!(report.loaded, 2);
    assert_eq!(report.duplicates_dropped, 1);
    assert_eq!(report.selections_cleared, 1);

    let hosts = manager.get_all();
    assert_eq!(hosts[0].name, "a");
    assert!(hosts[0].selected);
    assert!(!hosts[1].selected);
    Ok(())
}

#[tokio::test]
async fn removing_selected_host_clears_selection_for_observers() -> Result<()> {
    let den = FakeHost::spawn(1, "den").await?;
    let (manager, engine) = client(&[&den], 1_000, 300);
    engine.run_round_now().await?;
    manager.select(&den.id)?;

    let (_, log) = record(&manager);
    manager.remove(&den.id)?;

    assert_eq!(
        *log.lock().unwrap(),
        vec![(HostEvent::Updated, den.id), (HostEvent::Removed, den.id)]
    );
    assert!(manager.selected().is_none());
    assert!(manager.get_all().is_empty());

    // rediscovery brings it back as a new, unselected host
    engine.run_round_now().await?;
    let hosts = manager.get_all();
    assert_eq!(hosts.len(), 1);
    assert!(!hosts[0].selected);

    den.shutdown().await?;
    Ok(())
}
