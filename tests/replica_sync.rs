use lorebook::host::{MessageChannel, Notifier, SettingsStore, UserDirectory};
use lorebook::{EntryDraft, CommitOutcome, Role, UserInfo, WikiCore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// In-memory stand-ins for the host: one shared world store, one shared
// broadcast bus without sender echo, a mutable connected-user roster.

#[derive(Default)]
struct WorldStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl SettingsStore for WorldStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Default)]
struct Bus {
    outbox: Mutex<Vec<(usize, serde_json::Value)>>,
}

struct PeerChannel {
    index: usize,
    bus: Arc<Bus>,
}

impl MessageChannel for PeerChannel {
    fn publish(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        self.bus.outbox.lock().unwrap().push((self.index, payload));
        Ok(())
    }
}

struct Roster {
    current: UserInfo,
    connected: Arc<Mutex<Vec<UserInfo>>>,
}

impl UserDirectory for Roster {
    fn current_user(&self) -> UserInfo {
        self.current.clone()
    }

    fn connected_users(&self) -> Vec<UserInfo> {
        self.connected.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct RecordingNotifier {
    warnings: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

struct Replica {
    core: Arc<WikiCore>,
    notifier: Arc<RecordingNotifier>,
    refreshes: Arc<Mutex<usize>>,
}

struct Table {
    bus: Arc<Bus>,
    replicas: Vec<Replica>,
}

impl Table {
    async fn new(world: Arc<WorldStore>, users: &[UserInfo], connected: Arc<Mutex<Vec<UserInfo>>>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        let bus = Arc::new(Bus::default());
        let mut replicas = Vec::new();
        for (index, user) in users.iter().enumerate() {
            let notifier = Arc::new(RecordingNotifier::default());
            let core = WikiCore::new(
                world.clone(),
                Arc::new(PeerChannel {
                    index,
                    bus: bus.clone(),
                }),
                Arc::new(Roster {
                    current: user.clone(),
                    connected: connected.clone(),
                }),
                notifier.clone(),
            );
            let refreshes = Arc::new(Mutex::new(0));
            let counter = refreshes.clone();
            core.on_refresh(Arc::new(move || {
                *counter.lock().unwrap() += 1;
            }))
            .await;
            replicas.push(Replica {
                core,
                notifier,
                refreshes,
            });
        }
        Self { bus, replicas }
    }

    // Drains the bus, delivering every message to every replica except its
    // sender (host sockets do not echo), until traffic quiesces.
    async fn pump(&self) {
        loop {
            let batch: Vec<(usize, serde_json::Value)> =
                self.bus.outbox.lock().unwrap().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for (sender, payload) in batch {
                for (index, replica) in self.replicas.iter().enumerate() {
                    if index != sender {
                        replica
                            .core
                            .handle_message(payload.clone())
                            .await
                            .expect("message handling");
                    }
                }
            }
        }
    }
}

fn user(id: &str, name: &str, role: Role) -> UserInfo {
    UserInfo {
        id: id.to_string(),
        name: name.to_string(),
        role,
    }
}

fn draft(title: &str, category: &str) -> EntryDraft {
    EntryDraft {
        id: None,
        title: title.to_string(),
        category: category.to_string(),
        content: String::new(),
    }
}

#[tokio::test]
async fn gm_commit_converges_every_replica() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let player = user("p1", "Astra", Role::Player);
    let connected = Arc::new(Mutex::new(vec![gm.clone(), player.clone()]));
    let table = Table::new(world, &[gm, player], connected).await;

    let receipt = table.replicas[0]
        .core
        .save_entry(draft("Harbor", "locations"))
        .await
        .expect("gm save");
    assert_eq!(receipt.outcome, CommitOutcome::Committed);

    table.pump().await;

    for replica in &table.replicas {
        let entries = replica.core.entries().expect("read");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Harbor");
        assert_eq!(*replica.refreshes.lock().unwrap(), 1);
    }
}

#[tokio::test]
async fn blocked_save_retries_successfully_once_a_gm_joins() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let player = user("p1", "Astra", Role::Player);
    // The GM replica exists but is not yet listed as connected.
    let connected = Arc::new(Mutex::new(vec![player.clone()]));
    let table = Table::new(world, &[gm.clone(), player], connected.clone()).await;
    let player_replica = &table.replicas[1];

    let blocked = player_replica
        .core
        .save_entry(draft("Dragon", "npcs"))
        .await
        .expect("blocked save");
    assert_eq!(blocked.outcome, CommitOutcome::Blocked);
    assert!(player_replica.core.entries().expect("read").is_empty());
    assert_eq!(player_replica.notifier.warnings.lock().unwrap().len(), 1);

    table.pump().await;
    assert!(table.replicas[0].core.entries().expect("gm read").is_empty());

    // GM comes online; the player retries the same save.
    connected.lock().unwrap().push(gm);
    let relayed = player_replica
        .core
        .save_entry(draft("Dragon", "npcs"))
        .await
        .expect("relayed save");
    assert_eq!(relayed.outcome, CommitOutcome::Relayed);

    table.pump().await;

    for replica in &table.replicas {
        let entries = replica.core.entries().expect("read");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Dragon");
        assert_eq!(entries[0].category, "npcs");
        assert_eq!(entries[0].created_by, "Astra");
    }
}

#[tokio::test]
async fn relayed_save_is_ignored_by_player_replicas() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let p1 = user("p1", "Astra", Role::Player);
    let p2 = user("p2", "Brennan", Role::Player);
    let connected = Arc::new(Mutex::new(vec![gm.clone(), p1.clone(), p2.clone()]));
    let table = Table::new(world, &[gm, p1, p2], connected).await;

    table.replicas[1]
        .core
        .save_entry(draft("Smuggler's Cove", "locations"))
        .await
        .expect("relay");
    table.pump().await;

    // Exactly one commit happened: the GM's, then one refresh broadcast.
    let entries = table.replicas[2].core.entries().expect("read");
    assert_eq!(entries.len(), 1);
    assert_eq!(*table.replicas[2].refreshes.lock().unwrap(), 1);
}

#[tokio::test]
async fn hidden_entries_and_gm_notes_stay_on_the_gm_side() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let player = user("p1", "Astra", Role::Player);
    let connected = Arc::new(Mutex::new(vec![gm.clone(), player.clone()]));
    let table = Table::new(world, &[gm, player], connected).await;
    let gm_core = &table.replicas[0].core;
    let player_core = &table.replicas[1].core;

    let receipt = gm_core
        .save_entry(draft("Secret Door", "locations"))
        .await
        .expect("seed");
    gm_core
        .save_gm_notes(&receipt.entry_id, "opens with the bronze key")
        .await
        .expect("notes");
    gm_core.set_hidden(&receipt.entry_id, true).await.expect("hide");
    table.pump().await;

    let gm_view = gm_core.projection().await.expect("gm projection");
    assert_eq!(gm_view.entries.len(), 1);
    assert!(gm_view.entries[0].hidden);

    let player_view = player_core.projection().await.expect("player projection");
    assert!(player_view.entries.is_empty());
    let raw = serde_json::to_string(&player_view).expect("serialize");
    assert!(!raw.contains("gmNotes"));
    assert!(!raw.contains("bronze key"));

    // Cross-references behave as if the entry does not exist for players.
    let player_render = player_core
        .render_content("Check [[Secret Door]].")
        .expect("render");
    assert!(player_render.contains("wiki-link-broken"));
    let gm_render = gm_core
        .render_content("Check [[Secret Door]].")
        .expect("render");
    assert!(gm_render.contains("data-entry-id"));
}

#[tokio::test]
async fn player_selection_clears_when_the_entry_is_hidden_remotely() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let player = user("p1", "Astra", Role::Player);
    let connected = Arc::new(Mutex::new(vec![gm.clone(), player.clone()]));
    let table = Table::new(world, &[gm, player], connected).await;
    let gm_core = &table.replicas[0].core;
    let player_core = &table.replicas[1].core;

    let receipt = gm_core
        .save_entry(draft("Harbor", "locations"))
        .await
        .expect("seed");
    table.pump().await;

    player_core.select_entry(Some(receipt.entry_id.clone())).await;
    let selected = player_core.projection().await.expect("projection");
    assert_eq!(selected.selected.as_deref(), Some(receipt.entry_id.as_str()));

    gm_core.set_hidden(&receipt.entry_id, true).await.expect("hide");
    table.pump().await;

    let cleared = player_core.projection().await.expect("projection");
    assert!(cleared.selected.is_none());
}

#[tokio::test]
async fn presence_replicates_and_disconnect_purges_everywhere() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let player = user("p1", "Astra", Role::Player);
    let connected = Arc::new(Mutex::new(vec![gm.clone(), player.clone()]));
    let table = Table::new(world, &[gm, player], connected).await;
    let gm_core = &table.replicas[0].core;
    let player_core = &table.replicas[1].core;

    let first = gm_core
        .save_entry(draft("Harbor", "locations"))
        .await
        .expect("seed");
    let second = gm_core
        .save_entry(draft("Lighthouse", "locations"))
        .await
        .expect("seed");
    table.pump().await;

    gm_core.begin_editing(&first.entry_id).await.expect("open first");
    gm_core.begin_editing(&second.entry_id).await.expect("open second");
    table.pump().await;

    let seen = player_core.projection().await.expect("projection");
    assert!(seen
        .entries
        .iter()
        .all(|row| row.editing_by.as_deref() == Some("Mercer")));

    // Every replica reacts to the same host-level disconnect signal; no
    // broadcast is involved.
    for replica in &table.replicas {
        replica.core.handle_user_disconnected("g1").await;
    }

    let cleared = player_core.projection().await.expect("projection");
    assert!(cleared.entries.iter().all(|row| row.editing_by.is_none()));
    let gm_side = gm_core.projection().await.expect("projection");
    assert!(gm_side.entries.iter().all(|row| row.editing_by.is_none()));
}

#[tokio::test]
async fn dropped_refresh_is_recovered_by_the_storage_fallback() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let player = user("p1", "Astra", Role::Player);
    let connected = Arc::new(Mutex::new(vec![gm.clone(), player.clone()]));
    let table = Table::new(world, &[gm, player], connected).await;

    table.replicas[0]
        .core
        .save_entry(draft("Harbor", "locations"))
        .await
        .expect("gm save");

    // Simulate the refresh broadcast being lost: drop the bus traffic.
    table.bus.outbox.lock().unwrap().clear();
    assert_eq!(*table.replicas[1].refreshes.lock().unwrap(), 0);

    // The host's storage-change notification still lands on every client.
    table.replicas[1].core.handle_storage_changed("wikiEntries").await;
    assert_eq!(*table.replicas[1].refreshes.lock().unwrap(), 1);
    assert_eq!(table.replicas[1].core.entries().expect("read").len(), 1);
}

#[tokio::test]
async fn concurrent_gm_overwrite_is_reported_to_the_applying_gm() {
    let world = Arc::new(WorldStore::default());
    let gm = user("g1", "Mercer", Role::Gm);
    let player = user("p1", "Astra", Role::Player);
    let connected = Arc::new(Mutex::new(vec![gm.clone(), player.clone()]));
    let table = Table::new(world, &[gm, player], connected).await;
    let gm_replica = &table.replicas[0];
    let player_core = &table.replicas[1].core;

    // Player relays a proposal based on an empty collection, but before the
    // GM applies it, the GM commits an unrelated entry.
    player_core
        .save_entry(draft("Dragon", "npcs"))
        .await
        .expect("relay");
    gm_replica
        .core
        .save_entry(draft("Harbor", "locations"))
        .await
        .expect("gm save in between");

    table.pump().await;

    let warnings = gm_replica.notifier.warnings.lock().unwrap();
    assert!(warnings.iter().any(|message| message.contains("overwrote")));
    // Last-write-wins still applied the relayed proposal.
    let entries = gm_replica.core.entries().expect("read");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Dragon");
}
