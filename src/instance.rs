//! Per-instance controller.
//!
//! One task owns the state machine and processes commands, sweep ticks and
//! inbound broadcasts one at a time, each to completion. Callers talk to it
//! through a cloneable [`InstanceHandle`].

use crate::activity::ActivityFeed;
use crate::admin::{AdminToken, BackupDocument, MetadataUpdate};
use crate::broadcast::{BroadcastHub, InstanceChannel, Subscription, SyncMessage};
use crate::clock::Clock;
use crate::error::{AppError, AppResult, RaffleError, StoreError};
use crate::generator::PrizeContentGenerator;
use crate::models::{
    ActivityEvent, CampaignConfig, CampaignMetadata, Contact, PurchaseRecord, Reservation,
    TicketNumber, TicketState, Timestamp,
};
use crate::snapshot::RaffleSnapshot;
use crate::state_manager::{PurchaseReceipt, RaffleState, RESERVATION_TTL_MS};
use crate::store::RaffleStore;
use crate::view::{numbers_to_display, DashboardStats};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long the "syncing" indicator stays on after a remote merge
const SYNC_INDICATOR_MS: i64 = 1000;

const COMMAND_BUFFER: usize = 64;

/// Health and sync indicators for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub instance_id: Uuid,
    /// Saves are failing; the instance keeps running in memory
    pub persistence_degraded: bool,
    pub last_synced_at: Option<Timestamp>,
    pub syncing: bool,
}

/// Construction parameters
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    /// Policy used when the store holds no campaign yet
    pub campaign: CampaignConfig,
    pub reservation_ttl_ms: i64,
    pub sweep_interval: Duration,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            campaign: CampaignConfig::default(),
            reservation_ttl_ms: RESERVATION_TTL_MS,
            sweep_interval: Duration::from_secs(2),
        }
    }
}

/// Independently saved parts of the instance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Campaign,
    Metadata,
    Purchases,
}

impl Section {
    const ALL: [Section; 3] = [Section::Campaign, Section::Metadata, Section::Purchases];

    fn label(self) -> &'static str {
        match self {
            Section::Campaign => "campaign",
            Section::Metadata => "metadata",
            Section::Purchases => "purchase history",
        }
    }
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Reserve {
        ticket: TicketNumber,
        reply: Reply<Result<Reservation, RaffleError>>,
    },
    ReserveRandom {
        reply: Reply<Result<Reservation, RaffleError>>,
    },
    Cancel {
        ticket: TicketNumber,
        reply: Reply<bool>,
    },
    Purchase {
        tickets: Vec<TicketNumber>,
        contact: Contact,
        reply: Reply<Result<PurchaseReceipt, RaffleError>>,
    },
    Sweep {
        reply: Reply<BTreeSet<TicketNumber>>,
    },
    TicketState {
        ticket: TicketNumber,
        reply: Reply<Result<TicketState, RaffleError>>,
    },
    Search {
        query: String,
        page: u32,
        reply: Reply<Vec<TicketNumber>>,
    },
    Stats {
        reply: Reply<DashboardStats>,
    },
    Activity {
        reply: Reply<Vec<ActivityEvent>>,
    },
    Purchases {
        reply: Reply<Vec<PurchaseRecord>>,
    },
    Status {
        reply: Reply<InstanceStatus>,
    },
    Snapshot {
        reply: Reply<RaffleSnapshot>,
    },
    Metadata {
        reply: Reply<CampaignMetadata>,
    },
    UpdateMetadata {
        update: MetadataUpdate,
        reply: Reply<AppResult<CampaignMetadata>>,
    },
    UpdateConfig {
        config: CampaignConfig,
        reply: Reply<AppResult<()>>,
    },
    Export {
        reply: Reply<AppResult<BackupDocument>>,
    },
    Wipe {
        reply: Reply<()>,
    },
    Shutdown,
}

/// State owned by one instance task
pub struct RaffleInstance {
    state: RaffleState,
    feed: ActivityFeed,
    purchases: Vec<PurchaseRecord>,
    metadata: CampaignMetadata,
    store: Arc<dyn RaffleStore>,
    channel: InstanceChannel,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    sweep_interval: Duration,
    /// Sections whose last save failed; the in-memory copy is newer than the store
    unsaved: BTreeSet<Section>,
    last_synced_at: Option<Timestamp>,
}

impl RaffleInstance {
    /// Restore from the store, falling back to defaults when saved data is
    /// missing, corrupt or unreadable.
    pub fn load(
        settings: InstanceSettings,
        store: Arc<dyn RaffleStore>,
        hub: &BroadcastHub,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut unsaved = BTreeSet::new();

        let state = match store.load_snapshot() {
            Ok(Some(snapshot)) => {
                info!(
                    "Restored campaign with {} sold tickets",
                    snapshot.sold_numbers.len()
                );
                RaffleState::from_snapshot(snapshot)
            }
            Ok(None) => {
                info!("No saved campaign, starting fresh");
                RaffleState::new(settings.campaign.clone())
            }
            Err(e) => {
                if Self::note_load_failure(Section::Campaign, &e) {
                    unsaved.insert(Section::Campaign);
                }
                RaffleState::new(settings.campaign.clone())
            }
        }
        .with_reservation_ttl_ms(settings.reservation_ttl_ms);

        let metadata = match store.load_metadata() {
            Ok(metadata) => metadata.unwrap_or_default(),
            Err(e) => {
                if Self::note_load_failure(Section::Metadata, &e) {
                    unsaved.insert(Section::Metadata);
                }
                CampaignMetadata::default()
            }
        };

        let purchases = match store.load_purchases() {
            Ok(purchases) => purchases,
            Err(e) => {
                if Self::note_load_failure(Section::Purchases, &e) {
                    unsaved.insert(Section::Purchases);
                }
                Vec::new()
            }
        };

        Self {
            state,
            feed: ActivityFeed::new(),
            purchases,
            metadata,
            store,
            channel: hub.channel(Uuid::new_v4()),
            clock,
            rng: StdRng::from_entropy(),
            sweep_interval: settings.sweep_interval,
            unsaved,
            last_synced_at: None,
        }
    }

    /// Corrupt data is discarded silently; anything else degrades the
    /// instance to in-memory operation. Returns whether it degraded.
    fn note_load_failure(section: Section, err: &StoreError) -> bool {
        if err.is_corrupt() {
            warn!("Discarding corrupt saved {}: {}", section.label(), err);
            false
        } else {
            warn!(
                "Could not load saved {} ({}), continuing in memory",
                section.label(),
                err
            );
            true
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.channel.instance_id()
    }

    /// Start the instance task
    pub fn spawn(self) -> (InstanceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = InstanceHandle {
            instance_id: self.instance_id(),
            tx,
            generator: None,
        };
        // Subscribe before returning so no broadcast published after spawn is missed.
        let inbound = self.channel.subscribe();
        let task = tokio::spawn(self.run(rx, inbound));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut inbound: Subscription) {
        let mut sweep = time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Instance {} started, sweeping every {:?}",
            self.instance_id(),
            self.sweep_interval
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = sweep.tick() => {
                    self.sweep();
                }
                Some(message) = inbound.recv() => {
                    self.handle_remote(message);
                }
            }
        }

        info!("Instance {} stopped", self.instance_id());
    }

    fn now(&self) -> Timestamp {
        self.clock.now_ms()
    }

    fn handle_command(&mut self, command: Command) {
        let now = self.now();
        // Replies fail only when the caller stopped waiting.
        match command {
            Command::Reserve { ticket, reply } => {
                let _ = reply.send(self.state.reserve(ticket, now));
            }
            Command::ReserveRandom { reply } => {
                let _ = reply.send(self.state.reserve_random(&mut self.rng, now));
            }
            Command::Cancel { ticket, reply } => {
                let _ = reply.send(self.state.cancel(ticket));
            }
            Command::Purchase {
                tickets,
                contact,
                reply,
            } => {
                let _ = reply.send(self.purchase(&tickets, &contact, now));
            }
            Command::Sweep { reply } => {
                let _ = reply.send(self.sweep());
            }
            Command::TicketState { ticket, reply } => {
                let _ = reply.send(self.state.ticket_state(ticket, now));
            }
            Command::Search { query, page, reply } => {
                let _ = reply.send(numbers_to_display(&self.state, &query, page));
            }
            Command::Stats { reply } => {
                let _ = reply.send(DashboardStats::from_state(&self.state));
            }
            Command::Activity { reply } => {
                let _ = reply.send(self.feed.recent());
            }
            Command::Purchases { reply } => {
                let _ = reply.send(self.purchases.clone());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status(now));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            Command::Metadata { reply } => {
                let _ = reply.send(self.metadata.clone());
            }
            Command::UpdateMetadata { update, reply } => {
                let _ = reply.send(self.update_metadata(&update));
            }
            Command::UpdateConfig { config, reply } => {
                let _ = reply.send(self.update_config(config));
            }
            Command::Export { reply } => {
                let _ = reply.send(BackupDocument::export(
                    self.state.snapshot(),
                    self.metadata.clone(),
                    chrono::Utc::now(),
                ));
            }
            Command::Wipe { reply } => {
                self.wipe();
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn purchase(
        &mut self,
        tickets: &[TicketNumber],
        contact: &Contact,
        now: Timestamp,
    ) -> Result<PurchaseReceipt, RaffleError> {
        let receipt = self.state.purchase(tickets, contact, now)?;

        let records = receipt.tickets.iter().map(|&ticket| PurchaseRecord {
            ticket,
            timestamp: now,
            prize_label: self.metadata.prize_name.clone(),
        });
        let mut history: Vec<PurchaseRecord> = records.collect();
        history.append(&mut self.purchases);
        self.purchases = history;
        self.save(Section::Purchases);

        self.commit();

        self.feed.push(receipt.activity.clone());
        self.channel.publish(SyncMessage::Activity {
            event: receipt.activity.clone(),
        });

        Ok(receipt)
    }

    fn sweep(&mut self) -> BTreeSet<TicketNumber> {
        let now = self.now();
        let released = self.state.sweep_expired(now);
        if !released.is_empty() {
            debug!("Sweep released {:?}", released);
        }
        released
    }

    fn handle_remote(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::StateUpdate { snapshot } => {
                if let Err(e) = snapshot.validate() {
                    warn!("Ignoring invalid remote snapshot: {}", e);
                    return;
                }
                let outcome = self.state.apply_remote_snapshot(snapshot);
                if !outcome.preempted.is_empty() {
                    info!(
                        "Remote purchase took {} locally reserved tickets",
                        outcome.preempted.len()
                    );
                }
                self.last_synced_at = Some(self.now());
                self.save(Section::Campaign);
            }
            SyncMessage::Activity { event } => {
                self.feed.push(event);
            }
        }
    }

    /// Persist the committed state and announce it to other instances
    fn commit(&mut self) {
        self.save(Section::Campaign);
        self.channel.publish(SyncMessage::StateUpdate {
            snapshot: self.state.snapshot(),
        });
    }

    /// Save `section`, then retry any section whose earlier save failed
    fn save(&mut self, section: Section) {
        if !self.save_section(section) {
            return;
        }
        let pending: Vec<Section> = self.unsaved.iter().copied().collect();
        for retry in pending {
            if !self.save_section(retry) {
                return;
            }
        }
    }

    fn save_section(&mut self, section: Section) -> bool {
        let result = match section {
            Section::Campaign => self.store.save_snapshot(&self.state.snapshot()),
            Section::Metadata => self.store.save_metadata(&self.metadata),
            Section::Purchases => self.store.save_purchases(&self.purchases),
        };
        match result {
            Ok(()) => {
                if self.unsaved.remove(&section) && self.unsaved.is_empty() {
                    info!("Persistence recovered");
                }
                true
            }
            Err(e) => {
                warn!(
                    "Failed to save {} ({}), continuing in memory",
                    section.label(),
                    e
                );
                self.unsaved.insert(section);
                false
            }
        }
    }

    fn status(&self, now: Timestamp) -> InstanceStatus {
        InstanceStatus {
            instance_id: self.instance_id(),
            persistence_degraded: !self.unsaved.is_empty(),
            last_synced_at: self.last_synced_at,
            syncing: self
                .last_synced_at
                .is_some_and(|at| now - at < SYNC_INDICATOR_MS),
        }
    }

    fn update_metadata(&mut self, update: &MetadataUpdate) -> AppResult<CampaignMetadata> {
        let next = update.apply(&self.metadata)?;
        self.metadata = next.clone();
        self.save(Section::Metadata);
        info!("Campaign metadata updated");
        Ok(next)
    }

    fn update_config(&mut self, config: CampaignConfig) -> AppResult<()> {
        config.validate().map_err(AppError::Config)?;
        info!("Campaign policy updated: {:?}", config);
        self.state.set_config(config);
        self.commit();
        Ok(())
    }

    fn wipe(&mut self) {
        self.state.reset();
        self.feed.clear();
        self.purchases.clear();
        self.metadata = CampaignMetadata::default();
        if let Err(e) = self.store.clear() {
            error!("Failed to clear store: {}", e);
            self.unsaved.extend(Section::ALL);
        }
        // Overwrite every section so a partial clear cannot resurrect old data.
        self.save(Section::Metadata);
        self.save(Section::Purchases);
        self.commit();
        warn!("All raffle data wiped");
    }
}

/// Cloneable client for one instance
#[derive(Clone)]
pub struct InstanceHandle {
    instance_id: Uuid,
    tx: mpsc::Sender<Command>,
    generator: Option<Arc<dyn PrizeContentGenerator>>,
}

impl InstanceHandle {
    /// Attach a prize content generator
    pub fn with_generator(mut self, generator: Arc<dyn PrizeContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> AppResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| AppError::InstanceClosed)?;
        rx.await.map_err(|_| AppError::InstanceClosed)
    }

    pub async fn reserve(&self, ticket: TicketNumber) -> AppResult<Reservation> {
        Ok(self
            .request(|reply| Command::Reserve { ticket, reply })
            .await??)
    }

    /// Draw and reserve a random ticket
    pub async fn reserve_random(&self) -> AppResult<Reservation> {
        Ok(self.request(|reply| Command::ReserveRandom { reply }).await??)
    }

    pub async fn cancel(&self, ticket: TicketNumber) -> AppResult<bool> {
        self.request(|reply| Command::Cancel { ticket, reply }).await
    }

    pub async fn purchase(
        &self,
        tickets: Vec<TicketNumber>,
        contact: Contact,
    ) -> AppResult<PurchaseReceipt> {
        Ok(self
            .request(|reply| Command::Purchase {
                tickets,
                contact,
                reply,
            })
            .await??)
    }

    /// Run an expiry sweep now instead of waiting for the next tick
    pub async fn sweep_now(&self) -> AppResult<BTreeSet<TicketNumber>> {
        self.request(|reply| Command::Sweep { reply }).await
    }

    pub async fn ticket_state(&self, ticket: TicketNumber) -> AppResult<TicketState> {
        Ok(self
            .request(|reply| Command::TicketState { ticket, reply })
            .await??)
    }

    pub async fn search(&self, query: impl Into<String>, page: u32) -> AppResult<Vec<TicketNumber>> {
        let query = query.into();
        self.request(|reply| Command::Search { query, page, reply })
            .await
    }

    pub async fn stats(&self) -> AppResult<DashboardStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn activity(&self) -> AppResult<Vec<ActivityEvent>> {
        self.request(|reply| Command::Activity { reply }).await
    }

    /// This instance's own receipts, most recent first
    pub async fn my_purchases(&self) -> AppResult<Vec<PurchaseRecord>> {
        self.request(|reply| Command::Purchases { reply }).await
    }

    pub async fn status(&self) -> AppResult<InstanceStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn snapshot(&self) -> AppResult<RaffleSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn metadata(&self) -> AppResult<CampaignMetadata> {
        self.request(|reply| Command::Metadata { reply }).await
    }

    pub async fn update_metadata(
        &self,
        _admin: &AdminToken,
        update: MetadataUpdate,
    ) -> AppResult<CampaignMetadata> {
        self.request(|reply| Command::UpdateMetadata { update, reply })
            .await?
    }

    pub async fn update_config(&self, _admin: &AdminToken, config: CampaignConfig) -> AppResult<()> {
        self.request(|reply| Command::UpdateConfig { config, reply })
            .await?
    }

    /// Generate a new description. On failure the current one is kept.
    pub async fn generate_description(
        &self,
        admin: &AdminToken,
        instruction: &str,
    ) -> AppResult<CampaignMetadata> {
        let generator = self.generator()?;
        let current = self.metadata().await?;
        let text = generator
            .generate_description(&current.prize_name, instruction)
            .await?;
        self.update_metadata(admin, MetadataUpdate::description(text))
            .await
    }

    /// Generate a new prize image. On failure the current one is kept.
    pub async fn generate_image(&self, admin: &AdminToken) -> AppResult<CampaignMetadata> {
        let generator = self.generator()?;
        let current = self.metadata().await?;
        let image = generator.generate_image(&current.prize_name).await?;
        self.update_metadata(admin, MetadataUpdate::prize_image(image))
            .await
    }

    fn generator(&self) -> AppResult<&Arc<dyn PrizeContentGenerator>> {
        self.generator
            .as_ref()
            .ok_or_else(|| AppError::ExternalService("no generator configured".to_string()))
    }

    pub async fn export_backup(&self, _admin: &AdminToken) -> AppResult<BackupDocument> {
        self.request(|reply| Command::Export { reply }).await?
    }

    /// Erase campaign, metadata, history and feed, and tell other instances
    pub async fn wipe(&self, _admin: &AdminToken) -> AppResult<()> {
        self.request(|reply| Command::Wipe { reply }).await
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}
