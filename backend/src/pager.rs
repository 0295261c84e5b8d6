//! Pager controller
//!
//! A pager walks the pages of one exchange, exposes previous/next/regenerate
//! controls and locks itself once it has been idle for too long. The
//! [`PagerManager`] owns every live pager and sweeps idle ones in the
//! background.

use crate::error::AppError;
use crate::formatter::{Page, PageSet};
use crate::session::{ExchangeRequest, SessionController};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Source of the current instant
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: std::sync::Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: std::sync::Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + *offset
    }
}

/// Pager lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PagerState {
    /// Accepting navigation
    Active,
    /// Idle timeout reached; terminal
    Locked,
}

/// Enabled state of the pager buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PagerControls {
    /// "Previous" button
    pub previous_enabled: bool,
    /// "Next" button
    pub next_enabled: bool,
    /// "Regenerate" button
    pub regenerate_enabled: bool,
}

impl PagerControls {
    /// Everything disabled
    pub fn disabled() -> Self {
        Self {
            previous_enabled: false,
            next_enabled: false,
            regenerate_enabled: false,
        }
    }
}

/// Navigation state over the pages of one exchange
pub struct Pager {
    id: Uuid,
    pages: PageSet,
    index: usize,
    context: ExchangeRequest,
    state: PagerState,
    last_activity: Instant,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Pager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pager")
            .field("id", &self.id)
            .field("pages", &self.pages.len())
            .field("index", &self.index)
            .field("state", &self.state)
            .finish()
    }
}

impl Pager {
    /// Create an active pager positioned on the first page
    pub fn new(
        pages: PageSet,
        context: ExchangeRequest,
        idle_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let last_activity = clock.now();
        Self {
            id: Uuid::new_v4(),
            pages,
            index: 0,
            context,
            state: PagerState::Active,
            last_activity,
            idle_timeout,
            clock,
        }
    }

    /// Id used in button custom ids
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Zero-based index of the page being shown
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the pager holds no pages
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Active or locked
    pub fn state(&self) -> PagerState {
        self.state
    }

    /// Exchange this pager was produced from
    pub fn context(&self) -> &ExchangeRequest {
        &self.context
    }

    /// Lock the pager if the idle timeout has elapsed
    ///
    /// Returns whether the pager is locked afterwards.
    pub fn poll_expiry(&mut self) -> bool {
        if self.state == PagerState::Active
            && self.clock.now().saturating_duration_since(self.last_activity) >= self.idle_timeout
        {
            debug!(pager_id = %self.id, "Pager idle timeout reached, locking");
            self.state = PagerState::Locked;
        }
        self.state == PagerState::Locked
    }

    fn ensure_active(&mut self) -> Result<(), AppError> {
        if self.poll_expiry() {
            return Err(AppError::Expired(format!(
                "Pager {} has expired; start a new chat to continue.",
                self.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.last_activity = self.clock.now();
    }

    fn page(&self) -> Result<&Page, AppError> {
        self.pages.get(self.index).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "Pager index {} out of range for {} pages",
                self.index,
                self.pages.len()
            ))
        })
    }

    /// Page at the current index
    pub fn current(&mut self) -> Result<&Page, AppError> {
        self.ensure_active()?;
        self.page()
    }

    /// Move one page forward; stays put on the last page
    pub fn next(&mut self) -> Result<&Page, AppError> {
        self.ensure_active()?;
        self.touch();
        if self.index + 1 < self.pages.len() {
            self.index += 1;
        }
        self.page()
    }

    /// Move one page back; stays put on the first page
    pub fn previous(&mut self) -> Result<&Page, AppError> {
        self.ensure_active()?;
        self.touch();
        self.index = self.index.saturating_sub(1);
        self.page()
    }

    /// Button state for the current position
    pub fn controls(&mut self) -> PagerControls {
        if self.poll_expiry() {
            return PagerControls::disabled();
        }
        let last = self.pages.len().saturating_sub(1);
        PagerControls {
            previous_enabled: self.index > 0,
            next_enabled: self.index < last,
            regenerate_enabled: true,
        }
    }

    /// Regenerate the exchange and replace all pages
    ///
    /// On failure the old pages stay in place.
    pub async fn regenerate(
        &mut self,
        session: &SessionController,
        cancel: &CancellationToken,
    ) -> Result<&Page, AppError> {
        self.ensure_active()?;
        self.touch();

        let rendered = session.regenerate(&self.context, cancel).await?;
        self.pages = rendered.pages;
        self.index = 0;
        self.touch();

        info!(pager_id = %self.id, pages = self.pages.len(), "Pager regenerated");
        self.page()
    }
}

/// Tombstones are kept for this many idle timeouts after a sweep
pub const TOMBSTONE_RETENTION_FACTOR: u32 = 4;

/// Owns every live pager
///
/// Pagers that were swept after their idle timeout leave a tombstone so that
/// later lookups report `Expired` rather than `NotFound`. Tombstones are
/// dropped once they are older than `TOMBSTONE_RETENTION_FACTOR` idle
/// timeouts.
#[derive(Debug)]
pub struct PagerManager {
    pagers: RwLock<HashMap<Uuid, Arc<Mutex<Pager>>>>,
    // Swept pager id -> instant it was swept
    expired: RwLock<HashMap<Uuid, Instant>>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl PagerManager {
    /// Create an empty manager
    pub fn new(idle_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pagers: RwLock::new(HashMap::new()),
            expired: RwLock::new(HashMap::new()),
            idle_timeout,
            clock,
        }
    }

    /// Build a pager for `pages` and register it
    pub async fn create(&self, pages: PageSet, context: ExchangeRequest) -> Arc<Mutex<Pager>> {
        let pager = Pager::new(pages, context, self.idle_timeout, self.clock.clone());
        self.insert(pager).await
    }

    /// Register an existing pager
    pub async fn insert(&self, pager: Pager) -> Arc<Mutex<Pager>> {
        let id = pager.id();
        let pager = Arc::new(Mutex::new(pager));
        self.pagers.write().await.insert(id, pager.clone());
        debug!(pager_id = %id, "Pager registered");
        pager
    }

    /// Look up a pager
    ///
    /// # Returns
    /// * `Err(AppError::Expired)` - pager was swept after its idle timeout
    /// * `Err(AppError::NotFound)` - pager id was never registered
    pub async fn get(&self, id: Uuid) -> Result<Arc<Mutex<Pager>>, AppError> {
        if let Some(pager) = self.pagers.read().await.get(&id) {
            return Ok(pager.clone());
        }
        if self.expired.read().await.contains_key(&id) {
            return Err(AppError::Expired(format!(
                "Pager {} has expired; start a new chat to continue.",
                id
            )));
        }
        Err(AppError::NotFound(format!("Pager {} not found", id)))
    }

    /// Number of live pagers
    pub async fn len(&self) -> usize {
        self.pagers.read().await.len()
    }

    /// Whether no pager is live
    pub async fn is_empty(&self) -> bool {
        self.pagers.read().await.is_empty()
    }

    /// Number of tombstones still held
    pub async fn tombstones(&self) -> usize {
        self.expired.read().await.len()
    }

    /// Remove pagers that have reached their idle timeout
    ///
    /// Pagers busy with a regenerate are skipped until the next sweep.
    /// Tombstones past their retention are pruned on every call.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let retention = self.idle_timeout * TOMBSTONE_RETENTION_FACTOR;

        let mut pagers = self.pagers.write().await;
        let swept: Vec<Uuid> = pagers
            .iter()
            .filter_map(|(id, pager)| {
                let mut pager = pager.try_lock().ok()?;
                pager.poll_expiry().then_some(*id)
            })
            .collect();

        let mut expired = self.expired.write().await;
        let before = expired.len();
        expired.retain(|_, swept_at| now.saturating_duration_since(*swept_at) < retention);
        let pruned = before - expired.len();
        if pruned > 0 {
            debug!(pruned = pruned, "Pruned pager tombstones");
        }

        if swept.is_empty() {
            return 0;
        }

        for id in &swept {
            pagers.remove(id);
            expired.insert(*id, now);
        }

        info!(swept = swept.len(), live = pagers.len(), "Swept idle pagers");
        swept.len()
    }

    /// Run `sweep_expired` every `interval` until `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Pager sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep_expired().await;
                    }
                }
            }
        })
    }
}
