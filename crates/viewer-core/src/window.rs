//! Sliding-window page cache.
//!
//! [`PageWindowManager`] decides which pages of a document are resident. Given a
//! current page `n` and a radius `R`, the window is `[max(1, n-R), min(page_count, n+R)]`.
//! Pages entering the window are scheduled in ascending order, pages leaving it are
//! evicted, and every render is stamped with the [`RenderEpoch`] it was issued under so
//! that results from a previous scale or rotation are discarded on arrival.
//!
//! The manager performs no I/O. Callers pull [`RenderTicket`]s with
//! [`PageWindowManager::next_dispatch`], render them elsewhere, and hand the results
//! back through [`PageWindowManager::commit`]. It is the only writer of the cache.
//!
//! # Example
//!
//! ```
//! use viewer_core::{PageWindowManager, PageView};
//!
//! let mut pages = PageWindowManager::new(10, 2);
//! let update = pages.set_current_page(1);
//! assert_eq!(update.scheduled, vec![1, 2, 3]);
//!
//! let ticket = pages.next_dispatch().expect("page 1 is pending");
//! assert_eq!(ticket.page, 1);
//! assert!(matches!(pages.page(1), PageView::Rendering));
//! ```

use crate::document::PageNumber;
use crate::render::{RenderCompletion, RenderError, Surface};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::{debug, warn};

/// Version stamp bumped on every scale or rotation change.
pub type RenderEpoch = u64;

/// The contiguous range of pages that should be resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub current_page: PageNumber,
    pub lower_bound: PageNumber,
    pub upper_bound: PageNumber,
}

impl WindowState {
    /// Computes the window around `current_page`, clamping it into the document.
    pub fn compute(current_page: PageNumber, page_count: u32, radius: u32) -> Self {
        let page_count = page_count.max(1);
        let current_page = current_page.clamp(1, page_count);
        Self {
            current_page,
            lower_bound: current_page.saturating_sub(radius).max(1),
            upper_bound: current_page.saturating_add(radius).min(page_count),
        }
    }

    pub fn contains(&self, page: PageNumber) -> bool {
        (self.lower_bound..=self.upper_bound).contains(&page)
    }

    pub fn pages(&self) -> RangeInclusive<PageNumber> {
        self.lower_bound..=self.upper_bound
    }

    pub fn page_span(&self) -> u32 {
        self.upper_bound - self.lower_bound + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    Pending,
    Rendering,
    Ready,
    Failed,
}

impl PageState {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// Identifies one dispatched render.
///
/// `id` is unique per manager, so a completion can only ever be committed into the
/// entry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTicket {
    pub page: PageNumber,
    pub epoch: RenderEpoch,
    pub id: u64,
}

/// Read-only view of a page slot.
#[derive(Debug, Clone, Copy)]
pub enum PageView<'a> {
    /// Not resident
    Absent,
    Pending,
    Rendering,
    Ready(&'a Surface),
    /// Placeholder; retried when the page re-enters the window
    Failed(&'a RenderError),
}

impl PageView<'_> {
    pub fn state(&self) -> Option<PageState> {
        match self {
            Self::Absent => None,
            Self::Pending => Some(PageState::Pending),
            Self::Rendering => Some(PageState::Rendering),
            Self::Ready(_) => Some(PageState::Ready),
            Self::Failed(_) => Some(PageState::Failed),
        }
    }
}

/// What a window move changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUpdate {
    pub window: WindowState,
    /// Newly scheduled pages, ascending
    pub scheduled: Vec<PageNumber>,
    /// Pages whose entries (and surfaces) were dropped
    pub evicted: Vec<PageNumber>,
}

impl WindowUpdate {
    pub fn is_noop(&self) -> bool {
        self.scheduled.is_empty() && self.evicted.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Failed,
    /// Issued under an earlier epoch
    DiscardedStale,
    /// The page left the window while rendering
    DiscardedEvicted,
    /// The entry is waiting for a different ticket
    DiscardedSuperseded,
}

impl CommitOutcome {
    pub fn is_discarded(self) -> bool {
        matches!(self, Self::DiscardedStale | Self::DiscardedEvicted | Self::DiscardedSuperseded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub page: PageNumber,
    pub outcome: CommitOutcome,
    /// Pinned pages evicted because the displayed page moved
    pub released: Vec<PageNumber>,
}

/// Counters for one manager's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub renders_issued: u64,
    pub commits: u64,
    pub failures: u64,
    pub evictions: u64,
    pub discarded_stale: u64,
    pub discarded_evicted: u64,
    pub discarded_superseded: u64,
    pub epoch_bumps: u64,
}

impl WindowStats {
    pub fn discarded(&self) -> u64 {
        self.discarded_stale + self.discarded_evicted + self.discarded_superseded
    }
}

#[derive(Debug)]
struct PageEntry {
    state: PageState,
    ticket: Option<u64>,
    surface: Option<Surface>,
    error: Option<RenderError>,
}

impl PageEntry {
    fn pending() -> Self {
        Self { state: PageState::Pending, ticket: None, surface: None, error: None }
    }
}

/// The per-document page cache.
///
/// # Invariants
///
/// - After settling, resident pages are exactly the window pages, plus the displayed
///   page while the new current page is still loading.
/// - No entry carries a surface from an epoch other than [`epoch`](Self::epoch).
/// - At most one surface is committed per page.
#[derive(Debug)]
pub struct PageWindowManager {
    page_count: u32,
    radius: u32,
    epoch: RenderEpoch,
    window: WindowState,
    displayed: Option<PageNumber>,
    entries: BTreeMap<PageNumber, PageEntry>,
    next_ticket: u64,
    stats: WindowStats,
}

impl PageWindowManager {
    /// Creates an empty cache for a document of `page_count` pages.
    ///
    /// Nothing is scheduled until the first [`set_current_page`](Self::set_current_page).
    pub fn new(page_count: u32, radius: u32) -> Self {
        Self {
            page_count: page_count.max(1),
            radius,
            epoch: 0,
            window: WindowState::compute(1, page_count, radius),
            displayed: None,
            entries: BTreeMap::new(),
            next_ticket: 0,
            stats: WindowStats::default(),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn epoch(&self) -> RenderEpoch {
        self.epoch
    }

    pub fn window(&self) -> WindowState {
        self.window
    }

    pub fn current_page(&self) -> PageNumber {
        self.window.current_page
    }

    /// The page the host is showing, if any has settled yet.
    pub fn displayed_page(&self) -> Option<PageNumber> {
        self.displayed
    }

    pub fn stats(&self) -> WindowStats {
        self.stats
    }

    /// Moves the window to `page` (clamped into the document).
    ///
    /// Newly covered pages become `Pending` in ascending order. Pages left behind are
    /// evicted, except the displayed page, which stays until the new current page has
    /// settled. Repeating the call for an unchanged window is a no-op.
    pub fn set_current_page(&mut self, page: PageNumber) -> WindowUpdate {
        let window = WindowState::compute(page, self.page_count, self.radius);
        self.window = window;

        let mut scheduled = Vec::new();
        for page in window.pages() {
            if !self.entries.contains_key(&page) {
                self.entries.insert(page, PageEntry::pending());
                scheduled.push(page);
            }
        }

        self.follow_current_page();
        let evicted = self.evict_outside_window();

        if !scheduled.is_empty() || !evicted.is_empty() {
            debug!(
                current = window.current_page,
                lower = window.lower_bound,
                upper = window.upper_bound,
                ?scheduled,
                ?evicted,
                "window moved"
            );
        }
        WindowUpdate { window, scheduled, evicted }
    }

    /// Starts a new epoch after a scale or rotation change.
    ///
    /// Every cached page is dropped, including the displayed one, since its raster no
    /// longer matches the render configuration. The current window is rescheduled under
    /// the new epoch and in-flight renders will be discarded when they complete.
    pub fn invalidate(&mut self) -> WindowUpdate {
        self.epoch += 1;
        self.stats.epoch_bumps += 1;

        let evicted: Vec<PageNumber> = self.entries.keys().copied().collect();
        self.stats.evictions += evicted.len() as u64;
        self.entries.clear();
        self.displayed = None;

        let window = self.window;
        let scheduled: Vec<PageNumber> = window.pages().collect();
        for &page in &scheduled {
            self.entries.insert(page, PageEntry::pending());
        }

        debug!(epoch = self.epoch, evicted = evicted.len(), "render epoch bumped");
        WindowUpdate { window, scheduled, evicted }
    }

    /// Promotes the lowest pending page to `Rendering` and returns its ticket.
    pub fn next_dispatch(&mut self) -> Option<RenderTicket> {
        let (&page, entry) =
            self.entries.iter_mut().find(|(_, entry)| entry.state == PageState::Pending)?;

        self.next_ticket += 1;
        entry.state = PageState::Rendering;
        entry.ticket = Some(self.next_ticket);
        self.stats.renders_issued += 1;

        Some(RenderTicket { page, epoch: self.epoch, id: self.next_ticket })
    }

    /// Applies a finished render.
    ///
    /// Results are only stored when their epoch is current and the page's entry is
    /// still waiting for that exact ticket; anything else is dropped.
    pub fn commit(&mut self, completion: RenderCompletion) -> CommitReport {
        let RenderCompletion { ticket, result } = completion;
        let page = ticket.page;

        let outcome = if ticket.epoch != self.epoch {
            self.stats.discarded_stale += 1;
            CommitOutcome::DiscardedStale
        } else {
            match self.entries.get_mut(&page) {
                None => {
                    self.stats.discarded_evicted += 1;
                    CommitOutcome::DiscardedEvicted
                }
                Some(entry)
                    if entry.state != PageState::Rendering || entry.ticket != Some(ticket.id) =>
                {
                    self.stats.discarded_superseded += 1;
                    CommitOutcome::DiscardedSuperseded
                }
                Some(entry) => match result {
                    Ok(surface) => {
                        debug_assert_eq!(surface.epoch, self.epoch);
                        entry.state = PageState::Ready;
                        entry.surface = Some(surface);
                        entry.error = None;
                        self.stats.commits += 1;
                        CommitOutcome::Committed
                    }
                    Err(err) => {
                        warn!(page, epoch = ticket.epoch, error = %err, "page render failed");
                        entry.state = PageState::Failed;
                        entry.surface = None;
                        entry.error = Some(err);
                        self.stats.failures += 1;
                        CommitOutcome::Failed
                    }
                },
            }
        };

        let released = if outcome.is_discarded() {
            debug!(page, epoch = ticket.epoch, ?outcome, "render result discarded");
            Vec::new()
        } else {
            self.follow_current_page();
            self.evict_outside_window()
        };

        CommitReport { page, outcome, released }
    }

    pub fn page(&self, page: PageNumber) -> PageView<'_> {
        match self.entries.get(&page) {
            None => PageView::Absent,
            Some(entry) => match entry.state {
                PageState::Pending => PageView::Pending,
                PageState::Rendering => PageView::Rendering,
                PageState::Ready => entry.surface.as_ref().map_or(PageView::Absent, PageView::Ready),
                PageState::Failed => entry.error.as_ref().map_or(PageView::Absent, PageView::Failed),
            },
        }
    }

    pub fn resident_pages(&self) -> Vec<PageNumber> {
        self.entries.keys().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.count_in(PageState::Pending)
    }

    pub fn rendering_count(&self) -> usize {
        self.count_in(PageState::Rendering)
    }

    /// True when no resident page is pending or rendering.
    pub fn is_settled(&self) -> bool {
        self.entries.values().all(|entry| entry.state.is_settled())
    }

    /// Bytes held by committed surfaces.
    pub fn memory_used(&self) -> usize {
        self.entries.values().filter_map(|entry| entry.surface.as_ref()).map(Surface::memory_size).sum()
    }

    /// Drops every entry. Returns how many were held.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.stats.evictions += count as u64;
        self.entries.clear();
        self.displayed = None;
        count
    }

    fn count_in(&self, state: PageState) -> usize {
        self.entries.values().filter(|entry| entry.state == state).count()
    }

    /// Switches the displayed page to the current page once it has settled.
    fn follow_current_page(&mut self) {
        let current = self.window.current_page;
        if self.displayed == Some(current) {
            return;
        }
        let settled = self.entries.get(&current).is_some_and(|entry| entry.state.is_settled());
        if settled {
            self.displayed = Some(current);
        }
    }

    fn evict_outside_window(&mut self) -> Vec<PageNumber> {
        let window = self.window;
        let displayed = self.displayed;
        let evicted: Vec<PageNumber> = self
            .entries
            .keys()
            .copied()
            .filter(|&page| !window.contains(page) && Some(page) != displayed)
            .collect();

        for page in &evicted {
            self.entries.remove(page);
        }
        self.stats.evictions += evicted.len() as u64;
        evicted
    }
}
