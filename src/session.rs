//! One dashboard page session.
//!
//! `DashboardSession` is the single owner of the filter, both reconcilers,
//! in-flight requests and flash timers. Everything runs on the task that
//! drives it: fetches are polled from a `FuturesUnordered`, flash expiries come
//! out of a `DelayQueue`, and the poll interval ticks alongside them.

use crate::config::DashboardConfig;
use crate::errors::FetchError;
use crate::fetcher::SnapshotSource;
use crate::filter::{CourseSelector, FilterChange, FilterController, FilterState};
use crate::generation::{Generation, GenerationGate};
use crate::location::QueryStore;
use crate::missing::{FlashToken, ListPatch, MissingListReconciler};
use crate::models::{LineCatalog, MissingEntryRecord, RouteKey, VehicleSnapshotRecord};
use crate::poll::PollScheduler;
use crate::render::{RenderSurface, Stream};
use crate::vehicles::VehicleReconciler;
use ahash::{AHashMap, AHashSet};
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::time::{DelayQueue, delay_queue};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    SelectLine(String),
    SelectCourse(String),
    Refresh,
    Report,
    Shutdown,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Lines(Result<Vec<String>, FetchError>),
    Courses {
        line: String,
        generation: Generation,
        result: Result<Vec<String>, FetchError>,
    },
    Vehicles {
        generation: Generation,
        result: Result<Vec<VehicleSnapshotRecord>, FetchError>,
    },
    Missing {
        generation: Generation,
        result: Result<Vec<MissingEntryRecord>, FetchError>,
    },
}

#[derive(Debug)]
pub enum SessionEvent {
    Tick(u64),
    Fetched(FetchOutcome),
    FlashExpired { key: RouteKey, token: FlashToken },
}

pub struct DashboardSession<S, R, Q> {
    source: S,
    surface: R,
    location: Q,
    filter: FilterController,
    vehicles: VehicleReconciler,
    missing: MissingListReconciler,
    line_catalog: LineCatalog,
    lines: Option<Vec<String>>,
    lines_in_flight: bool,
    course_gate: GenerationGate,
    vehicle_gate: GenerationGate,
    missing_gate: GenerationGate,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, FetchOutcome>>,
    flashes: DelayQueue<(RouteKey, FlashToken)>,
    flash_keys: AHashMap<RouteKey, (FlashToken, delay_queue::Key)>,
    flash_duration: Duration,
    stale: AHashSet<Stream>,
    scheduler: PollScheduler,
    refreshes: u64,
}

impl<S, R, Q> DashboardSession<S, R, Q>
where
    S: SnapshotSource + Clone + 'static,
    R: RenderSurface,
    Q: QueryStore,
{
    /// Seeds the filter from the address and queues the start-up fetches.
    /// Nothing goes over the network until the session is polled.
    pub fn new(config: &DashboardConfig, source: S, surface: R, location: Q) -> Self {
        let (filter, change) = FilterController::init_from_url(&location.read());

        tracing::info!(
            line = ?filter.state().line(),
            course = ?filter.state().course(),
            "session starting"
        );

        let mut session = Self {
            source,
            surface,
            location,
            filter,
            vehicles: VehicleReconciler::new(),
            missing: MissingListReconciler::new(),
            line_catalog: config.line_catalog,
            lines: None,
            lines_in_flight: false,
            course_gate: GenerationGate::new(),
            vehicle_gate: GenerationGate::new(),
            missing_gate: GenerationGate::new(),
            in_flight: FuturesUnordered::new(),
            flashes: DelayQueue::new(),
            flash_keys: AHashMap::new(),
            flash_duration: config.flash_duration,
            stale: AHashSet::new(),
            scheduler: PollScheduler::new(config.poll_interval),
            refreshes: 0,
        };

        session.request_lines();
        session.follow_up(change);
        session.publish_selectors();
        session.refresh();
        session
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    pub fn location(&self) -> &Q {
        &self.location
    }

    pub fn filter(&self) -> &FilterState {
        self.filter.state()
    }

    pub fn course_selector(&self) -> &CourseSelector {
        self.filter.selector()
    }

    pub fn vehicles(&self) -> &VehicleReconciler {
        &self.vehicles
    }

    pub fn missing(&self) -> &MissingListReconciler {
        &self.missing
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_flashes(&self) -> usize {
        self.flashes.len()
    }

    pub fn select_line(&mut self, line: &str) {
        let change = self.filter.set_line(line);
        self.after_filter_change(change);
    }

    pub fn select_course(&mut self, course: &str) {
        if let Some(change) = self.filter.set_course(course) {
            self.after_filter_change(change);
        }
    }

    fn after_filter_change(&mut self, change: FilterChange) {
        self.location.push(&self.filter.state().persisted());

        // responses computed for the previous selection must not land
        self.vehicle_gate.invalidate();
        self.missing_gate.invalidate();

        self.follow_up(change);

        if *self.filter.selector() == CourseSelector::Hidden {
            // no line, so no course list can be pending or stale
            self.course_gate.invalidate();
            self.mark_stale(Stream::Courses, false);
        }

        self.publish_selectors();
        self.refresh();
    }

    fn follow_up(&mut self, change: FilterChange) {
        if let Some(line) = change.fetch_courses_for {
            self.course_gate.invalidate();
            self.request_courses(line);
        }
    }

    /// One refresh cycle: a vehicle snapshot and a missing-course snapshot,
    /// both for the selection as it is right now.
    pub fn refresh(&mut self) {
        self.refreshes += 1;

        tracing::debug!(
            refresh = self.refreshes,
            line = ?self.filter.state().line(),
            course = ?self.filter.state().course(),
            "refresh cycle"
        );

        self.request_vehicles();
        self.request_missing();
    }

    fn request_lines(&mut self) {
        let source = self.source.clone();
        let catalog = self.line_catalog;
        self.lines_in_flight = true;
        self.in_flight.push(Box::pin(async move {
            FetchOutcome::Lines(source.lines(catalog).await)
        }));
    }

    fn request_courses(&mut self, line: String) {
        let generation = self.course_gate.issue();
        let source = self.source.clone();
        self.in_flight.push(Box::pin(async move {
            let result = source.courses(&line).await;
            FetchOutcome::Courses {
                line,
                generation,
                result,
            }
        }));
    }

    fn request_vehicles(&mut self) {
        let generation = self.vehicle_gate.issue();
        let query = self.filter.state().vehicle_query();
        let source = self.source.clone();
        self.in_flight.push(Box::pin(async move {
            let result = source.vehicles(&query).await;
            FetchOutcome::Vehicles { generation, result }
        }));
    }

    fn request_missing(&mut self) {
        let generation = self.missing_gate.issue();
        let line = self.filter.state().line().map(str::to_string);
        let source = self.source.clone();
        self.in_flight.push(Box::pin(async move {
            let result = source.missing_courses(line.as_deref()).await;
            FetchOutcome::Missing { generation, result }
        }));
    }

    fn publish_selectors(&mut self) {
        let state = self.filter.state();
        self.surface
            .set_line_options(self.lines.as_deref().unwrap_or(&[]), state.line());
        self.surface
            .set_course_selector(self.filter.selector(), state.course());
    }

    fn mark_stale(&mut self, stream: Stream, stale: bool) {
        let changed = if stale {
            self.stale.insert(stream)
        } else {
            self.stale.remove(&stream)
        };
        if changed {
            self.surface.set_stale(stream, stale);
        }
    }

    fn report_failure(&mut self, stream: Stream, error: &FetchError) {
        tracing::warn!(
            ?stream,
            endpoint = error.endpoint(),
            timeout = error.is_timeout(),
            error = %error,
            "fetch failed, keeping previous data"
        );
        self.mark_stale(stream, true);
    }

    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::select! {
            Some(outcome) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                SessionEvent::Fetched(outcome)
            }
            Some(expired) = std::future::poll_fn(|cx| self.flashes.poll_expired(cx)), if !self.flashes.is_empty() => {
                let (key, token) = expired.into_inner();
                SessionEvent::FlashExpired { key, token }
            }
            tick = self.scheduler.tick() => SessionEvent::Tick(tick),
        }
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SelectLine(line) => self.select_line(&line),
            SessionCommand::SelectCourse(course) => self.select_course(&course),
            SessionCommand::Refresh => self.refresh(),
            SessionCommand::Report => self.report(),
            SessionCommand::Shutdown => {}
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Tick(tick) => self.on_tick(tick),
            SessionEvent::Fetched(outcome) => self.on_fetched(outcome),
            SessionEvent::FlashExpired { key, token } => self.on_flash_expired(key, token),
        }
    }

    fn on_tick(&mut self, tick: u64) {
        tracing::debug!(tick, "poll tick");

        if self.lines.is_none() && !self.lines_in_flight {
            self.request_lines();
        }

        // a failed course list is retried while its line is still selected
        let retry_courses = match self.filter.selector() {
            CourseSelector::Loading { line } if self.course_gate.outstanding() == 0 => {
                Some(line.clone())
            }
            _ => None,
        };
        if let Some(line) = retry_courses {
            self.request_courses(line);
        }

        self.refresh();
    }

    fn on_fetched(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Lines(result) => {
                self.lines_in_flight = false;
                match result {
                    Ok(lines) => {
                        tracing::debug!(lines = lines.len(), "line list loaded");
                        self.lines = Some(lines);
                        self.mark_stale(Stream::Lines, false);
                        self.publish_selectors();
                    }
                    Err(error) => self.report_failure(Stream::Lines, &error),
                }
            }
            FetchOutcome::Courses {
                line,
                generation,
                result,
            } => {
                if !self.course_gate.admit(generation) {
                    tracing::debug!(line = %line, "discarding superseded course list");
                    return;
                }
                match result {
                    Ok(courses) => {
                        self.mark_stale(Stream::Courses, false);
                        if self.filter.courses_loaded(&line, courses) {
                            self.publish_selectors();
                        } else {
                            tracing::debug!(line = %line, "course list for a line no longer selected");
                        }
                    }
                    Err(error) => {
                        let pending = matches!(
                            self.filter.selector(),
                            CourseSelector::Loading { line: pending } if *pending == line
                        );
                        if pending {
                            self.report_failure(Stream::Courses, &error);
                        } else {
                            tracing::debug!(line = %line, "ignoring course failure for a line no longer selected");
                        }
                    }
                }
            }
            FetchOutcome::Vehicles { generation, result } => {
                if !self.vehicle_gate.admit(generation) {
                    tracing::debug!(generation = generation.get(), "discarding superseded vehicle snapshot");
                    return;
                }
                match result {
                    Ok(snapshot) => {
                        let ops = self.vehicles.reconcile(&snapshot);
                        self.surface.apply_markers(&ops);
                        self.mark_stale(Stream::Vehicles, false);
                        tracing::debug!(vehicles = self.vehicles.len(), "vehicle layer replaced");
                    }
                    Err(error) => self.report_failure(Stream::Vehicles, &error),
                }
            }
            FetchOutcome::Missing { generation, result } => {
                if !self.missing_gate.admit(generation) {
                    tracing::debug!(generation = generation.get(), "discarding superseded missing list");
                    return;
                }
                match result {
                    Ok(snapshot) => {
                        let patch = self.missing.reconcile(&snapshot);
                        self.apply_list_patch(patch);
                        self.mark_stale(Stream::Missing, false);
                    }
                    Err(error) => self.report_failure(Stream::Missing, &error),
                }
            }
        }
    }

    fn apply_list_patch(&mut self, patch: ListPatch) {
        self.surface.apply_entries(&patch.ops);

        for key in patch.disarmed {
            self.cancel_flash(&key);
        }

        for (key, token) in patch.armed {
            // re-arming always starts the full duration again
            self.cancel_flash(&key);
            let queue_key = self
                .flashes
                .insert((key.clone(), token), self.flash_duration);
            self.flash_keys.insert(key, (token, queue_key));
        }
    }

    fn cancel_flash(&mut self, key: &RouteKey) {
        if let Some((_, queue_key)) = self.flash_keys.remove(key) {
            self.flashes.try_remove(&queue_key);
        }
    }

    fn on_flash_expired(&mut self, key: RouteKey, token: FlashToken) {
        if matches!(self.flash_keys.get(&key), Some((current, _)) if *current == token) {
            self.flash_keys.remove(&key);
        }

        if let Some(op) = self.missing.expire_flash(&key, token) {
            self.surface.apply_entries(&[op]);
        }
    }

    fn report(&self) {
        tracing::info!(
            line = ?self.filter.state().line(),
            course = ?self.filter.state().course(),
            course_selector_visible = self.filter.selector().is_visible(),
            lines_loaded = ?self.lines.as_ref().map(Vec::len),
            markers = self.vehicles.len(),
            missing = self.missing.len(),
            flashing = self.flashes.len(),
            in_flight = self.in_flight.len(),
            refreshes = self.refreshes,
            stale = ?self.stale,
            "dashboard status"
        );
    }

    /// Waits for every outstanding fetch and applies it.
    pub async fn settle(&mut self) {
        while let Some(outcome) = self.in_flight.next().await {
            self.on_fetched(outcome);
        }
    }

    /// Runs until `Shutdown` arrives or every command sender is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) -> Self {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.next_event() => self.handle_event(event),
            }
        }

        tracing::info!(refreshes = self.refreshes, "session closed");
        self
    }
}
