// Reminder scheduler engine
//
// Owns the live timer derived from the persisted scheduler settings and
// drives the daily batch: select members due at the configured lead time,
// dedup against the delivery ledger, send through the gateway, record the
// outcome. Configuration changes re-arm the timer without a restart.

use crate::config::SchedulerConfig;
use crate::db::repositories::{DeliveryLedger, MemberStore, SettingsStore};
use crate::errors::{ConfigurationError, SchedulerError};
use crate::gateway::MessageGateway;
use crate::message::render_reminder;
use crate::models::{
    DeliveryRecord, DeliveryStatus, Member, RunSummary, SchedulerSettings, SchedulerStatus,
    SettingsUpdate, TriggerSource,
};
use crate::schedule::default_timezone;
use crate::telemetry;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Static engine configuration, fixed at process start
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timezone the daily trigger is evaluated in
    pub timezone: Tz,
    /// Pause between consecutive sends, so the gateway is not flooded
    pub send_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            send_delay: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Build from the process-level scheduler configuration section
    pub fn from_settings(config: &SchedulerConfig) -> Result<Self, ConfigurationError> {
        let timezone = config
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigurationError::InvalidTimezone(config.timezone.clone()))?;

        Ok(Self {
            timezone,
            send_delay: Duration::from_millis(config.send_delay_ms),
        })
    }
}

/// The settings snapshot and timer handle, mutated only under one lock so
/// cancel-then-reschedule is atomic with respect to other re-arm calls
struct ArmState {
    settings: SchedulerSettings,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    config: EngineConfig,
    settings_store: Arc<dyn SettingsStore>,
    members: Arc<dyn MemberStore>,
    ledger: Arc<dyn DeliveryLedger>,
    gateway: Arc<dyn MessageGateway>,
    state: Mutex<ArmState>,
    run_lock: Mutex<()>,
}

/// The reminder scheduler engine
///
/// Two states per process: stopped (no timer task) and armed (a timer task
/// sleeps until the next daily fire). Batches triggered by the timer and
/// batches triggered manually go through the same batch routine, serialized
/// by a run-level lock so two batches can never race the dedup check.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    pub fn new(
        config: EngineConfig,
        settings_store: Arc<dyn SettingsStore>,
        members: Arc<dyn MemberStore>,
        ledger: Arc<dyn DeliveryLedger>,
        gateway: Arc<dyn MessageGateway>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                settings_store,
                members,
                ledger,
                gateway,
                state: Mutex::new(ArmState {
                    settings: SchedulerSettings::system_default(),
                    timer: None,
                }),
                run_lock: Mutex::new(()),
            }),
        }
    }

    /// Load the current settings and arm the timer when enabled
    ///
    /// A missing settings row is created from the system default; a failed
    /// load falls back to the in-memory default with a warning. The
    /// scheduler never refuses to start over its own configuration.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        let settings = match self.inner.settings_store.find_current().await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let default = SchedulerSettings::system_default();
                match self.inner.settings_store.save(default.clone()).await {
                    Ok(saved) => saved,
                    Err(e) => {
                        warn!(error = %e, "Could not persist default settings, using in-memory default");
                        default
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to load scheduler settings, using system default");
                SchedulerSettings::system_default()
            }
        };

        info!(
            fire_time = %settings.formatted_time(),
            enabled = settings.enabled,
            lead_days = settings.lead_days,
            "Scheduler initialized"
        );

        let mut state = self.inner.state.lock().await;
        state.settings = settings;
        Inner::rearm_locked(&self.inner, &mut state);
    }

    /// Whether a timer task is currently armed
    pub async fn is_armed(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Snapshot of the current settings
    pub async fn current_settings(&self) -> SchedulerSettings {
        self.inner.state.lock().await.settings.clone()
    }

    /// Validate, persist, and apply new settings, re-arming the timer
    ///
    /// Rejected updates leave both the stored settings and the timer
    /// untouched.
    #[instrument(skip(self, update), fields(hour = update.hour, minute = update.minute, enabled = update.enabled))]
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<SchedulerSettings, SchedulerError> {
        let mut state = self.inner.state.lock().await;

        let updated = update.apply_to(&state.settings)?;
        let persisted = self
            .inner
            .settings_store
            .save(updated)
            .await
            .map_err(SchedulerError::SettingsPersistenceFailed)?;

        state.settings = persisted.clone();
        Inner::rearm_locked(&self.inner, &mut state);

        info!(
            fire_time = %persisted.formatted_time(),
            enabled = persisted.enabled,
            modified_by = %persisted.modified_by,
            "Scheduler settings updated"
        );
        Ok(persisted)
    }

    /// Enable or disable the scheduled daily run
    #[instrument(skip(self))]
    pub async fn set_enabled(
        &self,
        enabled: bool,
        modified_by: &str,
    ) -> Result<SchedulerSettings, SchedulerError> {
        let mut state = self.inner.state.lock().await;

        let mut settings = state.settings.clone();
        settings.enabled = enabled;
        settings.last_modified = Utc::now();
        settings.modified_by = modified_by.to_string();

        let persisted = self
            .inner
            .settings_store
            .save(settings)
            .await
            .map_err(SchedulerError::SettingsPersistenceFailed)?;

        state.settings = persisted.clone();
        Inner::rearm_locked(&self.inner, &mut state);

        info!(enabled = enabled, modified_by = modified_by, "Scheduler toggled");
        Ok(persisted)
    }

    /// Operator-visible status, including the derived cron expression and
    /// how many members are due at the configured lead time
    pub async fn status(&self) -> Result<SchedulerStatus, SchedulerError> {
        let settings = self.current_settings().await;
        let fire_time = settings.fire_time()?;

        let target = self.inner.target_date(&settings);
        let due = self
            .inner
            .members
            .find_due_on(target)
            .await
            .map_err(SchedulerError::SelectionFailed)?;

        Ok(SchedulerStatus {
            enabled: settings.enabled,
            fire_time: fire_time.to_string(),
            cron_expression: fire_time.cron_expression(),
            lead_days: settings.lead_days,
            last_modified: settings.last_modified,
            modified_by: settings.modified_by,
            members_due_at_lead: due.len(),
        })
    }

    /// Run the batch immediately, independent of the timer and of the
    /// enabled flag
    pub async fn run_manual(&self) -> Result<RunSummary, SchedulerError> {
        info!("Manual reminder run requested");
        self.inner.run_batch(TriggerSource::Manual).await
    }

    /// Run one batch with the given trigger source
    pub async fn run_batch(&self, source: TriggerSource) -> Result<RunSummary, SchedulerError> {
        self.inner.run_batch(source).await
    }

    /// Cancel the pending timer; an in-flight batch completes on its own
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        info!("Scheduler stopped");
    }
}

impl Inner {
    /// Cancel the pending timer and arm a new one for the current settings.
    /// Called with the state lock held, so cancel + reschedule is one
    /// critical section. Never touches an in-flight batch: fired batches
    /// run on their own task.
    fn rearm_locked(this: &Arc<Inner>, state: &mut ArmState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
            info!("Pending timer cancelled");
        }

        if !state.settings.enabled {
            info!("Scheduler disabled, timer not armed");
            return;
        }

        let fire_time = match state.settings.fire_time() {
            Ok(fire_time) => fire_time,
            Err(e) => {
                // Settings are validated on every write, so this only
                // happens if the row was edited out-of-band
                error!(error = %e, "Stored settings have an invalid fire time, timer not armed");
                return;
            }
        };

        let timezone = this.config.timezone;
        let inner = Arc::clone(this);

        state.timer = Some(tokio::spawn(async move {
            loop {
                let next = match fire_time.next_occurrence(Utc::now(), timezone) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(error = %e, "Could not compute next fire, timer stopping");
                        break;
                    }
                };

                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                info!(next_fire = %next, "Sleeping until next daily run");
                tokio::time::sleep(wait).await;

                // The batch runs on its own task so that a re-arm or stop
                // aborting this loop never interrupts an in-flight batch
                let batch_inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    if let Err(e) = batch_inner.run_batch(TriggerSource::Scheduled).await {
                        error!(error = %e, "Scheduled reminder batch failed");
                    }
                });
            }
        }));

        info!(
            fire_time = %fire_time,
            cron = %fire_time.cron_expression(),
            timezone = %timezone,
            "Timer armed"
        );
    }

    /// The due date targeted by today's run: today plus lead days, in the
    /// scheduler's timezone
    fn target_date(&self, settings: &SchedulerSettings) -> chrono::NaiveDate {
        let today = Utc::now().with_timezone(&self.config.timezone).date_naive();
        today + chrono::Duration::days(settings.lead_days.max(0) as i64)
    }

    /// One full reminder batch: select, dedup-check, send, record, tally
    ///
    /// Per-member gateway failures are isolated and recorded; a store or
    /// ledger failure aborts the remaining batch because continuing without
    /// the dedup check could double-send.
    #[instrument(skip(self), fields(source = %source))]
    async fn run_batch(&self, source: TriggerSource) -> Result<RunSummary, SchedulerError> {
        let _run_guard = self.run_lock.lock().await;

        let settings = self.state.lock().await.settings.clone();
        let mut summary = RunSummary::new(source);

        if !settings.enabled {
            match source {
                TriggerSource::Scheduled => {
                    info!("Scheduler disabled, skipping scheduled run");
                    return Ok(summary);
                }
                TriggerSource::Manual => {
                    info!("Scheduler disabled, but manual run proceeding");
                }
            }
        }

        let target = self.target_date(&settings);
        let members = self
            .members
            .find_due_on(target)
            .await
            .map_err(SchedulerError::SelectionFailed)?;

        summary.total = members.len();
        info!(
            target_date = %target,
            members = members.len(),
            lead_days = settings.lead_days,
            "Starting reminder batch"
        );

        for (index, member) in members.iter().enumerate() {
            let reference_due_date = member.due_date;

            let already_sent = self
                .ledger
                .success_exists(member.id, reference_due_date)
                .await
                .map_err(SchedulerError::LedgerFailed)?;

            if already_sent {
                info!(
                    member = %member.full_name(),
                    reference_due_date = %reference_due_date,
                    "Reminder already delivered for this due date, skipping"
                );
                summary.skipped += 1;
                continue;
            }

            let record = self.send_reminder(member).await;
            let record = self
                .ledger
                .append(record)
                .await
                .map_err(SchedulerError::LedgerFailed)?;

            match record.status {
                DeliveryStatus::Success => {
                    summary.sent += 1;
                    info!(
                        member = %member.full_name(),
                        destination = %record.destination,
                        external_id = record.external_id.as_deref().unwrap_or(""),
                        "Reminder delivered"
                    );
                }
                _ => {
                    summary.failed += 1;
                    error!(
                        member = %member.full_name(),
                        error = record.error.as_deref().unwrap_or("unknown"),
                        "Reminder delivery failed"
                    );
                }
            }

            if index + 1 < members.len() && !self.config.send_delay.is_zero() {
                tokio::time::sleep(self.config.send_delay).await;
            }
        }

        info!(
            total = summary.total,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            "Reminder batch finished"
        );
        telemetry::record_run_summary(&summary);

        Ok(summary)
    }

    /// Render and send one reminder, resolving the delivery record either
    /// way; gateway errors end up in the record, never out of this function
    async fn send_reminder(&self, member: &Member) -> DeliveryRecord {
        let message = render_reminder(member);
        let record = DeliveryRecord::pending(member, message.clone(), member.due_date);

        match self.gateway.send_message(&member.phone, &message).await {
            Ok(external_id) => record.succeeded(external_id),
            Err(e) => record.failed(e.to_string()),
        }
    }
}
