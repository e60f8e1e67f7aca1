// Behavior tests for the reminder scheduler engine
//
// The engine is exercised against in-memory stores and a scripted gateway,
// with the inter-send delay set to zero.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use common::db::repositories::{DeliveryLedger, MemberStore, SettingsStore};
use common::errors::{DatabaseError, GatewayError};
use common::gateway::MessageGateway;
use common::models::{
    DeliveryRecord, DeliveryStatus, Member, SchedulerSettings, SettingsUpdate, TriggerSource,
};
use common::schedule::default_timezone;
use common::scheduler::{EngineConfig, ReminderScheduler};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// In-memory test doubles
// ---------------------------------------------------------------------------

struct InMemoryMembers {
    members: Vec<Member>,
}

#[async_trait]
impl MemberStore for InMemoryMembers {
    async fn find_due_on(&self, date: NaiveDate) -> Result<Vec<Member>, DatabaseError> {
        Ok(self
            .members
            .iter()
            .filter(|m| m.active && m.due_date == date)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct InMemoryLedger {
    records: Mutex<Vec<DeliveryRecord>>,
    fail_reads: AtomicBool,
}

impl InMemoryLedger {
    async fn seed_success(&self, member_id: Uuid, reference_due_date: NaiveDate) {
        self.records.lock().await.push(DeliveryRecord {
            id: Uuid::new_v4(),
            member_id,
            sent_at: Utc::now(),
            destination: "59170000000".to_string(),
            message: "previous reminder".to_string(),
            status: DeliveryStatus::Success,
            error: None,
            external_id: Some("PREV-1".to_string()),
            reference_due_date,
        });
    }

    async fn success_count_for(&self, member_id: Uuid) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.member_id == member_id && r.status == DeliveryStatus::Success)
            .count()
    }
}

#[async_trait]
impl DeliveryLedger for InMemoryLedger {
    async fn success_exists(
        &self,
        member_id: Uuid,
        reference_due_date: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionFailed("ledger down".to_string()));
        }
        Ok(self.records.lock().await.iter().any(|r| {
            r.member_id == member_id
                && r.reference_due_date == reference_due_date
                && r.status == DeliveryStatus::Success
        }))
    }

    async fn append(&self, record: DeliveryRecord) -> Result<DeliveryRecord, DatabaseError> {
        self.records.lock().await.push(record.clone());
        Ok(record)
    }
}

#[derive(Default)]
struct InMemorySettings {
    current: Mutex<Option<SchedulerSettings>>,
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn find_current(&self) -> Result<Option<SchedulerSettings>, DatabaseError> {
        Ok(self.current.lock().await.clone())
    }

    async fn save(&self, settings: SchedulerSettings) -> Result<SchedulerSettings, DatabaseError> {
        *self.current.lock().await = Some(settings.clone());
        Ok(settings)
    }
}

/// Gateway double that can be scripted to fail for specific destinations
struct ScriptedGateway {
    connected: bool,
    failing_destinations: HashSet<String>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedGateway {
    fn connected() -> Self {
        Self {
            connected: true,
            failing_destinations: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn failing_for(destinations: &[&str]) -> Self {
        Self {
            connected: true,
            failing_destinations: destinations.iter().map(|s| s.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl MessageGateway for ScriptedGateway {
    async fn check_connection(&self) -> bool {
        self.connected
    }

    async fn send_message(&self, destination: &str, message: &str) -> Result<String, GatewayError> {
        if !self.connected {
            return Err(GatewayError::NotConnected {
                qr_url: "http://localhost:3000/qr".to_string(),
            });
        }
        if self.failing_destinations.contains(destination) {
            return Err(GatewayError::Transport("simulated timeout".to_string()));
        }
        let mut sent = self.sent.lock().await;
        sent.push((destination.to_string(), message.to_string()));
        Ok(format!("MSG-{}", sent.len()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn member_due_on(name: &str, phone: &str, due_date: NaiveDate) -> Member {
    Member {
        id: Uuid::new_v4(),
        first_name: name.to_string(),
        last_name: "Flores".to_string(),
        member_number: format!("SOC-{}", phone),
        email: format!("{}@example.com", name.to_lowercase()),
        phone: phone.to_string(),
        due_date,
        active: true,
        created_at: Utc::now(),
    }
}

/// The date the batch targets with lead_days = 1: tomorrow in the
/// scheduler's timezone
fn tomorrow() -> NaiveDate {
    Utc::now().with_timezone(&default_timezone()).date_naive() + chrono::Duration::days(1)
}

fn test_engine_config() -> EngineConfig {
    EngineConfig {
        timezone: default_timezone(),
        send_delay: Duration::ZERO,
    }
}

struct Harness {
    scheduler: ReminderScheduler,
    ledger: Arc<InMemoryLedger>,
    gateway: Arc<ScriptedGateway>,
    settings_store: Arc<InMemorySettings>,
}

fn build_harness(members: Vec<Member>, gateway: ScriptedGateway) -> Harness {
    let ledger = Arc::new(InMemoryLedger::default());
    let gateway = Arc::new(gateway);
    let settings_store = Arc::new(InMemorySettings::default());

    let scheduler = ReminderScheduler::new(
        test_engine_config(),
        settings_store.clone(),
        Arc::new(InMemoryMembers { members }),
        ledger.clone(),
        gateway.clone(),
    );

    Harness {
        scheduler,
        ledger,
        gateway,
        settings_store,
    }
}

// ---------------------------------------------------------------------------
// Batch behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idempotency_skips_members_with_existing_success() {
    let member = member_due_on("Ana", "59171111111", tomorrow());
    let harness = build_harness(vec![member.clone()], ScriptedGateway::connected());
    harness.scheduler.initialize().await;

    harness.ledger.seed_success(member.id, member.due_date).await;

    let summary = harness.scheduler.run_manual().await.unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.failed, 0);
    // No second gateway call and no second success record
    assert_eq!(harness.gateway.sent_count().await, 0);
    assert_eq!(harness.ledger.success_count_for(member.id).await, 1);
}

#[tokio::test]
async fn partial_failure_is_isolated_per_member() {
    let failing = member_due_on("Ana", "59171111111", tomorrow());
    let succeeding = member_due_on("Bruno", "59172222222", tomorrow());
    let harness = build_harness(
        vec![failing.clone(), succeeding.clone()],
        ScriptedGateway::failing_for(&["59171111111"]),
    );
    harness.scheduler.initialize().await;

    let summary = harness.scheduler.run_manual().await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);

    // Both members got a record, with the right outcome each
    let records = harness.ledger.records.lock().await;
    let failed_record = records.iter().find(|r| r.member_id == failing.id).unwrap();
    assert_eq!(failed_record.status, DeliveryStatus::Failure);
    assert!(failed_record.error.as_deref().unwrap().contains("timeout"));
    assert!(failed_record.external_id.is_none());

    let sent_record = records.iter().find(|r| r.member_id == succeeding.id).unwrap();
    assert_eq!(sent_record.status, DeliveryStatus::Success);
    assert!(sent_record.external_id.is_some());
    assert!(sent_record.error.is_none());
}

#[tokio::test]
async fn lead_time_selects_exactly_the_target_date() {
    let due_today = member_due_on("Hoy", "59170000001", tomorrow() - chrono::Duration::days(1));
    let due_tomorrow = member_due_on("Manana", "59170000002", tomorrow());
    let due_later = member_due_on("Pasado", "59170000003", tomorrow() + chrono::Duration::days(1));
    let harness = build_harness(
        vec![due_today, due_tomorrow.clone(), due_later],
        ScriptedGateway::connected(),
    );
    harness.scheduler.initialize().await;

    let summary = harness.scheduler.run_manual().await.unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.sent, 1);
    let records = harness.ledger.records.lock().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].member_id, due_tomorrow.id);
    assert_eq!(records[0].reference_due_date, due_tomorrow.due_date);
}

#[tokio::test]
async fn inactive_members_are_never_selected() {
    let mut inactive = member_due_on("Inactivo", "59170000009", tomorrow());
    inactive.active = false;
    let harness = build_harness(vec![inactive], ScriptedGateway::connected());
    harness.scheduler.initialize().await;

    let summary = harness.scheduler.run_manual().await.unwrap();
    assert_eq!(summary.total, 0);
    assert_eq!(harness.gateway.sent_count().await, 0);
}

#[tokio::test]
async fn disabled_scheduler_skips_scheduled_run_but_manual_proceeds() {
    let member = member_due_on("Ana", "59171111111", tomorrow());
    let harness = build_harness(vec![member.clone()], ScriptedGateway::connected());
    harness.scheduler.initialize().await;
    harness.scheduler.set_enabled(false, "operator").await.unwrap();

    // A scheduled fire while disabled does nothing
    let scheduled = harness
        .scheduler
        .run_batch(TriggerSource::Scheduled)
        .await
        .unwrap();
    assert_eq!(scheduled.total, 0);
    assert_eq!(harness.gateway.sent_count().await, 0);

    // A manual run still sends and records
    let manual = harness.scheduler.run_manual().await.unwrap();
    assert_eq!(manual.total, 1);
    assert_eq!(manual.sent, 1);
    assert_eq!(harness.ledger.success_count_for(member.id).await, 1);
}

#[tokio::test]
async fn gateway_outage_records_failures_for_whole_batch() {
    let member = member_due_on("Ana", "59171111111", tomorrow());
    let gateway = ScriptedGateway {
        connected: false,
        failing_destinations: HashSet::new(),
        sent: Mutex::new(Vec::new()),
    };
    let harness = build_harness(vec![member.clone()], gateway);
    harness.scheduler.initialize().await;

    let summary = harness.scheduler.run_manual().await.unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.failed, 1);
    let records = harness.ledger.records.lock().await;
    assert_eq!(records[0].status, DeliveryStatus::Failure);
    assert!(records[0].error.as_deref().unwrap().contains("not connected"));
}

#[tokio::test]
async fn ledger_failure_aborts_the_batch() {
    let member = member_due_on("Ana", "59171111111", tomorrow());
    let harness = build_harness(vec![member], ScriptedGateway::connected());
    harness.scheduler.initialize().await;

    harness.ledger.fail_reads.store(true, Ordering::SeqCst);

    let result = harness.scheduler.run_manual().await;
    assert!(result.is_err());
    // Without a working dedup check nothing may be sent
    assert_eq!(harness.gateway.sent_count().await, 0);
}

// ---------------------------------------------------------------------------
// Settings and timer state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_creates_and_persists_default_settings() {
    let harness = build_harness(Vec::new(), ScriptedGateway::connected());
    harness.scheduler.initialize().await;

    let stored = harness.settings_store.find_current().await.unwrap().unwrap();
    assert!(stored.enabled);
    assert_eq!(stored.hour, 9);
    assert_eq!(stored.minute, 0);
    assert_eq!(stored.lead_days, 1);
    assert!(harness.scheduler.is_armed().await);
}

#[tokio::test]
async fn update_rearms_timer_with_new_fire_time() {
    let harness = build_harness(Vec::new(), ScriptedGateway::connected());
    harness.scheduler.initialize().await;
    assert!(harness.scheduler.is_armed().await);

    let update = SettingsUpdate {
        hour: 14,
        minute: 0,
        enabled: true,
        lead_days: None,
        modified_by: Some("admin".to_string()),
    };
    let updated = harness.scheduler.update_settings(update).await.unwrap();

    assert_eq!(updated.hour, 14);
    assert!(harness.scheduler.is_armed().await);

    let current = harness.scheduler.current_settings().await;
    assert_eq!(current.hour, 14);
    assert_eq!(current.fire_time().unwrap().cron_expression(), "0 0 14 * * *");
}

#[tokio::test]
async fn disabling_cancels_the_pending_timer() {
    let harness = build_harness(Vec::new(), ScriptedGateway::connected());
    harness.scheduler.initialize().await;
    assert!(harness.scheduler.is_armed().await);

    harness.scheduler.set_enabled(false, "operator").await.unwrap();
    assert!(!harness.scheduler.is_armed().await);

    harness.scheduler.set_enabled(true, "operator").await.unwrap();
    assert!(harness.scheduler.is_armed().await);
}

#[tokio::test]
async fn invalid_update_changes_nothing() {
    let harness = build_harness(Vec::new(), ScriptedGateway::connected());
    harness.scheduler.initialize().await;
    let before = harness.scheduler.current_settings().await;

    for (hour, minute) in [(24, 0), (-1, 0), (9, 60), (9, -1)] {
        let update = SettingsUpdate {
            hour,
            minute,
            enabled: true,
            lead_days: None,
            modified_by: None,
        };
        assert!(harness.scheduler.update_settings(update).await.is_err());
    }

    let after = harness.scheduler.current_settings().await;
    assert_eq!(after.hour, before.hour);
    assert_eq!(after.minute, before.minute);
    let stored = harness.settings_store.find_current().await.unwrap().unwrap();
    assert_eq!(stored.hour, before.hour);
    assert!(harness.scheduler.is_armed().await);
}

#[tokio::test]
async fn status_reports_cron_expression_and_due_count() {
    let member = member_due_on("Ana", "59171111111", tomorrow());
    let harness = build_harness(vec![member], ScriptedGateway::connected());
    harness.scheduler.initialize().await;

    let update = SettingsUpdate {
        hour: 9,
        minute: 30,
        enabled: true,
        lead_days: Some(1),
        modified_by: Some("admin".to_string()),
    };
    harness.scheduler.update_settings(update).await.unwrap();

    let status = harness.scheduler.status().await.unwrap();
    assert!(status.enabled);
    assert_eq!(status.fire_time, "09:30");
    assert_eq!(status.cron_expression, "0 30 9 * * *");
    assert_eq!(status.lead_days, 1);
    assert_eq!(status.members_due_at_lead, 1);
    assert_eq!(status.modified_by, "admin");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// For any mix of failing and succeeding members, the summary tallies
    /// reconcile and every selected member gets exactly one ledger record
    #[test]
    fn batch_tallies_always_reconcile(failing_mask in proptest::collection::vec(any::<bool>(), 0..6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let members: Vec<Member> = failing_mask
                .iter()
                .enumerate()
                .map(|(i, _)| member_due_on(&format!("Socio{}", i), &format!("5917{:07}", i), tomorrow()))
                .collect();
            let failing: Vec<String> = members
                .iter()
                .zip(&failing_mask)
                .filter(|(_, fails)| **fails)
                .map(|(m, _)| m.phone.clone())
                .collect();
            let failing_refs: Vec<&str> = failing.iter().map(String::as_str).collect();

            let harness = build_harness(members.clone(), ScriptedGateway::failing_for(&failing_refs));
            harness.scheduler.initialize().await;

            let summary = harness.scheduler.run_manual().await.unwrap();

            assert_eq!(summary.total, members.len());
            assert_eq!(summary.sent + summary.failed + summary.skipped, summary.total);
            assert_eq!(summary.failed, failing.len());
            assert_eq!(summary.skipped, 0);
            assert_eq!(harness.ledger.records.lock().await.len(), members.len());
        });
    }
}

#[tokio::test]
async fn stop_disarms_without_touching_settings() {
    let harness = build_harness(Vec::new(), ScriptedGateway::connected());
    harness.scheduler.initialize().await;
    assert!(harness.scheduler.is_armed().await);

    harness.scheduler.stop().await;
    assert!(!harness.scheduler.is_armed().await);

    // Settings still say enabled; only the process-local timer is gone
    assert!(harness.scheduler.current_settings().await.enabled);
}
